use thiserror::Error;

/// Typed causes carried inside `anyhow::Error`s, for callers that
/// want to `downcast_ref` them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwellError {
    #[error("template expects {expected} value(s), got {got}")]
    ValueCount { expected: usize, got: usize },

    #[error("{name:?} is not a valid custom element name (needs a hyphen, \
             must start with a lowercase ASCII letter and contain no uppercase)")]
    InvalidName { name: String },

    #[error("custom element {tag:?} is already defined")]
    AlreadyDefined { tag: String },

    #[error("module {url:?} does not declare the custom element tag it defines")]
    MissingIdentity { url: String },

    #[error("placeholder in {location} is not supported: {detail}")]
    UnsupportedPlaceholder { location: String, detail: String },
}
