//! Template literals: the static text segments of a call site plus
//! the values interpolated between them.

use anyhow::{bail, Result};

use crate::{error::SwellError, value::Value};

/// Static segments of one template call site. `segments.len() - 1`
/// values go between them.
#[derive(Debug, Clone, Copy)]
pub struct Literal {
    segments: &'static [&'static str],
}

/// Identity of a call site: the segment slice's address and length,
/// not its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteKey {
    addr: usize,
    len: usize,
}

impl Literal {
    pub const fn new(segments: &'static [&'static str]) -> Self {
        Literal { segments }
    }

    pub fn segments(&self) -> &'static [&'static str] {
        self.segments
    }

    /// Number of interpolation positions.
    pub fn placeholders(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    pub fn site(&self) -> SiteKey {
        SiteKey {
            addr: self.segments.as_ptr() as usize,
            len: self.segments.len(),
        }
    }

    /// The segments joined without any values (what a render of a
    /// value-free template reproduces).
    pub fn static_text(&self) -> String {
        self.segments.concat()
    }
}

/// A literal with the values of one invocation.
#[derive(Debug)]
pub struct TemplateCall {
    pub literal: Literal,
    pub values: Vec<Value>,
}

impl TemplateCall {
    pub fn new(literal: Literal, values: Vec<Value>) -> Self {
        TemplateCall { literal, values }
    }

    /// Errors with `SwellError::ValueCount` unless there is exactly
    /// one value per interpolation position.
    pub fn checked(self) -> Result<Self> {
        let expected = self.literal.placeholders();
        if self.values.len() != expected || self.literal.segments.is_empty() {
            bail!(SwellError::ValueCount { expected, got: self.values.len() })
        }
        Ok(self)
    }
}

/// Builds a `TemplateCall` whose segments live in a static unique to
/// the macro invocation, so every call through the same source
/// location shares one compiled template:
///
/// ```
/// let call = swell::template!["<p>", " and ", "</p>"; 1, "two"];
/// assert_eq!(call.values.len(), 2);
/// ```
#[macro_export]
macro_rules! template {
    ($($segment:literal),+ ; $($value:expr),* $(,)?) => {{
        static SEGMENTS: [&str; <[()]>::len(&[$($crate::__unit!($segment)),+])]
            = [$($segment),+];
        $crate::literal::TemplateCall::new(
            $crate::literal::Literal::new(&SEGMENTS),
            vec![$($crate::value::Value::from($value)),*])
    }};
    ($($segment:literal),+ $(,)?) => {{
        static SEGMENTS: [&str; <[()]>::len(&[$($crate::__unit!($segment)),+])]
            = [$($segment),+];
        $crate::literal::TemplateCall::new(
            $crate::literal::Literal::new(&SEGMENTS),
            Vec::new())
    }};
}

// The segment array must be a static of its own (not a reference to
// a promoted constant, which may be shared between equal literals).
#[doc(hidden)]
#[macro_export]
macro_rules! __unit {
    ($t:tt) => { () };
}
