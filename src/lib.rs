//! Streaming server-side rendering of HTML templates.
//!
//! A template call (`template!["<p>", "</p>"; value]`) is compiled
//! once per call site into static text, interpolation points and
//! custom element parts; rendering it produces a lazy stream of
//! chunks in source order. Custom elements defined on the `Swell`
//! engine are cloned, hydrated with their values and serialized
//! (optionally through a render hook emitting declarative shadow
//! DOM), and elements asking for client hydration get an activation
//! script from the matching strategy.

pub mod error;
pub mod value;
pub mod literal;
pub mod marker;
pub mod config;
pub mod part;
pub mod compile;
pub mod registry;
pub mod hydrate;
pub mod serialize;
mod render;
pub mod engine;

pub use config::{Config, Hydration};
pub use engine::Swell;
pub use error::SwellError;
pub use hydrate::{Directive, HydrationStrategy, HydrationTarget};
pub use literal::{Literal, TemplateCall};
pub use registry::ModuleDef;
pub use serialize::{ElementRef, ElementRenderer, Pieces, RenderContext, Shadow};
pub use value::{Chunks, Value};
