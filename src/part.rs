//! The compiled form of a template: parts over a backing document.

use std::ops::Range;

use anyhow::Result;
use kstring::KString;
use sdom::{Document, NodeId};

/// Where one resolved value goes inside a component's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A placeholder comment, replaced by a text node.
    Text,
    /// An attribute whose whole value was a placeholder.
    Attribute(KString),
}

impl Binding {
    pub fn set(&self, doc: &Document, node: NodeId, value: &str) -> Result<()> {
        match self {
            Binding::Text => doc.replace_with_text(node, KString::from_ref(value)),
            Binding::Attribute(name) => doc.set_attribute(node, name.clone(), KString::from_ref(value)),
        }
    }
}

/// Static text followed by the values `start..end` (at most one; the
/// final part of a template has none).
#[derive(Debug, Clone)]
pub struct TextPart {
    pub doctype: Option<KString>,
    pub prefix: KString,
    pub start: usize,
    pub end: usize,
}

/// A registered custom element whose subtree is cloned, hydrated with
/// the values `start..end` and serialized on each render.
#[derive(Debug, Clone)]
pub struct ComponentPart {
    /// The element in the template's document.
    pub node: NodeId,
    pub tag: KString,
    /// (position in `Document::walk` order, binding), ascending by
    /// position; one entry per value.
    pub bindings: Vec<(usize, Binding)>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub enum Part {
    Text(TextPart),
    Component(ComponentPart),
}

impl Part {
    pub fn start(&self) -> usize {
        match self {
            Part::Text(p) => p.start,
            Part::Component(p) => p.start,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Part::Text(p) => p.end,
            Part::Component(p) => p.end,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Number of values consumed.
    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable after compilation; shared by all renders of its call
/// site.
#[derive(Debug)]
pub struct CompiledTemplate {
    pub(crate) document: Document,
    pub(crate) parts: Vec<Part>,
    pub(crate) placeholders: usize,
    /// Declarative shadow roots in the static text.
    pub(crate) shadow_roots: usize,
}

impl CompiledTemplate {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub fn shadow_roots(&self) -> usize {
        self.shadow_roots
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Whether the parts' value ranges are contiguous, ascending and
    /// cover `0..placeholders` exactly.
    pub fn ranges_partition_values(&self) -> bool {
        let mut next = 0;
        for part in &self.parts {
            if part.start() != next || part.end() < part.start() {
                return false
            }
            next = part.end();
        }
        next == self.placeholders
    }
}
