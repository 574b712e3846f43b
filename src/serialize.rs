//! The element serialization rule, with custom element render hooks.

use std::rc::Rc;

use anyhow::Result;
use futures::{future, stream, StreamExt};
use kstring::KString;
use sdom::{push_close_tag, push_comment, push_open_tag, Document, NodeId, NodeType};

use crate::{engine::Swell,
            literal::TemplateCall,
            render::RenderState,
            value::Chunks};

/// Output under construction: literal text interleaved with streams
/// that are only pulled when the result is consumed.
#[derive(Default)]
pub struct Pieces(Vec<Piece>);

enum Piece {
    Text(String),
    Chunks(Chunks),
}

impl Pieces {
    pub fn new() -> Self {
        Pieces(Vec::new())
    }

    pub fn push_str(&mut self, s: &str) {
        if s.is_empty() {
            return
        }
        if let Some(Piece::Text(last)) = self.0.last_mut() {
            last.push_str(s);
        } else {
            self.0.push(Piece::Text(s.into()));
        }
    }

    pub fn push_chunks(&mut self, chunks: Chunks) {
        self.0.push(Piece::Chunks(chunks));
    }

    pub fn into_chunks(self) -> Chunks {
        stream::iter(self.0).flat_map(|piece| match piece {
            Piece::Text(s) =>
                stream::once(future::ready(Ok(KString::from_string(s)))).boxed_local(),
            Piece::Chunks(c) => c,
        }).boxed_local()
    }
}

/// A hydrated custom element as seen by its render hook. `node` is
/// only valid during the hook call.
#[derive(Debug, Clone)]
pub struct ElementRef {
    pub node: NodeId,
    pub tag: KString,
    pub attributes: Vec<(KString, KString)>,
}

impl ElementRef {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k.as_str() == name).map(|(_, v)| v.as_str())
    }
}

/// Server-side rendering of a custom element, replacing the generic
/// element rule for its tag. The hook emits the element itself, so
/// usually starts with `cx.open_tag` and ends with `cx.close_tag`.
pub trait ElementRenderer {
    fn render(&self, element: &ElementRef, cx: &RenderContext) -> Result<Chunks>;
}

impl<F> ElementRenderer for F
    where F: Fn(&ElementRef, &RenderContext) -> Result<Chunks>
{
    fn render(&self, element: &ElementRef, cx: &RenderContext) -> Result<Chunks> {
        self(element, cx)
    }
}

/// Serializes nodes of the scratch document, invoking render hooks
/// for defined elements and splicing hydration directives.
pub struct RenderContext<'a> {
    engine: &'a Swell,
    state: &'a Rc<RenderState>,
    doc: &'a Document,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(engine: &'a Swell, state: &'a Rc<RenderState>, doc: &'a Document) -> Self {
        RenderContext { engine, state, doc }
    }

    pub fn engine(&self) -> &Swell {
        self.engine
    }

    pub fn open_tag(&self, element: &ElementRef) -> String {
        let mut s = String::new();
        push_open_tag(&mut s, &element.tag, &element.attributes);
        s
    }

    pub fn close_tag(&self, element: &ElementRef) -> String {
        let mut s = String::new();
        push_close_tag(&mut s, &element.tag);
        s
    }

    /// The element's light DOM children, serialized by the same rule.
    pub fn children(&self, element: &ElementRef) -> Result<Chunks> {
        let mut out = Pieces::new();
        for child in self.doc.children(element.node) {
            self.serialize_node(child, &mut out)?;
        }
        Ok(out.into_chunks())
    }

    /// Renders a nested template as part of the current render.
    pub fn html(&self, call: TemplateCall) -> Chunks {
        self.engine.render_call(call, self.state.clone())
    }

    /// Records that a declarative shadow root was emitted (for the
    /// polyfill decision of `Swell::page`).
    pub fn shadow_root_emitted(&self) {
        self.state.add_shadow_roots(1);
    }

    pub(crate) fn serialize_node(&self, node: NodeId, out: &mut Pieces) -> Result<()> {
        match self.doc.node_type(node) {
            NodeType::Element => self.serialize_element(node, out)?,
            NodeType::Text => {
                if let Some(data) = self.doc.data(node) {
                    out.push_str(&data);
                }
            }
            NodeType::Comment => {
                let mut s = String::new();
                push_comment(&mut s, &self.doc.data(node).unwrap_or_else(|| KString::from_static("")));
                out.push_str(&s);
            }
            NodeType::Fragment => {
                for child in self.doc.children(node) {
                    self.serialize_node(child, out)?;
                }
            }
        }
        Ok(())
    }

    fn serialize_element(&self, node: NodeId, out: &mut Pieces) -> Result<()> {
        let element = ElementRef {
            node,
            tag: self.doc.tag_name(node).unwrap_or_else(|| KString::from_static("")),
            attributes: self.doc.attributes(node),
        };
        let directive = self.engine.directive_for(&element.tag, &element.attributes)?;
        if let Some(d) = &directive {
            out.push_str(&d.before);
        }
        // (the registry borrow is released before calling the hook)
        match self.engine.renderer_for(&element.tag).flatten() {
            Some(renderer) => out.push_chunks(renderer.render(&element, self)?),
            None => {
                out.push_str(&self.open_tag(&element));
                if let Some(shadow) = self.doc.shadow_root(node) {
                    self.shadow_root_emitted();
                    let mut s = String::new();
                    push_open_tag(&mut s, "template", &shadow.attributes);
                    out.push_str(&s);
                    self.serialize_node(shadow.root, out)?;
                    out.push_str("</template>");
                }
                for child in self.doc.children(node) {
                    self.serialize_node(child, out)?;
                }
                out.push_str(&self.close_tag(&element));
            }
        }
        if let Some(d) = &directive {
            out.push_str(&d.after);
        }
        Ok(())
    }
}

/// Render hook emitting a declarative shadow root with the template
/// built from the element's (hydrated) attributes, followed by the
/// light DOM children. A shadow root already present in the markup is
/// replaced.
pub struct Shadow<F> {
    template: F,
}

impl<F> Shadow<F>
    where F: Fn(&ElementRef) -> Result<TemplateCall>
{
    pub fn new(template: F) -> Self {
        Shadow { template }
    }
}

impl<F> ElementRenderer for Shadow<F>
    where F: Fn(&ElementRef) -> Result<TemplateCall>
{
    fn render(&self, element: &ElementRef, cx: &RenderContext) -> Result<Chunks> {
        let call = (self.template)(element)?;
        cx.shadow_root_emitted();
        let mut out = Pieces::new();
        out.push_str(&cx.open_tag(element));
        out.push_str("<template shadowroot=\"open\">");
        out.push_chunks(cx.html(call));
        out.push_str("</template>");
        out.push_chunks(cx.children(element)?);
        out.push_str(&cx.close_tag(element));
        Ok(out.into_chunks())
    }
}
