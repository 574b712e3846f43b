//! Streams the output of a compiled template for one set of values.

use std::{cell::Cell, rc::Rc};

use anyhow::{anyhow, Context, Result};
use futures::{future, stream, FutureExt, StreamExt};
use kstring::KString;
use sdom::{Document, NodeId};
use tracing::{trace, warn};

use crate::{engine::Swell,
            part::{CompiledTemplate, ComponentPart, Part, TextPart},
            serialize::{Pieces, RenderContext},
            value::{error_chunk, Chunks, Value}};

/// Shared by a top level render and everything rendered inside it.
#[derive(Debug, Default)]
pub(crate) struct RenderState {
    shadow_roots: Cell<usize>,
}

impl RenderState {
    pub(crate) fn add_shadow_roots(&self, n: usize) {
        self.shadow_roots.set(self.shadow_roots.get() + n);
    }

    pub(crate) fn shadow_roots(&self) -> usize {
        self.shadow_roots.get()
    }
}

/// Parts are rendered strictly one after the other; nothing of part
/// N+1 (not even its values) is polled before part N is exhausted.
pub(crate) fn render_template(
    engine: &Swell,
    template: Rc<CompiledTemplate>,
    values: Vec<Value>,
    state: Rc<RenderState>,
) -> Chunks {
    state.add_shadow_roots(template.shadow_roots);
    let mut values = values.into_iter();
    let slices: Vec<Vec<Value>> = template.parts.iter()
        .map(|part| values.by_ref().take(part.len()).collect())
        .collect();
    let engine = engine.clone();
    stream::iter(slices.into_iter().enumerate())
        .flat_map(move |(i, values)| {
            trace!(part = i, values = values.len(), "rendering part");
            match &template.parts[i] {
                Part::Text(part) => render_text(part, values),
                Part::Component(part) =>
                    render_component(&engine, &template, part, values, &state),
            }
        })
        .boxed_local()
}

fn render_text(part: &TextPart, values: Vec<Value>) -> Chunks {
    let mut items = Vec::with_capacity(values.len() + 2);
    if let Some(doctype) = &part.doctype {
        items.push(Value::Text(doctype.clone()));
    }
    items.push(Value::Text(part.prefix.clone()));
    items.extend(values);
    Value::List(items).into_chunks()
}

fn render_component(
    engine: &Swell,
    template: &Rc<CompiledTemplate>,
    part: &ComponentPart,
    values: Vec<Value>,
    state: &Rc<RenderState>,
) -> Chunks {
    let engine = engine.clone();
    let template = template.clone();
    let part = part.clone();
    let state = state.clone();
    async move {
        // all values settle before the clone is touched
        let resolved = future::try_join_all(values.into_iter().map(Value::resolve))
            .await
            .with_context(|| anyhow!("resolving the values for <{}>", part.tag))?;
        serialize_component(&engine, &template, &part, &resolved, &state)
    }
    .map(|result| match result {
        Ok(chunks) => chunks,
        Err(e) => error_chunk(e),
    })
    .flatten_stream()
    .boxed_local()
}

/// A node in the scratch document, removed (with its subtree) when
/// dropped.
struct ScratchNode<'d> {
    doc: &'d Document,
    node: NodeId,
}

impl<'d> Drop for ScratchNode<'d> {
    fn drop(&mut self) {
        if let Err(e) = self.doc.remove(self.node) {
            warn!("could not release scratch node {:?}: {e:#}", self.node);
        }
    }
}

fn serialize_component(
    engine: &Swell,
    template: &CompiledTemplate,
    part: &ComponentPart,
    values: &[KString],
    state: &Rc<RenderState>,
) -> Result<Chunks> {
    let scratch = engine.scratch();
    let clone = ScratchNode {
        doc: scratch,
        node: template.document.clone_into(part.node, scratch)?,
    };
    if ! part.bindings.is_empty() {
        let nodes: Vec<NodeId> = scratch.walk(clone.node).collect();
        for ((position, binding), value) in part.bindings.iter().zip(values) {
            let node = nodes.get(*position).ok_or_else(
                || anyhow!("bug: binding position {position} outside of <{}>", part.tag))?;
            binding.set(scratch, *node, value)?;
        }
    }
    scratch.mount(clone.node)?;
    let mut out = Pieces::new();
    RenderContext::new(engine, state, scratch).serialize_node(clone.node, &mut out)?;
    Ok(out.into_chunks())
}
