use std::{cell::RefCell,
          sync::atomic::{AtomicU32, Ordering}};

use anyhow::{bail, Result};
use kstring::KString;

static NEXT_DOCUMENT_ID: AtomicU32 = AtomicU32::new(0);

fn next_document_id() -> DocumentId {
    DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u32);

/// Reference to a node; only valid with the `Document` that created
/// it (checked at runtime) and as long as it has not been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    document: DocumentId,
    index: u32,
}

impl NodeId {
    pub fn document_id(self) -> DocumentId {
        self.document
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    Comment,
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRoot {
    /// The attributes of the `<template>` element the shadow root was
    /// declared with (e.g. `shadowroot="open"`).
    pub attributes: Vec<(KString, KString)>,
    /// Fragment holding the shadow content.
    pub root: NodeId,
}

#[derive(Debug, Clone)]
struct Element {
    tag: KString,
    attributes: Vec<(KString, KString)>,
    children: Vec<NodeId>,
    shadow: Option<ShadowRoot>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    Text(KString),
    Comment(KString),
    Fragment(Vec<NodeId>),
}

#[derive(Debug)]
struct Slot {
    // For a shadow root fragment, this is the host element.
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Arena of nodes. All methods take `&self`; mutations go through
/// interior mutability and never hold a borrow across calls into user
/// code.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    slots: RefCell<Vec<Option<Slot>>>,
    free: RefCell<Vec<u32>>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let id = next_document_id();
        let body = NodeId { document: id, index: 0 };
        Document {
            id,
            slots: RefCell::new(vec![Some(Slot {
                parent: None,
                kind: NodeKind::Element(Element {
                    tag: KString::from_static("body"),
                    attributes: Vec::new(),
                    children: Vec::new(),
                    shadow: None,
                })
            })]),
            free: RefCell::new(Vec::new()),
            body,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// The element that `mount` attaches nodes to.
    pub fn body(&self) -> NodeId {
        self.body
    }

    fn index(&self, node: NodeId) -> usize {
        if node.document != self.id {
            panic!("node {node:?} used with foreign document {:?}", self.id)
        }
        node.index as usize
    }

    fn with_slot<R>(&self, node: NodeId, f: impl FnOnce(&Slot) -> R) -> R {
        let i = self.index(node);
        let slots = self.slots.borrow();
        let slot = slots[i].as_ref().unwrap_or_else(
            || panic!("use of removed node {node:?}"));
        f(slot)
    }

    fn with_slot_mut<R>(&self, node: NodeId, f: impl FnOnce(&mut Slot) -> R) -> R {
        let i = self.index(node);
        let mut slots = self.slots.borrow_mut();
        let slot = slots[i].as_mut().unwrap_or_else(
            || panic!("use of removed node {node:?}"));
        f(slot)
    }

    fn alloc(&self, kind: NodeKind) -> NodeId {
        let slot = Slot { parent: None, kind };
        let mut slots = self.slots.borrow_mut();
        let index = if let Some(index) = self.free.borrow_mut().pop() {
            slots[index as usize] = Some(slot);
            index
        } else {
            slots.push(Some(slot));
            (slots.len() - 1) as u32
        };
        NodeId { document: self.id, index }
    }

    pub fn create_element(
        &self,
        tag: impl Into<KString>,
        attributes: Vec<(KString, KString)>,
    ) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            tag: tag.into(),
            attributes,
            children: Vec::new(),
            shadow: None,
        }))
    }

    pub fn create_text(&self, data: impl Into<KString>) -> NodeId {
        self.alloc(NodeKind::Text(data.into()))
    }

    pub fn create_comment(&self, data: impl Into<KString>) -> NodeId {
        self.alloc(NodeKind::Comment(data.into()))
    }

    pub fn create_fragment(&self) -> NodeId {
        self.alloc(NodeKind::Fragment(Vec::new()))
    }

    /// Number of nodes currently allocated (including `body`).
    pub fn live_nodes(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.is_some()).count()
    }

    pub fn node_type(&self, node: NodeId) -> NodeType {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::Fragment(_) => NodeType::Fragment,
        })
    }

    pub fn tag_name(&self, node: NodeId) -> Option<KString> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) => Some(e.tag.clone()),
            _ => None
        })
    }

    /// Attributes in source order; empty for non-elements.
    pub fn attributes(&self, node: NodeId) -> Vec<(KString, KString)> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) => e.attributes.clone(),
            _ => Vec::new()
        })
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<KString> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) =>
                e.attributes.iter().find(|(k, _)| k.as_str() == name).map(|(_, v)| v.clone()),
            _ => None
        })
    }

    /// Replaces the value of an existing attribute in place, appends
    /// it otherwise.
    pub fn set_attribute(
        &self,
        node: NodeId,
        name: impl Into<KString>,
        value: impl Into<KString>,
    ) -> Result<()> {
        let name = name.into();
        let value = value.into();
        self.with_slot_mut(node, |slot| match &mut slot.kind {
            NodeKind::Element(e) => {
                if let Some(entry) = e.attributes.iter_mut().find(|(k, _)| *k == name) {
                    entry.1 = value;
                } else {
                    e.attributes.push((name, value));
                }
                Ok(())
            }
            _ => bail!("set_attribute({name:?}): {node:?} is not an element")
        })
    }

    /// Returns whether the attribute was present.
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> bool {
        self.with_slot_mut(node, |slot| match &mut slot.kind {
            NodeKind::Element(e) => {
                let len = e.attributes.len();
                e.attributes.retain(|(k, _)| k != name);
                e.attributes.len() != len
            }
            _ => false
        })
    }

    /// Text or comment data.
    pub fn data(&self, node: NodeId) -> Option<KString> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => Some(s.clone()),
            _ => None
        })
    }

    pub fn set_data(&self, node: NodeId, data: impl Into<KString>) -> Result<()> {
        let data = data.into();
        self.with_slot_mut(node, |slot| match &mut slot.kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => {
                *s = data;
                Ok(())
            }
            _ => bail!("set_data: {node:?} is neither a text nor a comment node")
        })
    }

    /// Turns a text or comment node into a text node holding `text`,
    /// keeping its id and tree position.
    pub fn replace_with_text(&self, node: NodeId, text: impl Into<KString>) -> Result<()> {
        let text = text.into();
        self.with_slot_mut(node, |slot| match &slot.kind {
            NodeKind::Text(_) | NodeKind::Comment(_) => {
                slot.kind = NodeKind::Text(text);
                Ok(())
            }
            _ => bail!("replace_with_text: {node:?} is neither a text nor a comment node")
        })
    }

    /// Light-DOM children (shadow content is reached via
    /// `shadow_root`); empty for text and comment nodes.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) => e.children.clone(),
            NodeKind::Fragment(c) => c.clone(),
            _ => Vec::new()
        })
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_slot(node, |slot| slot.parent)
    }

    pub fn shadow_root(&self, node: NodeId) -> Option<ShadowRoot> {
        self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) => e.shadow.clone(),
            _ => None
        })
    }

    /// Gives `host` an (empty) shadow root fragment and returns it.
    pub fn attach_shadow(
        &self,
        host: NodeId,
        attributes: Vec<(KString, KString)>,
    ) -> Result<NodeId> {
        match self.node_type(host) {
            NodeType::Element => (),
            t => bail!("attach_shadow: {host:?} is a {t:?} node, not an element")
        }
        if self.shadow_root(host).is_some() {
            bail!("attach_shadow: {host:?} already has a shadow root")
        }
        let root = self.create_fragment();
        self.with_slot_mut(root, |slot| slot.parent = Some(host));
        self.with_slot_mut(host, |slot| {
            if let NodeKind::Element(e) = &mut slot.kind {
                e.shadow = Some(ShadowRoot { attributes, root });
            }
        });
        Ok(root)
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == candidate {
                return true
            }
            cur = self.parent(n);
        }
        false
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        match self.node_type(parent) {
            NodeType::Element | NodeType::Fragment => (),
            t => bail!("append_child: parent {parent:?} is a {t:?} node")
        }
        if let Some(p) = self.parent(child) {
            bail!("append_child: {child:?} is already attached to {p:?}")
        }
        if self.is_ancestor_or_self(child, parent) {
            bail!("append_child: appending {child:?} to {parent:?} would create a cycle")
        }
        self.with_slot_mut(parent, |slot| match &mut slot.kind {
            NodeKind::Element(e) => e.children.push(child),
            NodeKind::Fragment(c) => c.push(child),
            _ => ()
        });
        self.with_slot_mut(child, |slot| slot.parent = Some(parent));
        Ok(())
    }

    /// Unlinks `node` from its parent; no-op for unattached nodes.
    pub fn detach(&self, node: NodeId) -> Result<()> {
        let parent = match self.parent(node) {
            Some(p) => p,
            None => return Ok(())
        };
        if self.shadow_root(parent).map(|s| s.root) == Some(node) {
            bail!("detach: {node:?} is the shadow root of {parent:?}")
        }
        self.with_slot_mut(parent, |slot| match &mut slot.kind {
            NodeKind::Element(e) => e.children.retain(|c| *c != node),
            NodeKind::Fragment(c) => c.retain(|c| *c != node),
            _ => ()
        });
        self.with_slot_mut(node, |slot| slot.parent = None);
        Ok(())
    }

    /// Detaches `node` and frees it with its whole subtree (shadow
    /// content included). Ids into the subtree become invalid.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        self.detach(node)?;
        let nodes: Vec<NodeId> = self.walk(node).collect();
        let mut slots = self.slots.borrow_mut();
        let mut free = self.free.borrow_mut();
        for n in nodes {
            slots[n.index as usize] = None;
            free.push(n.index);
        }
        Ok(())
    }

    /// Pre-order traversal over all node kinds, starting with `node`
    /// itself; an element's shadow root fragment (and its content) is
    /// visited before the element's light children.
    pub fn walk(&self, node: NodeId) -> Walk<'_> {
        self.index(node);
        Walk { document: self, stack: vec![node] }
    }

    /// Deep structural copy of `node` (shadow roots included) into
    /// `target`, which may be `self`. The copy is unattached.
    pub fn clone_into(&self, node: NodeId, target: &Document) -> Result<NodeId> {
        // (target may be self, so don't allocate while borrowed)
        let kind = self.with_slot(node, |slot| match &slot.kind {
            NodeKind::Element(e) => NodeKind::Element(Element {
                tag: e.tag.clone(),
                attributes: e.attributes.clone(),
                children: Vec::new(),
                shadow: None,
            }),
            NodeKind::Fragment(_) => NodeKind::Fragment(Vec::new()),
            other => other.clone(),
        });
        let copy = target.alloc(kind);
        if let Some(shadow) = self.shadow_root(node) {
            let root = target.attach_shadow(copy, shadow.attributes)?;
            for child in self.children(shadow.root) {
                let c = self.clone_into(child, target)?;
                target.append_child(root, c)?;
            }
        }
        for child in self.children(node) {
            let c = self.clone_into(child, target)?;
            target.append_child(copy, c)?;
        }
        Ok(copy)
    }

    /// Attaches `node` to `body`.
    pub fn mount(&self, node: NodeId) -> Result<()> {
        self.append_child(self.body, node)
    }

    /// Whether `node` is reachable from `body`.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.is_ancestor_or_self(self.body, node)
    }
}

pub struct Walk<'d> {
    document: &'d Document,
    stack: Vec<NodeId>,
}

impl<'d> Iterator for Walk<'d> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        let children = self.document.children(node);
        self.stack.extend(children.into_iter().rev());
        if let Some(shadow) = self.document.shadow_root(node) {
            self.stack.push(shadow.root);
        }
        Some(node)
    }
}
