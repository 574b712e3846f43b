//! Small arena DOM for server-side rendering: nodes, declarative
//! shadow roots, a verbatim fragment parser and HTML printing.

pub mod meta;
pub mod document;
pub mod parse;

use std::borrow::Cow;

use anyhow::Result;
use kstring::KString;

pub use document::{Document, DocumentId, NodeId, NodeType, ShadowRoot, Walk};
pub use meta::{ElementMeta, METADB, is_valid_custom_element_name};
pub use parse::{parse_fragment, ParseError};

/// Only `"` is escaped (as `&quot;`); values from parsed markup
/// already carry their references verbatim.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if value.contains('"') {
        Cow::Owned(value.replace('"', "&quot;"))
    } else {
        Cow::Borrowed(value)
    }
}

/// Escapes text for use as element content. Text taken from parsed
/// markup is already in this form and is printed as is.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if ! text.contains(|c| matches!(c, '&' | '<' | '>')) {
        return Cow::Borrowed(text)
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c)
        }
    }
    Cow::Owned(out)
}

/// `<tag a="v" b>`: attributes with an empty value use the boolean
/// form.
pub fn push_open_tag(out: &mut String, tag: &str, attributes: &[(KString, KString)]) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        if ! value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_attribute(value));
            out.push('"');
        }
    }
    out.push('>');
}

/// Nothing for void elements.
pub fn push_close_tag(out: &mut String, tag: &str) {
    if METADB.has_closing_tag(tag) {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

pub fn push_comment(out: &mut String, data: &str) {
    out.push_str("<!--");
    out.push_str(data);
    out.push_str("-->");
}

pub trait Print {
    /// Print serialized HTML, shadow roots as declarative
    /// `<template ..>` elements ahead of the light children.
    fn print_html(&self, out: &mut String, doc: &Document) -> Result<()>;

    fn to_html_string(&self, doc: &Document) -> Result<String> {
        let mut s = String::new();
        self.print_html(&mut s, doc)?;
        Ok(s)
    }
}

impl Print for NodeId {
    fn print_html(&self, out: &mut String, doc: &Document) -> Result<()> {
        match doc.node_type(*self) {
            NodeType::Element => {
                let tag = doc.tag_name(*self).unwrap_or_else(|| KString::from_static(""));
                push_open_tag(out, &tag, &doc.attributes(*self));
                if let Some(shadow) = doc.shadow_root(*self) {
                    push_open_tag(out, "template", &shadow.attributes);
                    shadow.root.print_html(out, doc)?;
                    push_close_tag(out, "template");
                }
                for child in doc.children(*self) {
                    child.print_html(out, doc)?;
                }
                push_close_tag(out, &tag);
            }
            NodeType::Text => {
                out.push_str(&doc.data(*self).unwrap_or_else(|| KString::from_static("")));
            }
            NodeType::Comment => {
                push_comment(out, &doc.data(*self).unwrap_or_else(|| KString::from_static("")));
            }
            NodeType::Fragment => {
                for child in doc.children(*self) {
                    child.print_html(out, doc)?;
                }
            }
        }
        Ok(())
    }
}

impl Print for [NodeId] {
    fn print_html(&self, out: &mut String, doc: &Document) -> Result<()> {
        for node in self {
            node.print_html(out, doc)?;
        }
        Ok(())
    }
}
