//! Turns a literal into a `CompiledTemplate`: the segments are joined
//! with the marker, parsed, and the tree is walked to produce the
//! static text, the interpolation points and the component parts.

use anyhow::{anyhow, bail, Context, Result};
use kstring::KString;
use sdom::{parse_fragment, push_comment, push_close_tag, push_open_tag,
           Document, NodeId, NodeType};

use crate::{engine::Swell,
            error::SwellError,
            literal::Literal,
            marker::Marker,
            part::{Binding, CompiledTemplate, ComponentPart, Part, TextPart}};

/// Splits off a leading `<!doctype html>` (case-insensitive, leading
/// whitespace allowed and kept with it).
pub fn split_doctype(html: &str) -> (Option<&str>, &str) {
    let trimmed = html.trim_start();
    let ws = html.len() - trimmed.len();
    let bytes = trimmed.as_bytes();
    const OPEN: &[u8] = b"<!doctype";
    if bytes.len() > OPEN.len() && bytes[..OPEN.len()].eq_ignore_ascii_case(OPEN) {
        if let Some(end) = trimmed.find('>') {
            let inner = &trimmed[OPEN.len()..end];
            if inner.starts_with(|c: char| c.is_ascii_whitespace())
                && inner.trim().eq_ignore_ascii_case("html")
            {
                let split = ws + end + 1;
                return (Some(&html[..split]), &html[split..])
            }
        }
    }
    (None, html)
}

fn unsupported(location: String, detail: &str) -> anyhow::Error {
    anyhow!(SwellError::UnsupportedPlaceholder { location, detail: detail.into() })
}

struct Compiler<'c> {
    engine: &'c Swell,
    marker: &'c Marker,
    doc: &'c Document,
    // Static text since the last part boundary.
    text: String,
    parts: Vec<Part>,
    // Values consumed by the parts so far.
    index: usize,
    doctype_pending: bool,
    shadow_roots: usize,
}

impl<'c> Compiler<'c> {
    /// Appends markup; every marker token in it closes a text part
    /// consuming one value.
    fn push_str(&mut self, s: &str) {
        let marker: &'c Marker = self.marker;
        let mut pieces = s.split(marker.token());
        if let Some(first) = pieces.next() {
            self.text.push_str(first);
        }
        for piece in pieces {
            self.close_text(1);
            self.text.push_str(piece);
        }
    }

    fn close_text(&mut self, values: usize) {
        let prefix = KString::from_string(std::mem::take(&mut self.text));
        self.parts.push(Part::Text(TextPart {
            doctype: None,
            prefix,
            start: self.index,
            end: self.index + values,
        }));
        self.index += values;
    }

    fn node(&mut self, node: NodeId) -> Result<()> {
        let doc = self.doc;
        match doc.node_type(node) {
            NodeType::Text => {
                if let Some(data) = doc.data(node) {
                    self.push_str(&data);
                }
            }
            NodeType::Comment => {
                let mut s = String::new();
                if let Some(data) = doc.data(node) {
                    push_comment(&mut s, &data);
                }
                self.push_str(&s);
            }
            NodeType::Fragment => {
                for child in doc.children(node) {
                    self.node(child)?;
                }
            }
            NodeType::Element => {
                let tag = doc.tag_name(node).ok_or_else(|| anyhow!("element without tag"))?;
                if self.engine.is_defined(&tag) {
                    self.component(node, tag)?;
                } else {
                    self.element(node, tag)?;
                }
            }
        }
        Ok(())
    }

    fn check_attribute_names(&self, tag: &str, attributes: &[(KString, KString)]) -> Result<()> {
        for (name, _) in attributes {
            if name.contains(self.marker.data()) {
                return Err(unsupported(format!("the attributes of <{tag}>"),
                                       "a placeholder can't stand for an attribute name"))
            }
        }
        Ok(())
    }

    fn element(&mut self, node: NodeId, tag: KString) -> Result<()> {
        let doc = self.doc;
        let attributes = doc.attributes(node);
        self.check_attribute_names(&tag, &attributes)?;

        let hydrate_attribute = &self.engine.config().hydrate_attribute;
        let directive = if attributes.iter().any(|(k, _)| k.as_str() == hydrate_attribute) {
            if attributes.iter().any(|(_, v)| v.contains(self.marker.data())) {
                return Err(unsupported(
                    format!("the attributes of <{tag}>"),
                    "an element hydrated from static markup needs static attributes"))
            }
            self.engine.directive_for(&tag, &attributes)?
        } else {
            None
        };
        if let Some(d) = &directive {
            self.push_str(&d.before);
        }

        let mut s = String::new();
        push_open_tag(&mut s, &tag, &attributes);
        self.push_str(&s);
        if let Some(shadow) = doc.shadow_root(node) {
            self.shadow_roots += 1;
            let mut s = String::new();
            push_open_tag(&mut s, "template", &shadow.attributes);
            self.push_str(&s);
            self.node(shadow.root)?;
            self.push_str("</template>");
        }
        for child in doc.children(node) {
            self.node(child)?;
        }
        let mut s = String::new();
        push_close_tag(&mut s, &tag);
        self.push_str(&s);

        if let Some(d) = &directive {
            self.push_str(&d.after);
        }
        Ok(())
    }

    fn component(&mut self, node: NodeId, tag: KString) -> Result<()> {
        if ! self.text.is_empty() || (self.doctype_pending && self.parts.is_empty()) {
            self.close_text(0);
        }
        let doc = self.doc;
        let data = self.marker.data();
        let token = self.marker.token();
        let mut bindings = Vec::new();
        for (position, n) in doc.walk(node).enumerate() {
            match doc.node_type(n) {
                NodeType::Element => {
                    let el_tag = doc.tag_name(n).unwrap_or_else(|| KString::from_static(""));
                    let attributes = doc.attributes(n);
                    self.check_attribute_names(&el_tag, &attributes)?;
                    for (name, value) in attributes {
                        if value.as_str() == token {
                            bindings.push((position, Binding::Attribute(name)));
                        } else if value.contains(data) {
                            return Err(unsupported(
                                format!("attribute {name:?} of <{el_tag}> in <{tag}>"),
                                "a placeholder must be the whole attribute value"))
                        }
                    }
                    if let Some(shadow) = doc.shadow_root(n) {
                        if shadow.attributes.iter().any(|(_, v)| v.contains(data)) {
                            return Err(unsupported(
                                format!("the shadow root template of <{el_tag}> in <{tag}>"),
                                "shadow root attributes must be static"))
                        }
                    }
                }
                NodeType::Comment => {
                    if doc.data(n).map_or(false, |d| d.as_str() == data) {
                        bindings.push((position, Binding::Text));
                    }
                }
                NodeType::Text => {
                    if doc.data(n).map_or(false, |d| d.contains(data)) {
                        return Err(unsupported(
                            format!("raw text in <{tag}>"),
                            "placeholders inside a custom element must be element \
                             content or whole attribute values"))
                    }
                }
                NodeType::Fragment => ()
            }
        }
        let n = bindings.len();
        self.parts.push(Part::Component(ComponentPart {
            node,
            tag,
            bindings,
            start: self.index,
            end: self.index + n,
        }));
        self.index += n;
        Ok(())
    }
}

pub(crate) fn compile_template(engine: &Swell, literal: Literal) -> Result<CompiledTemplate> {
    let marker = engine.marker();
    let joined = marker.join(literal.segments());
    let (doctype, body) = split_doctype(&joined);

    let document = Document::new();
    let fragment = parse_fragment(&document, body).with_context(
        || anyhow!("parsing template starting with {:?}",
                   literal.segments().first().map(|s| s.chars().take(40).collect::<String>())
                   .unwrap_or_default()))?;

    let mut compiler = Compiler {
        engine,
        marker,
        doc: &document,
        text: String::new(),
        parts: Vec::new(),
        index: 0,
        doctype_pending: doctype.is_some(),
        shadow_roots: 0,
    };
    compiler.node(fragment)?;
    if ! compiler.text.is_empty() || compiler.parts.is_empty() {
        compiler.close_text(0);
    }
    let Compiler { mut parts, index, shadow_roots, .. } = compiler;

    if let Some(doctype) = doctype {
        match parts.first_mut() {
            Some(Part::Text(part)) => part.doctype = Some(KString::from_ref(doctype)),
            _ => bail!("bug: doctype found but first part isn't text")
        }
    }
    let placeholders = literal.placeholders();
    if index != placeholders {
        bail!(SwellError::UnsupportedPlaceholder {
            location: "the template".into(),
            detail: format!("only {index} of {placeholders} placeholders are in \
                             element content, comments or attribute values"),
        })
    }
    Ok(CompiledTemplate {
        document,
        parts,
        placeholders,
        shadow_roots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_split_doctype() {
        assert_eq!(split_doctype("<!DOCTYPE html><p>"), (Some("<!DOCTYPE html>"), "<p>"));
        assert_eq!(split_doctype("\n <!doctype  HTML >x"), (Some("\n <!doctype  HTML >"), "x"));
        assert_eq!(split_doctype("<!doctypehtml>x"), (None, "<!doctypehtml>x"));
        assert_eq!(split_doctype("<p><!doctype html>"), (None, "<p><!doctype html>"));
        assert_eq!(split_doctype("<!doctype"), (None, "<!doctype"));
    }
}
