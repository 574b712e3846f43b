//! HTML fragment parser that keeps the input text verbatim (no
//! character reference decoding, attribute order and quoting-agnostic
//! values preserved), so printing a parsed fragment reproduces the
//! markup.

use anyhow::Result;
use kstring::KString;
use tracing::debug;

use crate::{document::{Document, NodeId, NodeType},
            meta::METADB};

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTML parse error at byte {pos}: {message}")]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

fn parse_error(pos: usize, message: impl Into<String>) -> ParseError {
    ParseError { pos, message: message.into() }
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'s> {
    Text(&'s str),
    Comment(&'s str),
    StartTag {
        name: KString,
        attributes: Vec<(KString, KString)>,
        self_closing: bool,
    },
    EndTag {
        name: KString,
    },
    Doctype,
}

fn lowercase(s: &str) -> KString {
    KString::from_string(s.to_ascii_lowercase())
}

fn starts_with_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

// A '<' only starts markup when followed by something that can begin
// a tag, end tag, comment or declaration; otherwise it is text.
fn is_markup_start(rest: &[u8]) -> bool {
    match rest.get(1) {
        Some(c) if c.is_ascii_alphabetic() => true,
        Some(b'!') | Some(b'?') => true,
        Some(b'/') => rest.get(2).map_or(false, |c| c.is_ascii_alphabetic()),
        _ => false
    }
}

fn is_tag_name_end(c: u8) -> bool {
    c.is_ascii_whitespace() || c == b'/' || c == b'>'
}

struct Tokenizer<'s> {
    input: &'s str,
    pos: usize,
    // Set after the start tag of a raw text element.
    raw_text: Option<KString>,
}

impl<'s> Tokenizer<'s> {
    fn new(input: &'s str) -> Self {
        Tokenizer { input, pos: 0, raw_text: None }
    }

    fn bytes(&self) -> &'s [u8] {
        self.input.as_bytes()
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    // Scans until one of the given stop predicates matches, returns
    // the scanned slice. All stops are ASCII, so slice ends are char
    // boundaries.
    fn take_until(&mut self, stop: impl Fn(u8) -> bool) -> &'s str {
        let bytes = self.bytes();
        let start = self.pos;
        while self.pos < bytes.len() && ! stop(bytes[self.pos]) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token<'s>)>, ParseError> {
        let bytes = self.bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return Ok(None)
        }

        if let Some(tag) = self.raw_text.take() {
            let mut close = Vec::with_capacity(tag.len() + 2);
            close.extend_from_slice(b"</");
            close.extend_from_slice(tag.as_bytes());
            let mut i = start;
            let end = loop {
                match bytes[i..].iter().position(|&b| b == b'<') {
                    None => break bytes.len(),
                    Some(rel) => {
                        i += rel;
                        if starts_with_ignore_ascii_case(&bytes[i..], &close)
                            && bytes.get(i + close.len()).map_or(true, |&c| is_tag_name_end(c))
                        {
                            break i
                        }
                        i += 1;
                    }
                }
            };
            self.pos = end;
            if end > start {
                return Ok(Some((start, Token::Text(&self.input[start..end]))))
            }
            return self.next_token()
        }

        if bytes[start] != b'<' || ! is_markup_start(&bytes[start..]) {
            let mut i = start + 1;
            while i < bytes.len() && ! (bytes[i] == b'<' && is_markup_start(&bytes[i..])) {
                i += 1;
            }
            self.pos = i;
            return Ok(Some((start, Token::Text(&self.input[start..i]))))
        }

        let rest = &self.input[start..];
        if rest.starts_with(COMMENT_START) {
            let data_start = start + COMMENT_START.len();
            return match self.input[data_start..].find(COMMENT_END) {
                Some(len) => {
                    self.pos = data_start + len + COMMENT_END.len();
                    Ok(Some((start, Token::Comment(&self.input[data_start..data_start + len]))))
                }
                None => Err(parse_error(start, "unterminated comment"))
            }
        }
        if starts_with_ignore_ascii_case(&bytes[start..], b"<!doctype") {
            return match rest.find('>') {
                Some(len) => {
                    self.pos = start + len + 1;
                    Ok(Some((start, Token::Doctype)))
                }
                None => Err(parse_error(start, "unterminated doctype"))
            }
        }
        if bytes[start + 1] == b'!' || bytes[start + 1] == b'?' {
            // bogus comment
            let data_start = start + if bytes[start + 1] == b'!' { 2 } else { 1 };
            return match self.input[data_start..].find('>') {
                Some(len) => {
                    self.pos = data_start + len + 1;
                    Ok(Some((start, Token::Comment(&self.input[data_start..data_start + len]))))
                }
                None => Err(parse_error(start, "unterminated markup declaration"))
            }
        }
        if bytes[start + 1] == b'/' {
            self.pos = start + 2;
            let name = lowercase(self.take_until(is_tag_name_end));
            self.take_until(|c| c == b'>');
            if self.pos >= bytes.len() {
                return Err(parse_error(start, format!("unterminated end tag </{name}")))
            }
            self.pos += 1;
            return Ok(Some((start, Token::EndTag { name })))
        }

        self.pos = start + 1;
        let name = lowercase(self.take_until(is_tag_name_end));
        let mut attributes: Vec<(KString, KString)> = Vec::new();
        let unterminated = || parse_error(start, format!("unterminated start tag <{name}"));
        let self_closing = loop {
            self.skip_whitespace();
            match bytes.get(self.pos) {
                None => return Err(unterminated()),
                Some(b'>') => {
                    self.pos += 1;
                    break false
                }
                Some(b'/') => {
                    self.pos += 1;
                    if bytes.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        break true
                    }
                    continue
                }
                Some(_) => ()
            }
            let name_start = self.pos;
            // the first character is part of the name even if it's '='
            self.pos += self.input[self.pos..].chars().next().map_or(1, char::len_utf8);
            self.take_until(|c| c.is_ascii_whitespace() || c == b'/' || c == b'>' || c == b'=');
            let att_name = lowercase(&self.input[name_start..self.pos]);
            self.skip_whitespace();
            let value = if bytes.get(self.pos) == Some(&b'=') {
                self.pos += 1;
                self.skip_whitespace();
                match bytes.get(self.pos) {
                    None => return Err(unterminated()),
                    Some(&q) if q == b'"' || q == b'\'' => {
                        self.pos += 1;
                        let v = self.take_until(|c| c == q);
                        if self.pos >= bytes.len() {
                            return Err(unterminated())
                        }
                        self.pos += 1;
                        v
                    }
                    Some(_) => {
                        let value_start = self.pos;
                        if self.input[value_start..].starts_with(COMMENT_START) {
                            match self.input[value_start + COMMENT_START.len()..].find(COMMENT_END) {
                                Some(len) =>
                                    self.pos = value_start + COMMENT_START.len()
                                    + len + COMMENT_END.len(),
                                None => return Err(unterminated())
                            }
                        }
                        self.take_until(|c| c.is_ascii_whitespace() || c == b'>');
                        &self.input[value_start..self.pos]
                    }
                }
            } else {
                ""
            };
            if attributes.iter().any(|(k, _)| *k == att_name) {
                debug!("dropping duplicate attribute {att_name:?} on <{name}>");
            } else {
                attributes.push((att_name, KString::from_ref(value)));
            }
        };

        if ! self_closing && METADB.is_raw_text(&name) {
            self.raw_text = Some(name.clone());
        }
        Ok(Some((start, Token::StartTag { name, attributes, self_closing })))
    }
}

fn is_shadow_template(attributes: &[(KString, KString)]) -> bool {
    attributes.iter().any(|(k, _)| k.as_str() == "shadowroot" || k.as_str() == "shadowrootmode")
}

/// Parses `html` into a new, unattached fragment of `doc`.
///
/// A `<template shadowroot=..>` (or `shadowrootmode`) that is a direct
/// child of an element becomes that element's shadow root, with the
/// template's attributes kept on the `ShadowRoot`. Doctypes are
/// rejected; end tags without a matching open element are errors,
/// other irregularities are recovered from.
pub fn parse_fragment(doc: &Document, html: &str) -> Result<NodeId> {
    let fragment = doc.create_fragment();
    // (tag name, node receiving the children)
    let mut open: Vec<(KString, NodeId)> = Vec::new();
    let mut tokenizer = Tokenizer::new(html);
    while let Some((pos, token)) = tokenizer.next_token()? {
        let container = open.last().map(|(_, n)| *n).unwrap_or(fragment);
        match token {
            Token::Text(s) => {
                let t = doc.create_text(KString::from_ref(s));
                doc.append_child(container, t)?;
            }
            Token::Comment(s) => {
                let c = doc.create_comment(KString::from_ref(s));
                doc.append_child(container, c)?;
            }
            Token::Doctype => {
                Err(parse_error(pos, "a doctype is not allowed inside a fragment"))?
            }
            Token::StartTag { name, attributes, self_closing } => {
                if name.as_str() == "template"
                    && ! self_closing
                    && is_shadow_template(&attributes)
                    && open.last().is_some()
                    && doc.node_type(container) == NodeType::Element
                    && doc.shadow_root(container).is_none()
                {
                    let root = doc.attach_shadow(container, attributes)?;
                    open.push((name, root));
                } else {
                    let has_closing_tag = METADB.has_closing_tag(&name);
                    let e = doc.create_element(name.clone(), attributes);
                    doc.append_child(container, e)?;
                    if has_closing_tag && ! self_closing {
                        open.push((name, e));
                    }
                }
            }
            Token::EndTag { name } => {
                if ! METADB.has_closing_tag(&name) {
                    debug!("ignoring end tag </{name}> of void element at byte {pos}");
                    continue;
                }
                match open.iter().rposition(|(tag, _)| *tag == name) {
                    Some(i) => {
                        if i + 1 < open.len() {
                            debug!("</{name}> at byte {pos} closes {} unclosed element(s)",
                                   open.len() - i - 1);
                        }
                        open.truncate(i);
                    }
                    None => Err(parse_error(
                        pos, format!("end tag </{name}> does not match any open element")))?
                }
            }
        }
    }
    if ! open.is_empty() {
        debug!("implicitly closing {} element(s) at end of input", open.len());
    }
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Print;

    fn round_trip(html: &str) -> Result<String> {
        let doc = Document::new();
        let f = parse_fragment(&doc, html)?;
        f.to_html_string(&doc)
    }

    #[test]
    fn t_verbatim_round_trip() -> Result<()> {
        for html in [
            "<p class=\"a\" id=b data-x='1'>Hello &amp; <b>world</b></p>",
            "<ul><li>one</li><li>two</li></ul><!-- note --> tail",
            "<input disabled><br><img src=\"x.png\" alt=\"\">",
            "<script>if (a < b && c > d) { x = '</p>'; }</script>",
            "<x-card title=\"t\"><span slot=\"s\">light</span></x-card>",
            "a < b > c",
        ] {
            let expected = html
                .replace("id=b", "id=\"b\"")
                .replace("data-x='1'", "data-x=\"1\"")
                .replace("alt=\"\"", "alt");
            assert_eq!(round_trip(html)?, expected);
        }
        Ok(())
    }

    #[test]
    fn t_attribute_order_and_case() -> Result<()> {
        let doc = Document::new();
        let f = parse_fragment(&doc, "<DIV Zeta=1 alpha=2 zeta=3 Mid>x</div>")?;
        let div = doc.children(f)[0];
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
        let names: Vec<String> = doc.attributes(div).into_iter()
            .map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(names, vec!["zeta=1", "alpha=2", "mid="]);
        Ok(())
    }

    #[test]
    fn t_unquoted_comment_value() -> Result<()> {
        let doc = Document::new();
        let f = parse_fragment(&doc, "<x-a v=<!--m 1--> w=<!--m-->x>")?;
        let a = doc.children(f)[0];
        assert_eq!(doc.get_attribute(a, "v").as_deref(), Some("<!--m 1-->"));
        assert_eq!(doc.get_attribute(a, "w").as_deref(), Some("<!--m-->x"));
        Ok(())
    }

    #[test]
    fn t_declarative_shadow_root() -> Result<()> {
        let doc = Document::new();
        let f = parse_fragment(
            &doc,
            "<x-a><template shadowroot=\"open\"><p>in</p></template>\
             <template shadowroot=\"open\">second</template>light</x-a>")?;
        let host = doc.children(f)[0];
        let shadow = doc.shadow_root(host).expect("shadow root");
        assert_eq!(shadow.attributes,
                   vec![(KString::from_static("shadowroot"), KString::from_static("open"))]);
        assert_eq!(doc.children(shadow.root).len(), 1);
        // the second one stays an ordinary template
        let light = doc.children(host);
        assert_eq!(light.len(), 2);
        assert_eq!(doc.tag_name(light[0]).as_deref(), Some("template"));
        assert_eq!(f.to_html_string(&doc)?,
                   "<x-a><template shadowroot=\"open\"><p>in</p></template>\
                    <template shadowroot=\"open\">second</template>light</x-a>");

        // top level: not attached to anything
        let f = parse_fragment(&doc, "<template shadowrootmode=\"open\">x</template>")?;
        assert_eq!(doc.node_type(doc.children(f)[0]), NodeType::Element);
        Ok(())
    }

    #[test]
    fn t_recovery() -> Result<()> {
        assert_eq!(round_trip("<div><p>a</div>b")?, "<div><p>a</p></div>b");
        assert_eq!(round_trip("<div><span>open")?, "<div><span>open</span></div>");
        assert_eq!(round_trip("<x-a/>after")?, "<x-a></x-a>after");
        assert_eq!(round_trip("<br></br>")?, "<br>");
        Ok(())
    }

    #[test]
    fn t_non_ascii_attribute_names() -> Result<()> {
        let doc = Document::new();
        let f = parse_fragment(&doc, "<p über=\"1\" “x”=2 ä>x</p>")?;
        let p = doc.children(f)[0];
        let names: Vec<String> = doc.attributes(p).into_iter()
            .map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(names, vec!["über=1", "“x”=2", "ä="]);
        assert_eq!(f.to_html_string(&doc)?, "<p über=\"1\" “x”=\"2\" ä>x</p>");
        Ok(())
    }

    #[test]
    fn t_errors() {
        let doc = Document::new();
        let err = |html: &str| -> ParseError {
            parse_fragment(&doc, html).expect_err("should fail")
                .downcast::<ParseError>().expect("a ParseError")
        };
        assert_eq!(err("<p>a</div>").pos, 4);
        assert_eq!(err("x<!-- never closed").pos, 1);
        assert_eq!(err("<div class=\"x").pos, 0);
        assert_eq!(err("<p><!DOCTYPE html></p>").pos, 3);
        assert!(err("<a href=x").message.contains("unterminated"));
    }
}
