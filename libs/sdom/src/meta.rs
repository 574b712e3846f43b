//! Per-tag knowledge needed to parse and print HTML fragments.

use std::collections::HashMap;

use kstring::KString;
use lazy_static::lazy_static;

#[derive(Debug)]
pub struct ElementMeta {
    pub tag_name: KString,
    pub has_closing_tag: bool,
    /// Content is kept as a single text node, markup inside it is
    /// not recognized.
    pub raw_text: bool,
}

impl PartialEq for ElementMeta {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.tag_name == other.tag_name
    }
}

impl Eq for ElementMeta {}

// Only tags that deviate from the default (closing tag, parsed
// content) are listed.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title",
];

// Names the HTML standard reserves even though they contain a hyphen.
const RESERVED_HYPHENATED_NAMES: &[&str] = &[
    "annotation-xml", "color-profile", "font-face", "font-face-src",
    "font-face-uri", "font-face-format", "font-face-name", "missing-glyph",
];

#[derive(Debug)]
pub struct MetaDb {
    pub elementmeta: HashMap<KString, ElementMeta>,
    default_meta: ElementMeta,
}

impl MetaDb {
    fn html5() -> MetaDb {
        let mut elementmeta = HashMap::new();
        for &name in VOID_ELEMENTS {
            elementmeta.insert(KString::from_static(name), ElementMeta {
                tag_name: KString::from_static(name),
                has_closing_tag: false,
                raw_text: false,
            });
        }
        for &name in RAW_TEXT_ELEMENTS {
            elementmeta.insert(KString::from_static(name), ElementMeta {
                tag_name: KString::from_static(name),
                has_closing_tag: true,
                raw_text: true,
            });
        }
        MetaDb {
            elementmeta,
            default_meta: ElementMeta {
                tag_name: KString::from_static(""),
                has_closing_tag: true,
                raw_text: false,
            },
        }
    }

    /// Meta for `tag_name`; tags without special treatment share a
    /// default entry (with an empty `tag_name`).
    pub fn get(&self, tag_name: &str) -> &ElementMeta {
        self.elementmeta.get(tag_name).unwrap_or(&self.default_meta)
    }

    pub fn has_closing_tag(&self, tag_name: &str) -> bool {
        self.get(tag_name).has_closing_tag
    }

    pub fn is_raw_text(&self, tag_name: &str) -> bool {
        self.get(tag_name).raw_text
    }
}

lazy_static!{
    pub static ref METADB: MetaDb = MetaDb::html5();
}

/// Whether `name` may be used for a custom element: starts with a
/// lowercase ASCII letter, contains a hyphen, has no uppercase ASCII
/// letters and is not one of the reserved names.
pub fn is_valid_custom_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => (),
        _ => return false
    }
    name.contains('-')
        && ! name.chars().any(|c| c.is_ascii_uppercase()
                              || c.is_ascii_whitespace()
                              || matches!(c, '<' | '>' | '/' | '"' | '\'' | '='))
        && ! RESERVED_HYPHENATED_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_meta() {
        assert!(! METADB.has_closing_tag("br"));
        assert!(! METADB.has_closing_tag("img"));
        assert!(METADB.has_closing_tag("div"));
        assert!(METADB.has_closing_tag("x-foo"));
        assert!(METADB.is_raw_text("script"));
        assert!(! METADB.is_raw_text("p"));
        assert_eq!(METADB.get("wbr").tag_name.as_str(), "wbr");
        assert_eq!(METADB.get("br"), METADB.get("br"));
        assert!(METADB.get("br") != METADB.get("hr"));
    }

    #[test]
    fn t_custom_element_names() {
        assert!(is_valid_custom_element_name("x-foo"));
        assert!(is_valid_custom_element_name("app-root-2"));
        assert!(is_valid_custom_element_name("my-élément"));
        assert!(! is_valid_custom_element_name("div"));
        assert!(! is_valid_custom_element_name("X-foo"));
        assert!(! is_valid_custom_element_name("x-Foo"));
        assert!(! is_valid_custom_element_name("-foo"));
        assert!(! is_valid_custom_element_name("1-foo"));
        assert!(! is_valid_custom_element_name("font-face"));
        assert!(! is_valid_custom_element_name(""));
    }
}
