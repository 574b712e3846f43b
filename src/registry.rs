//! Custom element definitions and the tag to module URL map.

use std::{collections::HashMap, fmt, rc::Rc};

use anyhow::{bail, Result};
use kstring::KString;
use sdom::is_valid_custom_element_name;

use crate::{error::SwellError, serialize::ElementRenderer};

#[derive(Default)]
pub struct Registry {
    // None: registered without a server-render hook.
    elements: HashMap<KString, Option<Rc<dyn ElementRenderer>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<(&str, bool)> = self.elements.iter()
            .map(|(k, v)| (k.as_str(), v.is_some())).collect();
        tags.sort();
        f.debug_struct("Registry").field("elements", &tags).finish()
    }
}

impl Registry {
    pub fn define(
        &mut self,
        tag: &str,
        renderer: Option<Rc<dyn ElementRenderer>>,
    ) -> Result<()> {
        if ! is_valid_custom_element_name(tag) {
            bail!(SwellError::InvalidName { name: tag.into() })
        }
        if self.elements.contains_key(tag) {
            bail!(SwellError::AlreadyDefined { tag: tag.into() })
        }
        self.elements.insert(KString::from_ref(tag), renderer);
        Ok(())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.elements.contains_key(tag)
    }

    /// `None` if `tag` isn't defined, `Some(None)` if it is but has no
    /// hook.
    pub fn renderer(&self, tag: &str) -> Option<Option<Rc<dyn ElementRenderer>>> {
        self.elements.get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Tag name to the URL of the module implementing it client side.
#[derive(Debug, Default, Clone)]
pub struct ModuleMap {
    urls: HashMap<KString, KString>,
}

impl ModuleMap {
    /// Replaces an earlier URL for the same tag.
    pub fn set(&mut self, tag: impl Into<KString>, url: impl Into<KString>) {
        self.urls.insert(tag.into(), url.into());
    }

    pub fn get(&self, tag: &str) -> Option<&KString> {
        self.urls.get(tag)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// What a component module exports: where it is served from, the tag
/// it defines and optionally how it renders on the server.
#[derive(Clone)]
pub struct ModuleDef {
    pub url: KString,
    pub tag: Option<KString>,
    pub renderer: Option<Rc<dyn ElementRenderer>>,
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("url", &self.url)
            .field("tag", &self.tag)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl ModuleDef {
    pub fn new(url: impl Into<KString>) -> Self {
        ModuleDef { url: url.into(), tag: None, renderer: None }
    }

    pub fn tag(mut self, tag: impl Into<KString>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn renderer(mut self, renderer: impl ElementRenderer + 'static) -> Self {
        self.renderer = Some(Rc::new(renderer));
        self
    }

    /// The tag, or `SwellError::MissingIdentity` naming the module.
    pub fn identity(&self) -> Result<&KString> {
        match &self.tag {
            Some(tag) => Ok(tag),
            None => bail!(SwellError::MissingIdentity { url: self.url.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_define() -> Result<()> {
        let mut r = Registry::default();
        r.define("x-a", None)?;
        assert!(r.is_defined("x-a"));
        assert!(matches!(r.renderer("x-a"), Some(None)));
        assert!(r.renderer("x-b").is_none());
        let e = r.define("x-a", None).expect_err("duplicate");
        assert_eq!(e.downcast_ref::<SwellError>(),
                   Some(&SwellError::AlreadyDefined { tag: "x-a".into() }));
        let e = r.define("Nope", None).expect_err("invalid");
        assert_eq!(e.downcast_ref::<SwellError>(),
                   Some(&SwellError::InvalidName { name: "Nope".into() }));
        assert_eq!(r.len(), 1);
        Ok(())
    }

    #[test]
    fn t_module_map_and_identity() {
        let mut m = ModuleMap::default();
        m.set("x-a", "/a.js");
        m.set("x-a", "/a2.js");
        assert_eq!(m.get("x-a").map(|s| s.as_str()), Some("/a2.js"));
        assert_eq!(m.len(), 1);

        let def = ModuleDef::new("/components/nameless.js");
        let e = def.identity().expect_err("no tag");
        assert!(e.to_string().contains("/components/nameless.js"));
        assert!(ModuleDef::new("/b.js").tag("x-b").identity().is_ok());
    }
}
