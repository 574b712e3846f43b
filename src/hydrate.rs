//! Hydration strategies: client activation directives spliced next to
//! an element's server-rendered output.

use anyhow::{anyhow, Context, Result};
use kstring::KString;

/// The element a directive is produced for.
#[derive(Debug, Clone, Copy)]
pub struct HydrationTarget<'a> {
    pub tag: &'a str,
    /// Module URL from the module map.
    pub url: &'a str,
    pub attributes: &'a [(KString, KString)],
    /// Name of the companion attribute carrying a media query.
    pub query_attribute: &'a str,
}

impl<'a> HydrationTarget<'a> {
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attributes.iter().find(|(k, _)| k.as_str() == name).map(|(_, v)| v.as_str())
    }
}

/// Markup emitted immediately before and after the element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    pub before: String,
    pub after: String,
}

impl Directive {
    pub fn after(after: String) -> Self {
        Directive { before: String::new(), after }
    }
}

pub trait HydrationStrategy {
    /// The value of the hydrate attribute this strategy serves.
    fn condition(&self) -> &str;

    fn directive(&self, target: &HydrationTarget) -> Result<Directive>;
}

/// JSON string literal that is also safe inside a `<script>` element.
pub fn js_string(s: &str) -> Result<String> {
    let quoted = serde_json::to_string(s)
        .with_context(|| anyhow!("quoting {s:?} for a script"))?;
    Ok(quoted.replace("</", "<\\/"))
}

/// Imports the module right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct Load;

impl HydrationStrategy for Load {
    fn condition(&self) -> &str {
        "load"
    }

    fn directive(&self, target: &HydrationTarget) -> Result<Directive> {
        Ok(Directive::after(format!(
            "<script type=\"module\">import {};</script>",
            js_string(target.url)?)))
    }
}

/// Imports the module once the browser is idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl HydrationStrategy for Idle {
    fn condition(&self) -> &str {
        "idle"
    }

    fn directive(&self, target: &HydrationTarget) -> Result<Directive> {
        Ok(Directive::after(format!(
            "<script type=\"module\">\
             (window.requestIdleCallback || ((cb) => setTimeout(cb, 1)))\
             (() => import({}));</script>",
            js_string(target.url)?)))
    }
}

/// Imports the module when the query in the companion attribute
/// matches, now or later.
#[derive(Debug, Clone, Copy, Default)]
pub struct Media;

impl HydrationStrategy for Media {
    fn condition(&self) -> &str {
        "media"
    }

    fn directive(&self, target: &HydrationTarget) -> Result<Directive> {
        let query = target.attribute(target.query_attribute).ok_or_else(
            || anyhow!("<{}> hydrates on media but has no {:?} attribute",
                       target.tag, target.query_attribute))?;
        Ok(Directive::after(format!(
            "<script type=\"module\">{{\
             const mq = matchMedia({query});\
             const load = () => import({url});\
             if (mq.matches) load(); else {{\
             const on = () => {{ if (mq.matches) {{ \
             mq.removeEventListener(\"change\", on); load(); }} }};\
             mq.addEventListener(\"change\", on); }}\
             }}</script>",
            query = js_string(query)?,
            url = js_string(target.url)?)))
    }
}

/// Imports the module when the element scrolls into view. Classic
/// script, as `document.currentScript` is null in modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct Visible;

impl HydrationStrategy for Visible {
    fn condition(&self) -> &str {
        "visible"
    }

    fn directive(&self, target: &HydrationTarget) -> Result<Directive> {
        Ok(Directive::after(format!(
            "<script>(() => {{\
             const el = document.currentScript.previousElementSibling;\
             const io = new IntersectionObserver((entries) => {{\
             if (entries.some((e) => e.isIntersecting)) {{ \
             io.disconnect(); import({}); }} }});\
             io.observe(el); }})();</script>",
            js_string(target.url)?)))
    }
}
