use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use anyhow::Result;
use futures::{future, stream, StreamExt};
use kstring::KString;
use sdom::Document;
use tracing::{debug, warn};

use crate::{compile::compile_template,
            config::{Config, Hydration},
            hydrate::{Directive, HydrationStrategy, HydrationTarget, Idle, Load, Media, Visible},
            literal::{Literal, SiteKey, TemplateCall},
            marker::Marker,
            part::CompiledTemplate,
            registry::{ModuleDef, ModuleMap, Registry},
            render::{render_template, RenderState},
            serialize::ElementRenderer,
            value::{collect_chunks, error_chunk, Chunks, Value}};

struct Inner {
    config: Config,
    marker: Marker,
    registry: RefCell<Registry>,
    modules: RefCell<ModuleMap>,
    // Searched from the end, so later additions win.
    strategies: RefCell<Vec<Rc<dyn HydrationStrategy>>>,
    cache: RefCell<HashMap<SiteKey, Rc<CompiledTemplate>>>,
    // Components are mounted here while being serialized.
    scratch: Document,
}

/// The rendering engine: custom element registry, module map,
/// hydration strategies and the compiled template cache. Cheap to
/// clone (all clones share state); single threaded.
///
/// Elements should be defined before the first template using them
/// is rendered, as compiled templates are cached.
#[derive(Clone)]
pub struct Swell(Rc<Inner>);

impl fmt::Debug for Swell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swell")
            .field("config", &self.0.config)
            .field("registry", &*self.0.registry.borrow())
            .field("modules", &*self.0.modules.borrow())
            .field("cached_templates", &self.cache_len())
            .finish()
    }
}

impl Swell {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let marker = Marker::new(&config.marker_prefix)?;
        let strategies: Vec<Rc<dyn HydrationStrategy>> = vec![
            Rc::new(Load), Rc::new(Idle), Rc::new(Media), Rc::new(Visible)
        ];
        Ok(Swell(Rc::new(Inner {
            config,
            marker,
            registry: Default::default(),
            modules: Default::default(),
            strategies: RefCell::new(strategies),
            cache: Default::default(),
            scratch: Document::new(),
        })))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub(crate) fn marker(&self) -> &Marker {
        &self.0.marker
    }

    pub(crate) fn scratch(&self) -> &Document {
        &self.0.scratch
    }

    // ---- registry ----

    /// Defines `tag` with a server-side render hook.
    pub fn define(&self, tag: &str, renderer: impl ElementRenderer + 'static) -> Result<()> {
        self.0.registry.borrow_mut().define(tag, Some(Rc::new(renderer)))
    }

    /// Defines `tag` without a hook: its parts are still hydrated, but
    /// serialized with the generic element rule.
    pub fn define_plain(&self, tag: &str) -> Result<()> {
        self.0.registry.borrow_mut().define(tag, None)
    }

    /// Defines the module's tag (with its renderer, if any) and maps
    /// the tag to the module's URL.
    pub fn define_module(&self, module: ModuleDef) -> Result<()> {
        let tag = module.identity()?.clone();
        self.0.registry.borrow_mut().define(&tag, module.renderer.clone())?;
        self.set_module_url(tag, module.url);
        Ok(())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.0.registry.borrow().is_defined(tag)
    }

    pub(crate) fn renderer_for(&self, tag: &str) -> Option<Option<Rc<dyn ElementRenderer>>> {
        self.0.registry.borrow().renderer(tag)
    }

    pub fn set_module_url(&self, tag: impl Into<KString>, url: impl Into<KString>) {
        self.0.modules.borrow_mut().set(tag, url);
    }

    pub fn module_url(&self, tag: &str) -> Option<KString> {
        self.0.modules.borrow().get(tag).cloned()
    }

    // ---- hydration ----

    /// Adds a strategy; it takes precedence over earlier ones serving
    /// the same condition.
    pub fn add_strategy(&self, strategy: impl HydrationStrategy + 'static) {
        self.0.strategies.borrow_mut().push(Rc::new(strategy));
    }

    /// The directive for an element with the given attributes, if it
    /// asks for hydration and can be served. Unknown conditions and
    /// tags without module URL are logged and rendered without one.
    pub fn directive_for(
        &self,
        tag: &str,
        attributes: &[(KString, KString)],
    ) -> Result<Option<Directive>> {
        let config = &self.0.config;
        if config.hydration == Hydration::None {
            return Ok(None)
        }
        let condition = match attributes.iter()
            .find(|(k, _)| k.as_str() == config.hydrate_attribute)
        {
            Some((_, v)) => v,
            None => return Ok(None)
        };
        let url = match self.module_url(tag) {
            Some(url) => url,
            None => {
                warn!("<{tag}> asks for {condition:?} hydration but has no module URL");
                return Ok(None)
            }
        };
        let strategy = self.0.strategies.borrow().iter().rev()
            .find(|s| s.condition() == condition.as_str())
            .cloned();
        let strategy = match strategy {
            Some(s) => s,
            None => {
                warn!("no hydration strategy for condition {condition:?} (on <{tag}>)");
                return Ok(None)
            }
        };
        let target = HydrationTarget {
            tag,
            url: &url,
            attributes,
            query_attribute: &config.query_attribute,
        };
        strategy.directive(&target).map(Some)
    }

    // ---- compilation ----

    /// The compiled form of `literal`, from the cache if this call
    /// site was compiled before. Failures are not cached.
    pub fn compile(&self, literal: Literal) -> Result<Rc<CompiledTemplate>> {
        let site = literal.site();
        if let Some(template) = self.0.cache.borrow().get(&site) {
            return Ok(template.clone())
        }
        let template = Rc::new(compile_template(self, literal)?);
        debug!(parts = template.parts().len(),
               placeholders = template.placeholders(),
               "compiled template");
        self.0.cache.borrow_mut().insert(site, template.clone());
        Ok(template)
    }

    pub fn cache_len(&self) -> usize {
        self.0.cache.borrow().len()
    }

    // ---- rendering ----

    /// Compiles (if needed) and renders `call`: custom elements
    /// hydrated and serialized, hydration directives added. Errors
    /// are items of the returned stream.
    ///
    /// Values are not escaped: in text and in attribute values outside
    /// of custom elements they are spliced in verbatim, while attribute
    /// bindings of custom elements get `"` escaped on serialization.
    /// Use `sdom::escape_text` / `sdom::escape_attribute` for untrusted
    /// input.
    pub fn html(&self, call: TemplateCall) -> Chunks {
        self.render_call(call, Rc::new(RenderState::default()))
    }

    pub(crate) fn render_call(&self, call: TemplateCall, state: Rc<RenderState>) -> Chunks {
        let prepared = call.checked().and_then(|call| {
            Ok((self.compile(call.literal)?, call.values))
        });
        match prepared {
            Ok((template, values)) => render_template(self, template, values, state),
            Err(e) => error_chunk(e),
        }
    }

    /// Plain interpolation of `call`, without parsing: values are
    /// resolved the same way, markup is passed through untouched.
    pub fn raw(&self, call: TemplateCall) -> Chunks {
        let call = match call.checked() {
            Ok(call) => call,
            Err(e) => return error_chunk(e),
        };
        let segments = call.literal.segments().iter().map(|s| Value::from(*s));
        Value::List(itertools::interleave(segments, call.values).collect()).into_chunks()
    }

    /// Like `html`, followed by the polyfill script if one is
    /// configured and the render emitted declarative shadow roots.
    pub fn page(&self, call: TemplateCall) -> Chunks {
        let state = Rc::new(RenderState::default());
        let chunks = self.render_call(call, state.clone());
        let polyfill_url = match &self.0.config.polyfill_url {
            Some(url) => url.clone(),
            None => return chunks
        };
        let tail = stream::once(future::lazy(move |_| {
            if state.shadow_roots() > 0 {
                Some(Ok(KString::from_string(format!(
                    "<script type=\"module\" src=\"{}\"></script>",
                    sdom::escape_attribute(&polyfill_url)))))
            } else {
                None
            }
        })).filter_map(future::ready);
        chunks.chain(tail).boxed_local()
    }

    pub async fn render_to_string(&self, call: TemplateCall) -> Result<String> {
        Ok(collect_chunks(self.html(call)).await?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::SwellError,
                part::{Binding, Part},
                serialize::{ElementRef, Pieces, RenderContext, Shadow},
                template};
    use anyhow::anyhow;
    use futures::executor::block_on;

    fn render(engine: &Swell, call: TemplateCall) -> Result<String> {
        block_on(engine.render_to_string(call))
    }

    fn chunks(c: Chunks) -> Result<Vec<String>> {
        block_on(c.map(|r| r.map(|s| s.to_string())).collect::<Vec<_>>())
            .into_iter().collect()
    }

    #[test]
    fn t_future_in_div() -> Result<()> {
        let engine = Swell::new()?;
        let out = render(&engine, template!["<div>", "</div>"; Value::ready(22)])?;
        assert_eq!(out.trim(), "<div>22</div>");
        Ok(())
    }

    #[test]
    fn t_stream_order_not_arrival_order() -> Result<()> {
        let engine = Swell::new()?;
        let (tx, rx) = futures::channel::oneshot::channel::<&'static str>();
        let first = Value::stream(stream::iter(vec![
            Ok::<_, anyhow::Error>(Value::from("a1")),
            Ok(Value::future(async move {
                rx.await.map_err(|e| anyhow!("{e}"))
            })),
        ]));
        let second = Value::stream(stream::iter(vec![
            Ok::<_, anyhow::Error>(Value::from("b1")),
            Ok(Value::from("b2")),
        ]));
        tx.send("a2").map_err(|_| anyhow!("receiver gone"))?;
        let out = render(&engine, template!["<p>", "|", "</p>"; first, second])?;
        assert_eq!(out, "<p>a1a2|b1b2</p>");
        Ok(())
    }

    #[test]
    fn t_pending_value_keeps_its_place() -> Result<()> {
        let engine = Swell::new()?;
        let (tx, rx) = futures::channel::oneshot::channel::<&'static str>();
        let first = Value::future(async move {
            rx.await.map_err(|e| anyhow!("{e}"))
        });
        let chunks = engine.html(template!["<p>", "|", "</p>"; first, "b"]);
        // "b" is ready long before "a" arrives
        let (out, sent) = block_on(future::join(
            collect_chunks(chunks),
            async move { tx.send("a") }));
        assert!(sent.is_ok());
        assert_eq!(out?.as_str(), "<p>a|b</p>");
        Ok(())
    }

    #[test]
    fn t_empty_values() -> Result<()> {
        let engine = Swell::new()?;
        let out = render(&engine, template!["<i>", "", "</i>"; (), None::<String>])?;
        assert_eq!(out, "<i></i>");
        Ok(())
    }

    #[test]
    fn t_nested_templates() -> Result<()> {
        let engine = Swell::new()?;
        let items: Vec<Value> = ["a", "b"].iter()
            .map(|s| engine.html(template!["<li>", "</li>"; *s]).into())
            .collect();
        let out = render(&engine, template!["<ul>", "</ul>"; items])?;
        assert_eq!(out, "<ul><li>a</li><li>b</li></ul>");
        // one entry per call site, not per call
        assert_eq!(engine.cache_len(), 2);
        Ok(())
    }

    #[test]
    fn t_round_trip_without_values() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_plain("x-card")?;
        let call = template![
            "<!DOCTYPE html>\n<html><head><title>a < b</title></head>\
             <body class=main><!-- c --><x-card open><b>hi</b></x-card>\
             <br><script>let s = '<p>';</script></body></html>"];
        let expected = call.literal.static_text().replace("class=main", "class=\"main\"");
        assert_eq!(render(&engine, call)?, expected);
        Ok(())
    }

    #[test]
    fn t_doctype_first_chunk() -> Result<()> {
        let engine = Swell::new()?;
        let c = chunks(engine.html(
            template!["<!doctype html><p>", "</p>"; Value::ready("x")]))?;
        assert_eq!(c[0], "<!doctype html>");
        assert_eq!(c.concat(), "<!doctype html><p>x</p>");

        // the first part being a component doesn't lose the doctype
        engine.define_plain("x-a")?;
        let c = chunks(engine.html(
            template!["<!doctype html><x-a title=\"", "\"></x-a>"; "t"]))?;
        assert_eq!(c[0], "<!doctype html>");
        assert_eq!(c.concat(), "<!doctype html><x-a title=\"t\"></x-a>");
        Ok(())
    }

    #[test]
    fn t_compile_cached_and_partitioned() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_plain("x-a")?;
        let call = || template![
            "<p>", "</p><x-a a=\"", "\" b=", "><span>", "</span></x-a>", "<i>", "</i>";
            1, 2, 3, 4, 5, 6];
        let t1 = engine.compile(call().literal)?;
        let t2 = engine.compile(call().literal)?;
        assert!(Rc::ptr_eq(&t1, &t2));
        assert_eq!(engine.cache_len(), 1);
        assert!(t1.ranges_partition_values());
        let ranges: Vec<_> = t1.parts().iter().map(|p| p.range()).collect();
        assert_eq!(ranges, vec![0..1, 1..1, 1..4, 4..5, 5..6, 6..6]);
        match &t1.parts()[2] {
            Part::Component(p) => {
                let kinds: Vec<&Binding> = p.bindings.iter().map(|(_, b)| b).collect();
                assert_eq!(kinds, vec![&Binding::Attribute("a".into()),
                                       &Binding::Attribute("b".into()),
                                       &Binding::Text]);
            }
            other => panic!("expected a component part, got {other:?}"),
        }
        assert_eq!(render(&engine, call())?,
                   "<p>1</p><x-a a=\"2\" b=\"3\"><span>4</span></x-a>5<i>6</i>");
        Ok(())
    }

    #[test]
    fn t_plain_component_passthrough() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_plain("x-opaque")?;
        let out = render(&engine, template![
            "<div><x-opaque data-k=\"v\">light <em>dom</em></x-opaque></div>"])?;
        assert_eq!(out, "<div><x-opaque data-k=\"v\">light <em>dom</em></x-opaque></div>");
        let t = engine.compile(template![
            "<x-opaque></x-opaque>"].literal)?;
        assert!(matches!(&t.parts()[0], Part::Component(p) if p.bindings.is_empty()));
        Ok(())
    }

    #[test]
    fn t_attribute_binding() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_plain("x-greet")?;
        let out = render(&engine, template![
            "<x-greet name=\"", "\"></x-greet>"; Value::ready("Ada")])?;
        assert_eq!(out, "<x-greet name=\"Ada\"></x-greet>");
        Ok(())
    }

    #[test]
    fn t_rejected_value_fails_part() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_plain("x-a")?;
        let items = block_on(engine.html(template![
            "<p>before</p><x-a v=\"", "\">", "</x-a>";
            Value::rejected(anyhow!("boom")), "text"]).collect::<Vec<_>>());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().map(|s| s.as_str()).ok(), Some("<p>before</p>"));
        let e = items[1].as_ref().expect_err("the component part fails");
        assert!(format!("{e:#}").contains("boom"));
        assert_eq!(engine.scratch().live_nodes(), 1);
        Ok(())
    }

    #[test]
    fn t_failing_hook_releases_scratch() -> Result<()> {
        let engine = Swell::new()?;
        engine.define("x-bad", |_: &ElementRef, _: &RenderContext| -> Result<Chunks> {
            Err(anyhow!("hook failed"))
        })?;
        let e = render(&engine, template![
            "<x-bad v=\"", "\"><b>", "</b></x-bad>"; "a", "b"])
            .expect_err("the hook fails");
        assert!(format!("{e:#}").contains("hook failed"));
        assert_eq!(engine.scratch().live_nodes(), 1);
        Ok(())
    }

    #[test]
    fn t_shadow_hook() -> Result<()> {
        let engine = Swell::new()?;
        engine.define("x-hello", Shadow::new(|el: &ElementRef| {
            Ok(template!["<p>Hello ", "</p>"; el.attribute("name").unwrap_or("?").to_string()])
        }))?;
        let out = render(&engine, template![
            "<x-hello name=", ">light</x-hello>"; Value::ready("you")])?;
        assert_eq!(out, "<x-hello name=\"you\"><template shadowroot=\"open\">\
                         <p>Hello you</p></template>light</x-hello>");
        assert_eq!(engine.scratch().live_nodes(), 1);
        Ok(())
    }

    #[test]
    fn t_nested_hook_in_light_dom() -> Result<()> {
        let engine = Swell::new()?;
        engine.define("x-inner", |el: &ElementRef, cx: &RenderContext| -> Result<Chunks> {
            let mut out = Pieces::new();
            out.push_str(&cx.open_tag(el));
            out.push_str("[inner]");
            out.push_chunks(cx.children(el)?);
            out.push_str(&cx.close_tag(el));
            Ok(out.into_chunks())
        })?;
        engine.define_plain("x-outer")?;
        let out = render(&engine, template![
            "<x-outer><x-inner k=\"", "\">", "</x-inner></x-outer>"; "v", "t"])?;
        assert_eq!(out, "<x-outer><x-inner k=\"v\">[inner]t</x-inner></x-outer>");
        Ok(())
    }

    #[test]
    fn t_hydration_directives() -> Result<()> {
        let engine = Swell::new()?;
        engine.define_module(ModuleDef::new("/c/x-counter.js").tag("x-counter"))?;
        let out = render(&engine, template![
            "<x-counter swell-hydrate=\"load\" start=\"", "\"></x-counter>"; 3])?;
        assert_eq!(out, "<x-counter swell-hydrate=\"load\" start=\"3\"></x-counter>\
                         <script type=\"module\">import \"/c/x-counter.js\";</script>");

        // not defined on the server: directive added at compile time
        engine.set_module_url("x-client", "/c/x-client.js");
        let out = render(&engine, template![
            "<x-client swell-hydrate=\"visible\"></x-client>"])?;
        assert!(out.starts_with("<x-client swell-hydrate=\"visible\"></x-client><script>"));
        assert!(out.contains("import(\"/c/x-client.js\")"));

        // unknown condition or URL: rendered without directive
        let out = render(&engine, template![
            "<x-counter swell-hydrate=\"never\"></x-counter>\
             <x-other swell-hydrate=\"load\"></x-other>"])?;
        assert_eq!(out, "<x-counter swell-hydrate=\"never\"></x-counter>\
                         <x-other swell-hydrate=\"load\"></x-other>");
        Ok(())
    }

    #[test]
    fn t_hydration_none() -> Result<()> {
        let engine = Swell::with_config(Config::default().hydration(Hydration::None))?;
        engine.define_module(ModuleDef::new("/x-a.js").tag("x-a"))?;
        let out = render(&engine, template!["<x-a swell-hydrate=\"load\"></x-a>"])?;
        assert_eq!(out, "<x-a swell-hydrate=\"load\"></x-a>");
        Ok(())
    }

    #[test]
    fn t_raw() -> Result<()> {
        let engine = Swell::new()?;
        let out = block_on(collect_chunks(engine.raw(template![
            "<p ", "><unclosed", "</div>"; "a=\"b\"", Value::ready(vec![1, 2])])))?;
        assert_eq!(out.as_str(), "<p a=\"b\"><unclosed12</div>");
        assert_eq!(engine.cache_len(), 0);
        Ok(())
    }

    #[test]
    fn t_page_polyfill() -> Result<()> {
        let engine = Swell::with_config(Config::default().polyfill_url("/dsd.js"))?;
        let out = block_on(collect_chunks(engine.page(template!["<p>no shadow</p>"])))?;
        assert_eq!(out.as_str(), "<p>no shadow</p>");
        let out = block_on(collect_chunks(engine.page(template![
            "<div><template shadowroot=\"open\">s</template></div>"])))?;
        assert_eq!(out.as_str(), "<div><template shadowroot=\"open\">s</template></div>\
                                  <script type=\"module\" src=\"/dsd.js\"></script>");
        Ok(())
    }

    #[test]
    fn t_definition_errors() -> Result<()> {
        let engine = Swell::new()?;
        let e = engine.define_module(ModuleDef::new("/lib/anon.js")).expect_err("no tag");
        assert_eq!(e.downcast_ref::<SwellError>(),
                   Some(&SwellError::MissingIdentity { url: "/lib/anon.js".into() }));
        assert!(engine.define_plain("nohyphen").is_err());
        engine.define_plain("x-a")?;
        assert!(engine.define_plain("x-a").is_err());
        Ok(())
    }

    #[test]
    fn t_parse_error_not_cached() -> Result<()> {
        let engine = Swell::new()?;
        let call = || template!["<p>", "</div>"; 1];
        let e = render(&engine, call()).expect_err("stray end tag");
        assert!(e.downcast_ref::<sdom::ParseError>().is_some());
        assert_eq!(engine.cache_len(), 0);
        assert!(render(&engine, call()).is_err());
        Ok(())
    }

    #[test]
    fn t_value_count_and_unsupported() -> Result<()> {
        let engine = Swell::new()?;
        static SEGMENTS: [&str; 2] = ["<p>", "</p>"];
        let e = render(&engine, TemplateCall::new(Literal::new(&SEGMENTS), vec![]))
            .expect_err("missing value");
        assert!(matches!(e.downcast_ref::<SwellError>(),
                         Some(SwellError::ValueCount { expected: 1, got: 0 })));

        engine.define_plain("x-a")?;
        let e = render(&engine, template!["<x-a title=\"a ", "\"></x-a>"; 1])
            .expect_err("partial attribute placeholder");
        assert!(matches!(e.downcast_ref::<SwellError>(),
                         Some(SwellError::UnsupportedPlaceholder { .. })));
        Ok(())
    }

    #[test]
    fn t_placeholders_in_static_attributes_and_scripts() -> Result<()> {
        let engine = Swell::new()?;
        let out = render(&engine, template![
            "<a class=\"btn ", "\" href=", ">go</a><script>let n = ", ";</script>";
            "primary", "/next", 42])?;
        assert_eq!(out, "<a class=\"btn primary\" href=\"/next\">go</a><script>let n = 42;</script>");
        Ok(())
    }
}
