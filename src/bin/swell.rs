use std::{io::Write, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser as ClapParser;
use futures::{executor::block_on, StreamExt};
use kstring::KString;
use swell::{Config, Hydration, Literal, Swell, TemplateCall};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(clap::Parser, Debug)]
/// Render HTML with custom elements and hydration directives.
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Render a static HTML file, streaming the result to stdout.
    Render {
        /// The HTML file (no doctype except at the very beginning)
        file: PathBuf,

        /// Define a custom element (rendered by the generic element
        /// rule); may be repeated
        #[clap(long)]
        define: Vec<String>,

        /// Map a tag to its client module URL, as TAG=URL; may be
        /// repeated
        #[clap(long)]
        module: Vec<String>,

        /// "full" or "none"
        #[clap(long)]
        hydration: Option<String>,

        /// Declarative shadow DOM polyfill to load when shadow roots
        /// were rendered
        #[clap(long)]
        polyfill: Option<String>,

        /// JSON config file; SWELL_* env vars and the options above
        /// override its settings
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env()
              .unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

fn render(
    file: PathBuf,
    define: Vec<String>,
    module: Vec<String>,
    hydration: Option<String>,
    polyfill: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let mut conf = match &config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    }.with_env()?;
    if let Some(h) = hydration {
        conf = conf.hydration(h.parse::<Hydration>()?);
    }
    if let Some(url) = polyfill {
        conf = conf.polyfill_url(url);
    }

    let engine = Swell::with_config(conf)?;
    for tag in &define {
        engine.define_plain(tag)?;
    }
    for m in &module {
        match m.split_once('=') {
            Some((tag, url)) if ! tag.is_empty() && ! url.is_empty() =>
                engine.set_module_url(KString::from_ref(tag), KString::from_ref(url)),
            _ => bail!("--module expects TAG=URL, got {m:?}")
        }
    }

    let html = std::fs::read_to_string(&file)
        .with_context(|| anyhow!("reading {file:?}"))?;
    // The process renders this one literal, so it may live forever.
    let segments: &'static [&'static str] =
        Box::leak(vec![&*Box::leak(html.into_boxed_str())].into_boxed_slice());
    let call = TemplateCall::new(Literal::new(segments), Vec::new());

    let mut out = std::io::stdout().lock();
    let mut chunks = engine.page(call);
    block_on(async {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.with_context(|| anyhow!("rendering {file:?}"))?;
            out.write_all(chunk.as_bytes())?;
        }
        out.flush()?;
        Ok::<(), anyhow::Error>(())
    })
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    match args.command {
        Command::Render { file, define, module, hydration, polyfill, config } =>
            render(file, define, module, hydration, polyfill, config),
    }
}
