use std::{env, fmt::Display, path::Path, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hydration {
    /// Emit activation directives for elements carrying the hydrate
    /// attribute.
    Full,
    /// Render statically only.
    None,
}

impl Default for Hydration {
    fn default() -> Self {
        Hydration::Full
    }
}

impl FromStr for Hydration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Hydration::Full),
            "none" => Ok(Hydration::None),
            _ => bail!("unknown hydration mode {s:?}, expecting \"full\" or \"none\"")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub hydration: Hydration,
    /// Attribute naming the hydration condition, e.g.
    /// `<x-a swell-hydrate="visible">`.
    pub hydrate_attribute: String,
    /// Companion attribute holding the media query for the `media`
    /// condition.
    pub query_attribute: String,
    /// Script appended by `page()` when shadow roots were emitted.
    pub polyfill_url: Option<String>,
    pub marker_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hydration: Hydration::Full,
            hydrate_attribute: "swell-hydrate".into(),
            query_attribute: "swell-query".into(),
            polyfill_url: None,
            marker_prefix: "swell-".into(),
        }
    }
}

fn opt_get_env<T: FromStr>(varname: &str) -> Result<Option<T>>
    where T::Err: Display
{
    match env::var(varname) {
        Ok(s) => {
            Ok(Some(s.parse().map_err(
                |e| anyhow!("could not parse {varname:?} env var with contents {s:?}: {e}"))?))
        },
        Err(e) => match e {
            env::VarError::NotPresent => Ok(None),
            env::VarError::NotUnicode(_) => bail!("could not decode {varname:?} env var: {e}")
        }
    }
}

impl Config {
    pub fn hydration(mut self, hydration: Hydration) -> Self {
        self.hydration = hydration;
        self
    }

    pub fn hydrate_attribute(mut self, name: impl Into<String>) -> Self {
        self.hydrate_attribute = name.into();
        self
    }

    pub fn query_attribute(mut self, name: impl Into<String>) -> Self {
        self.query_attribute = name.into();
        self
    }

    pub fn polyfill_url(mut self, url: impl Into<String>) -> Self {
        self.polyfill_url = Some(url.into());
        self
    }

    pub fn marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = prefix.into();
        self
    }

    /// Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| anyhow!("reading config file {path:?}"))?;
        serde_json::from_str(&s)
            .with_context(|| anyhow!("parsing config file {path:?}"))
    }

    /// Overrides the given fields from the `SWELL_*` environment
    /// variables that are set.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(v) = opt_get_env("SWELL_HYDRATION")? {
            self.hydration = v;
        }
        if let Some(v) = opt_get_env("SWELL_HYDRATE_ATTRIBUTE")? {
            self.hydrate_attribute = v;
        }
        if let Some(v) = opt_get_env("SWELL_QUERY_ATTRIBUTE")? {
            self.query_attribute = v;
        }
        if let Some(v) = opt_get_env::<String>("SWELL_POLYFILL_URL")? {
            self.polyfill_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = opt_get_env("SWELL_MARKER_PREFIX")? {
            self.marker_prefix = v;
        }
        Ok(self)
    }

    pub fn from_env() -> Result<Self> {
        Config::default().with_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn t_json_defaults() -> Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        write!(f, r#"{{ "hydration": "none", "polyfill_url": "/dsd.js" }}"#)?;
        let c = Config::from_json_file(f.path())?;
        assert_eq!(c, Config::default().hydration(Hydration::None).polyfill_url("/dsd.js"));

        let mut f = tempfile::NamedTempFile::new()?;
        write!(f, r#"{{ "hydration": "sometimes" }}"#)?;
        assert!(Config::from_json_file(f.path()).is_err());
        Ok(())
    }

    #[test]
    fn t_env() -> Result<()> {
        // Only this test touches these variables.
        env::set_var("SWELL_QUERY_ATTRIBUTE", "data-query");
        env::set_var("SWELL_HYDRATION", "none");
        let c = Config::from_env()?;
        assert_eq!(c.query_attribute, "data-query");
        assert_eq!(c.hydration, Hydration::None);
        env::set_var("SWELL_HYDRATION", "partial");
        let e = Config::from_env().expect_err("bad hydration mode");
        assert!(e.to_string().contains("SWELL_HYDRATION"));
        env::remove_var("SWELL_HYDRATION");
        env::remove_var("SWELL_QUERY_ATTRIBUTE");
        Ok(())
    }
}
