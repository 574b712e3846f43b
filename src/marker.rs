use std::fmt::Write;

use anyhow::{bail, Result};
use kstring::KString;

/// The placeholder substituted for each interpolation before parsing:
/// a comment `<!--{prefix}{16 random hex digits}-->` that authored
/// markup will not contain by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    data: KString,
    token: KString,
}

/// 8 entropy bytes as 16 lowercase hex digits.
pub fn randomidstring() -> Result<String, getrandom::Error> {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf)?;
    let mut s = String::new();
    for byte in buf {
        write!(&mut s, "{:02x}", byte).expect("writing to a String can't fail");
    }
    Ok(s)
}

fn check_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("marker prefix must not be empty")
    }
    if ! prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!("marker prefix {prefix:?} may only contain ASCII letters, digits, '-' and '_'")
    }
    if prefix.contains("--") || prefix.starts_with('-') {
        bail!("marker prefix {prefix:?} can't be part of a comment")
    }
    Ok(())
}

impl Marker {
    pub fn new(prefix: &str) -> Result<Self> {
        check_prefix(prefix)?;
        let id = randomidstring()
            .map_err(|e| anyhow::anyhow!("getting random bytes for the marker: {e}"))?;
        Ok(Self::from_data(format!("{prefix}{id}")))
    }

    fn from_data(data: String) -> Self {
        let token = format!("<!--{data}-->");
        Marker {
            data: KString::from_string(data),
            token: KString::from_string(token),
        }
    }

    /// The comment content.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The full comment as it appears in the joined template text.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn join(&self, segments: &[&str]) -> String {
        segments.join(self.token())
    }
}
