use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ManifestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Json,
    Pdf,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Markdown => write!(f, "markdown"),
            SourceFormat::Json => write!(f, "json"),
            SourceFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "markdown" => Ok(SourceFormat::Markdown),
            "json" => Ok(SourceFormat::Json),
            "pdf" => Ok(SourceFormat::Pdf),
            other => Err(ManifestError::InvalidSourceFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{0,63}$").unwrap())
}

impl FromStr for CollectionId {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if !id_pattern().is_match(&normalized) {
            return Err(ManifestError::InvalidCollectionId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Where a manifest document comes from: a file on disk or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Local(Utf8PathBuf),
    Remote(Url),
}

impl ManifestSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ManifestSource::Local(_) => "local",
            ManifestSource::Remote(_) => "remote",
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestSource::Local(path) => write!(f, "{path}"),
            ManifestSource::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl FromStr for ManifestSource {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ManifestError::InvalidManifestSource(value.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|_| ManifestError::InvalidManifestSource(value.to_string()))?;
            return Ok(ManifestSource::Remote(url));
        }
        Ok(ManifestSource::Local(Utf8PathBuf::from(trimmed)))
    }
}
