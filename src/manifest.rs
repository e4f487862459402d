use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{CollectionId, SourceFormat};
use crate::error::ManifestError;

pub const DEFAULT_MANIFEST_FILE: &str = "knowledge-base-manifest.json";
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Raw manifest document as it appears on disk. Entry fields are optional so
/// the validator can report every problem in a partial record; unknown fields
/// are ignored for forward compatibility.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub format_version: Option<u32>,
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
    #[serde(default)]
    pub additional_channels: Vec<ChannelEntry>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct CollectionEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ChannelEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fully typed manifest with every invariant enforced.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub format_version: u32,
    pub collections: Vec<Collection>,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub source: Url,
    pub directory: Option<String>,
    pub description: String,
    pub base_url: Url,
    pub format: SourceFormat,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: CollectionId,
    pub name: String,
    pub description: String,
}

impl ResolvedManifest {
    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections
            .iter()
            .find(|collection| collection.id.as_str() == id)
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.id.as_str() == id)
    }
}

impl Collection {
    /// Joins a relative content link against the collection base URL.
    pub fn resolve_link(&self, link: &str) -> Result<Url, ManifestError> {
        self.base_url
            .join(link)
            .map_err(|_| ManifestError::LinkResolve {
                base: self.base_url.to_string(),
                link: link.to_string(),
            })
    }
}

pub struct ManifestLoader;

impl ManifestLoader {
    /// Reads and parses the manifest file, defaulting to
    /// `knowledge-base-manifest.json` in the current directory.
    pub fn load(path: Option<&str>) -> Result<Manifest, ManifestError> {
        let manifest_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_MANIFEST_FILE),
        };

        if path.is_none() && !manifest_path.exists() {
            return Err(ManifestError::MissingManifest);
        }

        let content = fs::read_to_string(&manifest_path)
            .map_err(|_| ManifestError::ManifestRead(manifest_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Manifest, ManifestError> {
        serde_json::from_str(content).map_err(|err| ManifestError::ManifestParse(err.to_string()))
    }

    pub fn resolve(path: Option<&str>) -> Result<ResolvedManifest, ManifestError> {
        Self::resolve_manifest(Self::load(path)?)
    }

    /// Enforces the manifest invariants, aborting on the first violation.
    pub fn resolve_manifest(manifest: Manifest) -> Result<ResolvedManifest, ManifestError> {
        let format_version = manifest.format_version.unwrap_or(1);
        if format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedFormatVersion(format_version));
        }

        let mut seen = HashSet::new();
        let mut collections = Vec::with_capacity(manifest.collections.len());
        for (index, entry) in manifest.collections.into_iter().enumerate() {
            let collection = resolve_collection(index, entry)?;
            if !seen.insert(collection.id.clone()) {
                return Err(ManifestError::DuplicateId(collection.id.to_string()));
            }
            collections.push(collection);
        }

        let mut channels = Vec::with_capacity(manifest.additional_channels.len());
        for (index, entry) in manifest.additional_channels.into_iter().enumerate() {
            let channel = resolve_channel(index, entry)?;
            if !seen.insert(channel.id.clone()) {
                return Err(ManifestError::DuplicateId(channel.id.to_string()));
            }
            channels.push(channel);
        }

        Ok(ResolvedManifest {
            format_version,
            collections,
            channels,
        })
    }
}

fn resolve_collection(index: usize, entry: CollectionEntry) -> Result<Collection, ManifestError> {
    let id: CollectionId = require(index, "id", entry.id)?.parse()?;
    let name = require(index, "name", entry.name)?;
    let description = require(index, "description", entry.description)?;
    let source = parse_url("source", &require(index, "source", entry.source)?)?;
    let base_url = parse_url("base_url", &require(index, "base_url", entry.base_url)?)?;
    let format: SourceFormat = require(index, "format", entry.format)?.parse()?;

    if let Some(directory) = &entry.directory {
        if !is_safe_directory(directory) {
            return Err(ManifestError::InvalidDirectory {
                id: id.to_string(),
                directory: directory.clone(),
            });
        }
    }

    Ok(Collection {
        id,
        name,
        source,
        directory: entry.directory,
        description,
        base_url,
        format,
    })
}

fn resolve_channel(index: usize, entry: ChannelEntry) -> Result<Channel, ManifestError> {
    Ok(Channel {
        id: require(index, "id", entry.id)?.parse()?,
        name: require(index, "name", entry.name)?,
        description: require(index, "description", entry.description)?,
    })
}

fn require(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, ManifestError> {
    value.ok_or(ManifestError::MissingField { index, field })
}

fn parse_url(field: &str, value: &str) -> Result<Url, ManifestError> {
    Url::parse(value).map_err(|_| ManifestError::InvalidUrl {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Extraction subpaths must stay inside the archive root.
pub fn is_safe_directory(directory: &str) -> bool {
    !directory.is_empty()
        && !directory.starts_with('/')
        && !directory.starts_with('\\')
        && !directory.split(['/', '\\']).any(|part| part == "..")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(id: &str) -> CollectionEntry {
        CollectionEntry {
            name: Some("Example Docs".to_string()),
            id: Some(id.to_string()),
            source: Some("https://example.org/docs.zip".to_string()),
            directory: Some("docs-main/docs".to_string()),
            description: Some("Example documentation".to_string()),
            base_url: Some("https://example.org/docs/".to_string()),
            format: Some("markdown".to_string()),
        }
    }

    #[test]
    fn resolve_defaults_format_version() {
        let manifest = Manifest {
            format_version: None,
            collections: vec![entry("example")],
            additional_channels: Vec::new(),
        };

        let resolved = ManifestLoader::resolve_manifest(manifest).unwrap();
        assert_eq!(resolved.format_version, 1);
        assert_eq!(resolved.collections.len(), 1);
        assert_eq!(resolved.collections[0].format, SourceFormat::Markdown);
    }

    #[test]
    fn resolve_rejects_duplicate_ids() {
        let manifest = Manifest {
            format_version: Some(1),
            collections: vec![entry("example"), entry("example")],
            additional_channels: Vec::new(),
        };

        let err = ManifestLoader::resolve_manifest(manifest).unwrap_err();
        assert_matches!(err, ManifestError::DuplicateId(_));
    }

    #[test]
    fn resolve_rejects_duplicate_id_across_channels() {
        let manifest = Manifest {
            format_version: Some(1),
            collections: vec![entry("example")],
            additional_channels: vec![ChannelEntry {
                name: Some("Example Channel".to_string()),
                id: Some("example".to_string()),
                description: Some("Placeholder".to_string()),
            }],
        };

        let err = ManifestLoader::resolve_manifest(manifest).unwrap_err();
        assert_matches!(err, ManifestError::DuplicateId(_));
    }

    #[test]
    fn resolve_rejects_missing_field() {
        let mut broken = entry("example");
        broken.base_url = None;
        let manifest = Manifest {
            format_version: Some(1),
            collections: vec![broken],
            additional_channels: Vec::new(),
        };

        let err = ManifestLoader::resolve_manifest(manifest).unwrap_err();
        assert_matches!(err, ManifestError::MissingField { field: "base_url", .. });
    }

    #[test]
    fn resolve_rejects_future_format_version() {
        let manifest = Manifest {
            format_version: Some(2),
            collections: Vec::new(),
            additional_channels: Vec::new(),
        };

        let err = ManifestLoader::resolve_manifest(manifest).unwrap_err();
        assert_matches!(err, ManifestError::UnsupportedFormatVersion(2));
    }

    #[test]
    fn resolve_rejects_traversal_directory() {
        let mut broken = entry("example");
        broken.directory = Some("../outside".to_string());
        let manifest = Manifest {
            format_version: Some(1),
            collections: vec![broken],
            additional_channels: Vec::new(),
        };

        let err = ManifestLoader::resolve_manifest(manifest).unwrap_err();
        assert_matches!(err, ManifestError::InvalidDirectory { .. });
    }

    #[test]
    fn parse_ignores_unknown_fields() {
        let manifest = ManifestLoader::parse(
            r#"{
                "format_version": 1,
                "future_section": {"anything": true},
                "collections": [{
                    "name": "Example Docs",
                    "id": "example",
                    "source": "https://example.org/docs.zip",
                    "description": "Example documentation",
                    "base_url": "https://example.org/docs/",
                    "format": "markdown",
                    "mirror": "https://mirror.example.org/docs.zip"
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.collections.len(), 1);
        ManifestLoader::resolve_manifest(manifest).unwrap();
    }

    #[test]
    fn resolve_link_joins_against_base_url() {
        let manifest = Manifest {
            format_version: Some(1),
            collections: vec![entry("example")],
            additional_channels: Vec::new(),
        };
        let resolved = ManifestLoader::resolve_manifest(manifest).unwrap();
        let collection = resolved.collection("example").unwrap();

        let url = collection.resolve_link("guide/install.md").unwrap();
        assert_eq!(url.as_str(), "https://example.org/docs/guide/install.md");
    }
}
