use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use serde::Serialize;
use url::Url;

use crate::domain::SourceFormat;
use crate::error::ManifestError;
use crate::fetch::ManifestClient;
use crate::manifest::{
    ChannelEntry, CollectionEntry, Manifest, ManifestLoader, DEFAULT_MANIFEST_FILE,
};
use crate::store::{Snapshot, Store};
use crate::validate::{validate, Issue};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub manifest: String,
    pub format_version: u32,
    pub collections: usize,
    pub channels: usize,
    pub errors: usize,
    pub warnings: usize,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub collections: Vec<ListEntry>,
    pub channels: Vec<ChannelInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub name: String,
    pub format: String,
    pub source: String,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub entry_type: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: Option<String>,
    pub directory: Option<String>,
    pub base_url: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub id: String,
    pub base_url: String,
    pub link: String,
    pub resolved: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub probes: Vec<ProbeOutcome>,
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub id: String,
    pub field: String,
    pub url: String,
    pub status: Option<u16>,
    pub ok: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub source: String,
    pub action: String,
    pub format_version: u32,
    pub collections: usize,
    pub project_path: String,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub path: String,
    pub collections: usize,
    pub channels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Validate,
    List,
    Info,
    Check,
    Fetch,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<C: ManifestClient> {
    store: Store,
    client: C,
}

impl<C: ManifestClient> App<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    pub fn validate(
        &self,
        path: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, ManifestError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; reading manifest".to_string(),
        });
        let manifest = ManifestLoader::load(path)?;

        sink.event(ProgressEvent {
            message: "phase=Verify; checking schema".to_string(),
        });
        let report = validate(&manifest);
        tracing::debug!(
            errors = report.error_count(),
            warnings = report.warning_count(),
            "manifest validated"
        );

        Ok(ValidateResult {
            manifest: path.unwrap_or(DEFAULT_MANIFEST_FILE).to_string(),
            format_version: report.format_version,
            collections: report.collections,
            channels: report.channels,
            errors: report.error_count(),
            warnings: report.warning_count(),
            issues: report.issues,
        })
    }

    pub fn list(
        &self,
        path: Option<&str>,
        format: Option<SourceFormat>,
        sink: &dyn ProgressSink,
    ) -> Result<ListResult, ManifestError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; reading manifest".to_string(),
        });
        let manifest = ManifestLoader::resolve(path)?;

        let collections = manifest
            .collections
            .iter()
            .filter(|collection| format.map(|f| collection.format == f).unwrap_or(true))
            .map(|collection| ListEntry {
                id: collection.id.to_string(),
                name: collection.name.clone(),
                format: collection.format.to_string(),
                source: collection.source.to_string(),
                directory: collection.directory.clone(),
            })
            .collect();

        let channels = manifest
            .channels
            .iter()
            .map(|channel| ChannelInfo {
                id: channel.id.to_string(),
                name: channel.name.clone(),
                description: channel.description.clone(),
            })
            .collect();

        Ok(ListResult {
            collections,
            channels,
        })
    }

    pub fn info(
        &self,
        path: Option<&str>,
        id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, ManifestError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {id}"),
        });
        let manifest = ManifestLoader::resolve(path)?;

        if let Some(collection) = manifest.collection(id) {
            return Ok(InfoResult {
                entry_type: "collection".to_string(),
                id: collection.id.to_string(),
                name: collection.name.clone(),
                description: collection.description.clone(),
                source: Some(collection.source.to_string()),
                directory: collection.directory.clone(),
                base_url: Some(collection.base_url.to_string()),
                format: Some(collection.format.to_string()),
            });
        }

        if let Some(channel) = manifest.channel(id) {
            return Ok(InfoResult {
                entry_type: "channel".to_string(),
                id: channel.id.to_string(),
                name: channel.name.clone(),
                description: channel.description.clone(),
                source: None,
                directory: None,
                base_url: None,
                format: None,
            });
        }

        Err(ManifestError::CollectionNotFound(id.to_string()))
    }

    pub fn resolve_link(
        &self,
        path: Option<&str>,
        id: &str,
        link: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ResolveResult, ManifestError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {id}"),
        });
        let manifest = ManifestLoader::resolve(path)?;
        let collection = manifest
            .collection(id)
            .ok_or_else(|| ManifestError::CollectionNotFound(id.to_string()))?;

        let resolved = collection.resolve_link(link)?;
        Ok(ResolveResult {
            id: collection.id.to_string(),
            base_url: collection.base_url.to_string(),
            link: link.to_string(),
            resolved: resolved.to_string(),
        })
    }

    pub fn check(
        &self,
        path: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<CheckResult, ManifestError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; reading manifest".to_string(),
        });
        let manifest = ManifestLoader::resolve(path)?;

        let mut probes = Vec::new();
        let mut seen_base_urls = BTreeSet::new();
        for collection in &manifest.collections {
            probes.push(self.probe_one(
                collection.id.as_str(),
                "source",
                &collection.source,
                sink,
            ));
            if seen_base_urls.insert(collection.base_url.to_string()) {
                probes.push(self.probe_one(
                    collection.id.as_str(),
                    "base_url",
                    &collection.base_url,
                    sink,
                ));
            }
        }

        let failures = probes.iter().filter(|probe| !probe.ok).count();
        Ok(CheckResult { probes, failures })
    }

    fn probe_one(
        &self,
        id: &str,
        field: &str,
        url: &Url,
        sink: &dyn ProgressSink,
    ) -> ProbeOutcome {
        sink.event(ProgressEvent {
            message: format!("manifest.request {field} {id}"),
        });
        let start = std::time::Instant::now();
        let outcome = match self.client.probe(url) {
            Ok(info) => ProbeOutcome {
                id: id.to_string(),
                field: field.to_string(),
                url: info.url,
                status: Some(info.status),
                ok: info.ok,
                message: None,
            },
            Err(err) => ProbeOutcome {
                id: id.to_string(),
                field: field.to_string(),
                url: url.to_string(),
                status: None,
                ok: false,
                message: Some(err.to_string()),
            },
        };
        let latency = start.elapsed().as_millis();
        sink.event(ProgressEvent {
            message: format!("manifest.response latency_ms={latency}"),
        });
        outcome
    }

    pub fn fetch(
        &self,
        url: &Url,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, ManifestError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; manifest {url}"),
        });
        self.store.ensure_project_root()?;
        self.store.ensure_cache_root()?;

        let project_path = self.store.project_manifest_path();
        let cache_path = self.store.cache_manifest_path();

        if !options.force && Store::exists(&project_path) {
            sink.event(ProgressEvent {
                message: "phase=Store; already in project store".to_string(),
            });
            let snapshot = Store::read_snapshot(&self.store.project_snapshot_path())?;
            return Ok(FetchResult {
                source: url.to_string(),
                action: "project".to_string(),
                format_version: snapshot.map(|s| s.format_version).unwrap_or(1),
                collections: count_collections(&project_path),
                project_path: project_path.to_string(),
                cache_path: Store::exists(&cache_path).then(|| cache_path.to_string()),
            });
        }

        if !options.force && Store::exists(&cache_path) {
            sink.event(ProgressEvent {
                message: "phase=Store; using cached manifest".to_string(),
            });
            Store::copy_file_atomic(&cache_path, &project_path)?;
            let snapshot = match Store::read_snapshot(&self.store.cache_snapshot_path())? {
                Some(cached) => Snapshot {
                    resolved_path: project_path.to_string(),
                    ..cached
                },
                None => Snapshot::new(url.as_str(), 1, project_path.as_str()),
            };
            Store::write_snapshot(&self.store.project_snapshot_path(), &snapshot)?;
            return Ok(FetchResult {
                source: url.to_string(),
                action: "cache".to_string(),
                format_version: snapshot.format_version,
                collections: count_collections(&project_path),
                project_path: project_path.to_string(),
                cache_path: Some(cache_path.to_string()),
            });
        }

        sink.event(ProgressEvent {
            message: "phase=Fetch; downloading manifest".to_string(),
        });
        let temp_dir = tempfile::Builder::new()
            .prefix("biokb-fetch")
            .tempdir_in(self.store.project_root().as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        let temp_path = temp_dir.path().join("manifest.json");

        sink.event(ProgressEvent {
            message: "manifest.request".to_string(),
        });
        let start = std::time::Instant::now();
        let bytes = self.client.fetch_manifest(url, &temp_path)?;
        let latency = start.elapsed().as_millis();
        sink.event(ProgressEvent {
            message: format!("manifest.response latency_ms={latency}"),
        });

        sink.event(ProgressEvent {
            message: "phase=Verify; parsing document".to_string(),
        });
        let content = String::from_utf8(bytes)
            .map_err(|err| ManifestError::ManifestParse(err.to_string()))?;
        let resolved = ManifestLoader::resolve_manifest(ManifestLoader::parse(&content)?)?;

        sink.event(ProgressEvent {
            message: "phase=Store; writing files".to_string(),
        });
        Store::write_bytes_atomic(&project_path, content.as_bytes())?;
        let snapshot = Snapshot::new(url.as_str(), resolved.format_version, project_path.as_str());
        Store::write_snapshot(&self.store.project_snapshot_path(), &snapshot)?;

        if !options.no_cache {
            Store::write_bytes_atomic(&cache_path, content.as_bytes())?;
            let snapshot =
                Snapshot::new(url.as_str(), resolved.format_version, cache_path.as_str());
            Store::write_snapshot(&self.store.cache_snapshot_path(), &snapshot)?;
        }

        Ok(FetchResult {
            source: url.to_string(),
            action: "download".to_string(),
            format_version: resolved.format_version,
            collections: resolved.collections.len(),
            project_path: project_path.to_string(),
            cache_path: (!options.no_cache).then(|| cache_path.to_string()),
        })
    }

    pub fn init(
        &self,
        path: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<InitResult, ManifestError> {
        let target = Utf8PathBuf::from(path.unwrap_or(DEFAULT_MANIFEST_FILE));
        if Store::exists(&target) {
            return Err(ManifestError::AlreadyExists(target.into_std_path_buf()));
        }

        sink.event(ProgressEvent {
            message: "phase=Store; writing starter manifest".to_string(),
        });
        let manifest = starter_manifest();
        let content = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&target, &content)?;

        Ok(InitResult {
            path: target.to_string(),
            collections: manifest.collections.len(),
            channels: manifest.additional_channels.len(),
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, ManifestError> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing project store".to_string(),
        });
        self.store.clear_project()?;
        Ok(ClearResult { cleared: true })
    }
}

fn count_collections(path: &camino::Utf8Path) -> usize {
    std::fs::read_to_string(path.as_std_path())
        .ok()
        .and_then(|content| ManifestLoader::parse(&content).ok())
        .map(|manifest| manifest.collections.len())
        .unwrap_or(0)
}

/// Template written by `init`: one documented collection and one channel.
pub fn starter_manifest() -> Manifest {
    Manifest {
        format_version: Some(1),
        collections: vec![CollectionEntry {
            name: Some("bioimage.io Documentation".to_string()),
            id: Some("bioimageio".to_string()),
            source: Some(
                "https://github.com/bioimage-io/bioimage.io/archive/refs/heads/main.zip"
                    .to_string(),
            ),
            directory: Some("bioimage.io-main/docs".to_string()),
            description: Some(
                "User guides and developer documentation for the bioimage.io model zoo"
                    .to_string(),
            ),
            base_url: Some("https://bioimage.io/docs/".to_string()),
            format: Some("markdown".to_string()),
        }],
        additional_channels: vec![ChannelEntry {
            name: Some("Community Partners".to_string()),
            id: Some("community-partners".to_string()),
            description: Some(
                "Announcements and updates from bioimage analysis community partners".to_string(),
            ),
        }],
    }
}
