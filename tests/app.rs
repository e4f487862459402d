use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use url::Url;

use biokb_manifest::app::{App, FetchOptions, ProgressSink};
use biokb_manifest::domain::SourceFormat;
use biokb_manifest::error::ManifestError;
use biokb_manifest::fetch::{ManifestClient, ProbeInfo};
use biokb_manifest::store::Store;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: biokb_manifest::app::ProgressEvent) {}
}

#[derive(Default)]
struct CaptureSink {
    events: Mutex<Vec<String>>,
}

impl CaptureSink {
    fn messages(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for CaptureSink {
    fn event(&self, event: biokb_manifest::app::ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }
}

const MANIFEST: &str = r#"{
    "format_version": 1,
    "collections": [
        {
            "name": "bioimage.io Documentation",
            "id": "bioimageio",
            "source": "https://github.com/bioimage-io/bioimage.io/archive/refs/heads/main.zip",
            "directory": "bioimage.io-main/docs",
            "description": "User guides and developer documentation",
            "base_url": "https://bioimage.io/docs/",
            "format": "markdown"
        },
        {
            "name": "bio.tools Registry",
            "id": "biotools",
            "source": "https://example.org/dumps/biotools.json",
            "description": "Tool registry dump",
            "base_url": "https://bio.tools/",
            "format": "json"
        }
    ],
    "additional_channels": [
        {
            "name": "Community Partners",
            "id": "community-partners",
            "description": "Partner announcements"
        }
    ]
}"#;

struct MockClient {
    fetches: Arc<Mutex<usize>>,
    probe_failures: Vec<String>,
}

impl MockClient {
    fn new() -> Self {
        Self {
            fetches: Arc::new(Mutex::new(0)),
            probe_failures: Vec::new(),
        }
    }

    fn failing_on(url: &str) -> Self {
        Self {
            fetches: Arc::new(Mutex::new(0)),
            probe_failures: vec![url.to_string()],
        }
    }

    fn fetch_counter(&self) -> Arc<Mutex<usize>> {
        self.fetches.clone()
    }
}

impl ManifestClient for MockClient {
    fn fetch_manifest(&self, _url: &Url, destination: &Path) -> Result<Vec<u8>, ManifestError> {
        let mut guard = self.fetches.lock().unwrap();
        *guard += 1;
        std::fs::write(destination, MANIFEST.as_bytes())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Ok(MANIFEST.as_bytes().to_vec())
    }

    fn probe(&self, url: &Url) -> Result<ProbeInfo, ManifestError> {
        let failed = self.probe_failures.iter().any(|bad| bad == url.as_str());
        Ok(ProbeInfo {
            url: url.to_string(),
            status: if failed { 404 } else { 200 },
            ok: !failed,
            content_length: (!failed).then_some(1024),
        })
    }
}

fn sandbox(temp: &tempfile::TempDir, client: MockClient) -> App<MockClient> {
    let project = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
    let cache = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    App::new(Store::new_with_paths(project, cache), client)
}

fn manifest_file(temp: &tempfile::TempDir) -> String {
    let path = temp.path().join("knowledge-base-manifest.json");
    std::fs::write(&path, MANIFEST).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn validate_reports_clean_catalog() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let path = manifest_file(&temp);

    let result = app.validate(Some(&path), &NoopSink).unwrap();
    assert_eq!(result.errors, 0);
    assert_eq!(result.collections, 2);
    assert_eq!(result.channels, 1);
}

#[test]
fn list_filters_by_format() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let path = manifest_file(&temp);

    let all = app.list(Some(&path), None, &NoopSink).unwrap();
    assert_eq!(all.collections.len(), 2);
    assert_eq!(all.channels.len(), 1);

    let json_only = app
        .list(Some(&path), Some(SourceFormat::Json), &NoopSink)
        .unwrap();
    assert_eq!(json_only.collections.len(), 1);
    assert_eq!(json_only.collections[0].id, "biotools");
}

#[test]
fn info_covers_collections_and_channels() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let path = manifest_file(&temp);

    let collection = app.info(Some(&path), "bioimageio", &NoopSink).unwrap();
    assert_eq!(collection.entry_type, "collection");
    assert_eq!(collection.format.as_deref(), Some("markdown"));
    assert_eq!(
        collection.directory.as_deref(),
        Some("bioimage.io-main/docs")
    );

    let channel = app
        .info(Some(&path), "community-partners", &NoopSink)
        .unwrap();
    assert_eq!(channel.entry_type, "channel");
    assert_eq!(channel.source, None);

    let err = app.info(Some(&path), "nonexistent", &NoopSink).unwrap_err();
    assert_matches!(err, ManifestError::CollectionNotFound(_));
}

#[test]
fn resolve_link_uses_collection_base_url() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let path = manifest_file(&temp);

    let result = app
        .resolve_link(Some(&path), "bioimageio", "guides/user-guide.md", &NoopSink)
        .unwrap();
    assert_eq!(
        result.resolved,
        "https://bioimage.io/docs/guides/user-guide.md"
    );
}

#[test]
fn check_reports_unreachable_sources_without_aborting() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(
        &temp,
        MockClient::failing_on("https://example.org/dumps/biotools.json"),
    );
    let path = manifest_file(&temp);

    let result = app.check(Some(&path), &NoopSink).unwrap();
    // two sources plus two distinct base URLs
    assert_eq!(result.probes.len(), 4);
    assert_eq!(result.failures, 1);

    let failed = result.probes.iter().find(|probe| !probe.ok).unwrap();
    assert_eq!(failed.id, "biotools");
    assert_eq!(failed.status, Some(404));
}

#[test]
fn check_emits_request_and_latency_events() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let path = manifest_file(&temp);
    let sink = CaptureSink::default();

    app.check(Some(&path), &sink).unwrap();

    let messages = sink.messages();
    assert!(messages.iter().any(|m| m.starts_with("phase=Resolve")));
    let requests = messages
        .iter()
        .filter(|m| m.starts_with("manifest.request"))
        .count();
    let responses = messages
        .iter()
        .filter(|m| m.contains("latency_ms="))
        .count();
    assert_eq!(requests, 4);
    assert_eq!(responses, 4);
}

#[test]
fn fetch_then_refetch_uses_project_copy() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockClient::new();
    let fetches = client.fetch_counter();
    let app = sandbox(&temp, client);
    let url = Url::parse("https://example.org/kb/manifest.json").unwrap();
    let options = FetchOptions {
        force: false,
        no_cache: false,
    };

    let first = app.fetch(&url, options.clone(), &NoopSink).unwrap();
    assert_eq!(first.action, "download");
    assert_eq!(first.collections, 2);
    assert!(first.cache_path.is_some());

    let second = app.fetch(&url, options, &NoopSink).unwrap();
    assert_eq!(second.action, "project");
    assert_eq!(*fetches.lock().unwrap(), 1);
}

#[test]
fn fetch_force_redownloads_and_no_cache_skips_cache() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockClient::new();
    let fetches = client.fetch_counter();
    let app = sandbox(&temp, client);
    let url = Url::parse("https://example.org/kb/manifest.json").unwrap();

    let first = app
        .fetch(
            &url,
            FetchOptions {
                force: false,
                no_cache: true,
            },
            &NoopSink,
        )
        .unwrap();
    assert_eq!(first.action, "download");
    assert_eq!(first.cache_path, None);

    let second = app
        .fetch(
            &url,
            FetchOptions {
                force: true,
                no_cache: true,
            },
            &NoopSink,
        )
        .unwrap();
    assert_eq!(second.action, "download");
    assert_eq!(*fetches.lock().unwrap(), 2);
}

#[test]
fn init_writes_starter_manifest_once() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let target = temp.path().join("knowledge-base-manifest.json");
    let target = target.to_str().unwrap();

    let result = app.init(Some(target), &NoopSink).unwrap();
    assert_eq!(result.collections, 1);
    assert_eq!(result.channels, 1);

    // The starter document must pass its own validation.
    let report = app.validate(Some(target), &NoopSink).unwrap();
    assert_eq!(report.errors, 0);

    let err = app.init(Some(target), &NoopSink).unwrap_err();
    assert_matches!(err, ManifestError::AlreadyExists(_));
}

#[test]
fn clear_removes_project_store() {
    let temp = tempfile::tempdir().unwrap();
    let app = sandbox(&temp, MockClient::new());
    let url = Url::parse("https://example.org/kb/manifest.json").unwrap();

    app.fetch(
        &url,
        FetchOptions {
            force: false,
            no_cache: false,
        },
        &NoopSink,
    )
    .unwrap();
    assert!(temp.path().join("project").exists());

    let result = app.clear(&NoopSink).unwrap();
    assert!(result.cleared);
    assert!(!temp.path().join("project").exists());
}
