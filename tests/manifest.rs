use assert_matches::assert_matches;

use biokb_manifest::domain::SourceFormat;
use biokb_manifest::error::ManifestError;
use biokb_manifest::manifest::ManifestLoader;

const MANIFEST: &str = r#"{
    "format_version": 1,
    "collections": [
        {
            "name": "bioimage.io Documentation",
            "id": "bioimageio",
            "source": "https://github.com/bioimage-io/bioimage.io/archive/refs/heads/main.zip",
            "directory": "bioimage.io-main/docs",
            "description": "User guides and developer documentation for the bioimage.io model zoo",
            "base_url": "https://bioimage.io/docs/",
            "format": "markdown"
        },
        {
            "name": "ImJoy Documentation",
            "id": "imjoy",
            "source": "https://github.com/imjoy-team/ImJoy/archive/refs/heads/master.zip",
            "directory": "ImJoy-master/docs",
            "description": "Plugin development and usage documentation for ImJoy",
            "base_url": "https://imjoy.io/docs/",
            "format": "markdown"
        },
        {
            "name": "bio.tools Registry",
            "id": "biotools",
            "source": "https://example.org/dumps/biotools.json",
            "description": "Tool registry dump with software metadata",
            "base_url": "https://bio.tools/",
            "format": "json"
        },
        {
            "name": "ITK Software Guide",
            "id": "itk-guide",
            "source": "https://example.org/archives/InsightSoftwareGuide.pdf",
            "description": "The ITK software guide book",
            "base_url": "https://itk.org/",
            "format": "pdf"
        }
    ],
    "additional_channels": [
        {
            "name": "Community Partners",
            "id": "community-partners",
            "description": "Announcements from bioimage analysis community partners"
        }
    ]
}"#;

#[test]
fn loads_and_resolves_a_realistic_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("knowledge-base-manifest.json");
    std::fs::write(&path, MANIFEST).unwrap();

    let resolved = ManifestLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.format_version, 1);
    assert_eq!(resolved.collections.len(), 4);
    assert_eq!(resolved.channels.len(), 1);

    let biotools = resolved.collection("biotools").unwrap();
    assert_eq!(biotools.format, SourceFormat::Json);
    assert_eq!(biotools.directory, None);

    let bioimageio = resolved.collection("bioimageio").unwrap();
    assert_eq!(
        bioimageio.directory.as_deref(),
        Some("bioimage.io-main/docs")
    );

    assert!(resolved.channel("community-partners").is_some());
    assert!(resolved.collection("missing").is_none());
}

#[test]
fn resolve_link_handles_nested_and_rooted_links() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("manifest.json");
    std::fs::write(&path, MANIFEST).unwrap();

    let resolved = ManifestLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    let imjoy = resolved.collection("imjoy").unwrap();

    let nested = imjoy.resolve_link("api/index.md").unwrap();
    assert_eq!(nested.as_str(), "https://imjoy.io/docs/api/index.md");

    // A rooted link replaces the base path entirely.
    let rooted = imjoy.resolve_link("/plugins").unwrap();
    assert_eq!(rooted.as_str(), "https://imjoy.io/plugins");
}

#[test]
fn missing_default_manifest_is_a_distinct_error() {
    let temp = tempfile::tempdir().unwrap();
    let original = std::env::current_dir().unwrap();
    // The default lookup is cwd-relative; restore the cwd before any assertion
    // so a failure cannot leak the changed directory into other tests.
    std::env::set_current_dir(temp.path()).unwrap();
    let result = ManifestLoader::load(None);
    std::env::set_current_dir(original).unwrap();

    assert_matches!(result, Err(ManifestError::MissingManifest));
}

#[test]
fn unreadable_explicit_path_reports_the_path() {
    let err = ManifestLoader::load(Some("/nonexistent/manifest.json")).unwrap_err();
    assert_matches!(err, ManifestError::ManifestRead(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = ManifestLoader::parse("{\"collections\": [").unwrap_err();
    assert_matches!(err, ManifestError::ManifestParse(_));
}
