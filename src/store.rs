use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::manifest::DEFAULT_MANIFEST_FILE;

/// Project-local `.biokb` directory plus a shared per-user cache for fetched
/// manifests.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, ManifestError> {
        let cwd =
            std::env::current_dir().map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".biokb"))
            .map_err(|_| ManifestError::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("biokb-manifest"))
                    .ok()
            })
            .ok_or_else(|| {
                ManifestError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn project_manifest_path(&self) -> Utf8PathBuf {
        self.project_root.join("manifest").join(DEFAULT_MANIFEST_FILE)
    }

    pub fn cache_manifest_path(&self) -> Utf8PathBuf {
        self.cache_root.join("manifest").join(DEFAULT_MANIFEST_FILE)
    }

    pub fn project_snapshot_path(&self) -> Utf8PathBuf {
        self.project_root
            .join("manifest")
            .join("knowledge-base-manifest.meta.json")
    }

    pub fn cache_snapshot_path(&self) -> Utf8PathBuf {
        self.cache_root
            .join("manifest")
            .join("knowledge-base-manifest.meta.json")
    }

    pub fn ensure_project_root(&self) -> Result<(), ManifestError> {
        fs::create_dir_all(self.project_root.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), ManifestError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn clear_project(&self) -> Result<(), ManifestError> {
        if self.project_root.as_std_path().exists() {
            fs::remove_dir_all(self.project_root.as_std_path())
                .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ManifestError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("biokb-manifest")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), ManifestError> {
        let content = fs::read(source.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(dest, &content)
    }

    pub fn write_snapshot(path: &Utf8Path, snapshot: &Snapshot) -> Result<(), ManifestError> {
        let content = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_snapshot(path: &Utf8Path) -> Result<Option<Snapshot>, ManifestError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        let snapshot = serde_json::from_str(&content)
            .map_err(|err| ManifestError::Filesystem(err.to_string()))?;
        Ok(Some(snapshot))
    }
}

/// Provenance record stored next to a fetched manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: String,
    pub retrieved_at: String,
    pub tool: String,
    pub format_version: u32,
    pub resolved_path: String,
}

impl Snapshot {
    pub fn new(source: &str, format_version: u32, resolved_path: &str) -> Self {
        Self {
            source: source.to_string(),
            retrieved_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("biokb/{}", env!("CARGO_PKG_VERSION")),
            format_version,
            resolved_path: resolved_path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/tmp/project/.biokb"),
            Utf8PathBuf::from("/tmp/cache/biokb-manifest"),
        );

        assert!(store
            .project_manifest_path()
            .ends_with("manifest/knowledge-base-manifest.json"));
        assert!(store
            .cache_snapshot_path()
            .ends_with("manifest/knowledge-base-manifest.meta.json"));
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path =
            Utf8PathBuf::from_path_buf(temp.path().join("manifest").join("m.json")).unwrap();

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
    }

    #[test]
    fn snapshot_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("m.meta.json")).unwrap();

        let snapshot = Snapshot::new("https://example.org/manifest.json", 1, "/tmp/m.json");
        Store::write_snapshot(&path, &snapshot).unwrap();
        let loaded = Store::read_snapshot(&path).unwrap().unwrap();

        assert_eq!(loaded.source, "https://example.org/manifest.json");
        assert_eq!(loaded.format_version, 1);
    }
}
