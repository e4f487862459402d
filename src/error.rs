use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("invalid collection id: {0}")]
    InvalidCollectionId(String),

    #[error("invalid source format: {0} (expected markdown|json|pdf)")]
    InvalidSourceFormat(String),

    #[error("invalid manifest source: {0}")]
    InvalidManifestSource(String),

    #[error("invalid {field} URL: {value}")]
    InvalidUrl { field: String, value: String },

    #[error("duplicate id in manifest: {0}")]
    DuplicateId(String),

    #[error("collection entry {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("invalid directory for collection {id}: {directory}")]
    InvalidDirectory { id: String, directory: String },

    #[error("unsupported manifest format_version: {0}")]
    UnsupportedFormatVersion(u32),

    #[error("missing manifest file knowledge-base-manifest.json in current directory")]
    MissingManifest,

    #[error("failed to read manifest at {0}")]
    ManifestRead(PathBuf),

    #[error("failed to parse manifest JSON: {0}")]
    ManifestParse(String),

    #[error("manifest validation failed with {errors} error(s)")]
    ValidationFailed { errors: usize },

    #[error("collection not found in manifest: {0}")]
    CollectionNotFound(String),

    #[error("cannot resolve link {link} against base URL {base}")]
    LinkResolve { base: String, link: String },

    #[error("source check failed: {failures} URL(s) unreachable")]
    CheckFailed { failures: usize },

    #[error("manifest request failed: {0}")]
    Http(String),

    #[error("manifest server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("manifest already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
