use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::domain::{CollectionId, SourceFormat};
use crate::manifest::{is_safe_directory, Manifest, SUPPORTED_FORMAT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: Severity,
    /// Entry the issue belongs to, e.g. `collections[3]` or the entry id.
    pub location: String,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub format_version: u32,
    pub collections: usize,
    pub channels: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .count()
    }

    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    fn error(&mut self, location: String, field: Option<&str>, message: String) {
        self.issues.push(Issue {
            severity: Severity::Error,
            location,
            field: field.map(str::to_string),
            message,
        });
    }

    fn warning(&mut self, location: String, field: Option<&str>, message: String) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            location,
            field: field.map(str::to_string),
            message,
        });
    }
}

/// Lints a raw manifest, collecting every violation instead of stopping at
/// the first. Warnings never fail validation.
pub fn validate(manifest: &Manifest) -> ValidationReport {
    let format_version = manifest.format_version.unwrap_or(1);
    let mut report = ValidationReport {
        format_version,
        collections: manifest.collections.len(),
        channels: manifest.additional_channels.len(),
        issues: Vec::new(),
    };

    if format_version != SUPPORTED_FORMAT_VERSION {
        report.error(
            "document".to_string(),
            Some("format_version"),
            format!("unsupported format_version {format_version}, expected {SUPPORTED_FORMAT_VERSION}"),
        );
    }

    let mut seen_ids = HashSet::new();
    let mut sources = HashMap::<String, String>::new();

    for (index, entry) in manifest.collections.iter().enumerate() {
        let location = entry
            .id
            .clone()
            .unwrap_or_else(|| format!("collections[{index}]"));

        check_id(&mut report, &location, entry.id.as_deref(), &mut seen_ids);
        check_text(&mut report, &location, "name", entry.name.as_deref());
        check_text(
            &mut report,
            &location,
            "description",
            entry.description.as_deref(),
        );

        if let Some(source) = check_url(&mut report, &location, "source", entry.source.as_deref()) {
            if let Some(other) = sources.insert(source.to_string(), location.clone()) {
                report.warning(
                    location.clone(),
                    Some("source"),
                    format!("source URL is shared with {other}"),
                );
            }
        }

        if let Some(base_url) =
            check_url(&mut report, &location, "base_url", entry.base_url.as_deref())
        {
            if !base_url.path().ends_with('/') {
                report.warning(
                    location.clone(),
                    Some("base_url"),
                    "base_url has no trailing slash; relative links will drop the last path segment"
                        .to_string(),
                );
            }
        }

        match entry.format.as_deref() {
            None => report.error(
                location.clone(),
                Some("format"),
                "missing required field".to_string(),
            ),
            Some(value) => {
                if SourceFormat::from_str(value).is_err() {
                    report.error(
                        location.clone(),
                        Some("format"),
                        format!("unknown format `{value}`, expected markdown|json|pdf"),
                    );
                }
            }
        }

        if let Some(directory) = entry.directory.as_deref() {
            if !is_safe_directory(directory) {
                report.error(
                    location.clone(),
                    Some("directory"),
                    format!("`{directory}` must be a relative subpath without `..`"),
                );
            }
        }
    }

    for (index, entry) in manifest.additional_channels.iter().enumerate() {
        let location = entry
            .id
            .clone()
            .unwrap_or_else(|| format!("additional_channels[{index}]"));

        check_id(&mut report, &location, entry.id.as_deref(), &mut seen_ids);
        check_text(&mut report, &location, "name", entry.name.as_deref());
        check_text(
            &mut report,
            &location,
            "description",
            entry.description.as_deref(),
        );
    }

    report
}

fn check_id(
    report: &mut ValidationReport,
    location: &str,
    id: Option<&str>,
    seen: &mut HashSet<String>,
) {
    let Some(id) = id else {
        report.error(
            location.to_string(),
            Some("id"),
            "missing required field".to_string(),
        );
        return;
    };

    if CollectionId::from_str(id).is_err() {
        report.error(
            location.to_string(),
            Some("id"),
            format!("`{id}` is not a valid identifier (lowercase alphanumeric plus . _ -)"),
        );
    }

    if !seen.insert(id.to_string()) {
        report.error(
            location.to_string(),
            Some("id"),
            format!("duplicate id `{id}`"),
        );
    }
}

fn check_text(report: &mut ValidationReport, location: &str, field: &str, value: Option<&str>) {
    match value {
        None => report.error(
            location.to_string(),
            Some(field),
            "missing required field".to_string(),
        ),
        Some(value) if value.trim().is_empty() => report.warning(
            location.to_string(),
            Some(field),
            "field is empty".to_string(),
        ),
        Some(_) => {}
    }
}

fn check_url(
    report: &mut ValidationReport,
    location: &str,
    field: &str,
    value: Option<&str>,
) -> Option<Url> {
    let Some(value) = value else {
        report.error(
            location.to_string(),
            Some(field),
            "missing required field".to_string(),
        );
        return None;
    };

    match Url::parse(value) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                report.warning(
                    location.to_string(),
                    Some(field),
                    format!("non-http(s) scheme `{}`", url.scheme()),
                );
            }
            Some(url)
        }
        Err(_) => {
            report.error(
                location.to_string(),
                Some(field),
                format!("`{value}` is not a well-formed URL"),
            );
            None
        }
    }
}
