//! Durable baseline artifacts keyed by (tool, package, reference).
//!
//! Artifact format: a pretty-printed JSON object mapping repository-relative
//! file path to an ordered list of `{line, code, message, severity}` records.
//! Keys are sorted and every record sits on its own lines, so a baseline
//! committed to version control diffs cleanly. `column` is written only when
//! it is not 1.
//!
//! Layout: `<root>/<tool>/<package>/<label>.json`

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::{BaselineError, Diagnostic, DiagnosticSet, Result, Severity};
use crate::obs;

/// Identifies one baseline artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaselineKey {
    /// Analysis tool identifier (e.g. "mypy").
    pub tool: String,

    /// Package identifier.
    pub package: String,

    /// Reference commit or explicit label.
    pub label: String,
}

impl BaselineKey {
    pub fn new(
        tool: impl Into<String>,
        package: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            package: package.into(),
            label: label.into(),
        }
    }

    /// Artifact path relative to the store root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(path_component(&self.tool))
            .join(path_component(&self.package))
            .join(format!("{}.json", path_component(&self.label)))
    }
}

impl std::fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.tool, self.package, self.label)
    }
}

/// Map an identifier onto a single safe path component.
///
/// Bytes outside `[A-Za-z0-9._-]` become `%XX`, and `%` is itself escaped,
/// so distinct identifiers never share a file.
fn path_component(raw: &str) -> String {
    match raw {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Outcome of loading a baseline.
///
/// Both variants mean "compare against this set" (an absent baseline acts as
/// empty), but they are kept apart so reports can flag first adoption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineLoad {
    /// No artifact exists for the key.
    Missing,
    /// An artifact exists (possibly with zero diagnostics).
    Present(DiagnosticSet),
}

impl BaselineLoad {
    pub fn is_missing(&self) -> bool {
        matches!(self, BaselineLoad::Missing)
    }

    /// The set to compare against; empty when missing.
    pub fn into_set(self) -> DiagnosticSet {
        match self {
            BaselineLoad::Missing => DiagnosticSet::empty(),
            BaselineLoad::Present(set) => set,
        }
    }
}

/// Baseline persistence interface.
///
/// `save` is single-writer per key; callers serialize concurrent saves.
/// `load` is safe for concurrent readers.
pub trait BaselineStore: Send + Sync {
    /// Persist `set` under `key`, fully replacing any existing artifact.
    fn save(&self, set: &DiagnosticSet, key: &BaselineKey) -> Result<()>;

    /// Load the artifact for `key`.
    fn load(&self, key: &BaselineKey) -> Result<BaselineLoad>;

    /// Remove the artifact for `key`. Returns whether one existed.
    fn clear(&self, key: &BaselineKey) -> Result<bool>;
}

/// One persisted diagnostic under its file entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineRecord {
    pub line: u32,

    #[serde(default = "default_column", skip_serializing_if = "is_default_column")]
    pub column: u32,

    pub code: String,
    pub message: String,
    pub severity: Severity,
}

fn default_column() -> u32 {
    1
}

fn is_default_column(column: &u32) -> bool {
    *column == 1
}

/// The on-disk document: file path → ordered records.
pub type BaselineDocument = BTreeMap<String, Vec<BaselineRecord>>;

/// Convert a set into its artifact document.
pub fn to_document(set: &DiagnosticSet) -> BaselineDocument {
    let mut doc = BaselineDocument::new();
    for diag in set {
        doc.entry(diag.file.clone()).or_default().push(BaselineRecord {
            line: diag.line,
            column: diag.column,
            code: diag.code.clone(),
            message: diag.message.clone(),
            severity: diag.severity,
        });
    }
    doc
}

/// Rebuild a set from an artifact document.
pub fn from_document(doc: BaselineDocument) -> DiagnosticSet {
    doc.into_iter()
        .flat_map(|(file, records)| {
            records.into_iter().map(move |r| {
                Diagnostic::new(file.clone(), r.line, r.code, &r.message, r.severity)
                    .with_column(r.column)
            })
        })
        .collect()
}

/// Filesystem-backed baseline store.
pub struct FsBaselineStore {
    root: PathBuf,
}

impl FsBaselineStore {
    /// Create a store rooted at `root`. The directory is created lazily on save.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute artifact path for `key`.
    pub fn artifact_path(&self, key: &BaselineKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BaselineError + '_ {
    move |source| BaselineError::BaselineIo {
        path: path.to_path_buf(),
        source,
    }
}

impl BaselineStore for FsBaselineStore {
    fn save(&self, set: &DiagnosticSet, key: &BaselineKey) -> Result<()> {
        let path = self.artifact_path(key);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let mut body = serde_json::to_string_pretty(&to_document(set))?;
        body.push('\n');

        // Atomic write: temp file in the same directory, then rename over.
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
        tmp.write_all(body.as_bytes()).map_err(io_err(&path))?;
        tmp.as_file().sync_all().map_err(io_err(&path))?;
        tmp.persist(&path).map_err(|e| BaselineError::BaselineIo {
            path: path.clone(),
            source: e.error,
        })?;

        obs::emit_baseline_saved(&key.to_string(), &path, set.len());
        Ok(())
    }

    fn load(&self, key: &BaselineKey) -> Result<BaselineLoad> {
        let path = self.artifact_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                obs::emit_baseline_loaded(&key.to_string(), &path, None);
                return Ok(BaselineLoad::Missing);
            }
            Err(e) => return Err(io_err(&path)(e)),
        };

        let doc: BaselineDocument = serde_json::from_str(&text).map_err(|e| {
            BaselineError::BaselineIo {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
        })?;
        let set = from_document(doc);
        obs::emit_baseline_loaded(&key.to_string(), &path, Some(set.len()));
        Ok(BaselineLoad::Present(set))
    }

    fn clear(&self, key: &BaselineKey) -> Result<bool> {
        let path = self.artifact_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path)(e)),
        }
    }
}
