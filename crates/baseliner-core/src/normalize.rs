//! Raw tool output → canonical [`DiagnosticSet`].
//!
//! Tool-specific parsing lives behind [`AnalysisTool::parse`]; this module
//! applies the shared rules: repository-relative forward-slash paths,
//! whitespace-collapsed messages, `unknown` for missing codes, 1-based
//! positions.

use std::path::{Component, Path, PathBuf};

use crate::domain::{BaselineError, Diagnostic, DiagnosticSet, Result};
use crate::obs;
use crate::tool_runner::RawOutput;
use crate::tools::{AnalysisTool, ToolDiagnostic};

/// Parse and normalize one tool run.
///
/// A skipped run (no target files in the snapshot) yields an empty set.
pub fn normalize(raw: &RawOutput, tool: &dyn AnalysisTool) -> Result<DiagnosticSet> {
    if raw.skipped {
        return Ok(DiagnosticSet::empty());
    }

    let parsed = tool.parse(&raw.content).map_err(|reason| {
        let err = BaselineError::Normalization {
            tool: tool.id().to_string(),
            reason,
        };
        obs::emit_normalization_failed(tool.id(), &err);
        err
    })?;

    let canonical_root = raw.snapshot.canonicalize().ok();
    Ok(parsed
        .into_iter()
        .map(|d| to_diagnostic(d, &raw.snapshot, canonical_root.as_deref(), &raw.working_dir))
        .collect())
}

fn to_diagnostic(
    d: ToolDiagnostic,
    snapshot: &Path,
    canonical_snapshot: Option<&Path>,
    working_dir: &Path,
) -> Diagnostic {
    let file = repo_relative_path(&d.path, snapshot, canonical_snapshot, working_dir);
    let line = clamp_position(d.line);
    let diag = Diagnostic::new(
        file,
        line,
        d.code.unwrap_or_default(),
        &d.message,
        d.severity,
    );
    match d.column {
        Some(column) => diag.with_column(clamp_position(column)),
        None => diag,
    }
}

fn clamp_position(value: i64) -> u32 {
    value.clamp(1, i64::from(u32::MAX)) as u32
}

/// Express a tool-reported path relative to the repository root with
/// forward slashes, independent of where the snapshot lives on disk.
///
/// Absolute paths under the snapshot are stripped of it; relative paths are
/// resolved against the tool's working directory. Absolute paths elsewhere
/// (installed packages, for instance) are kept as-is.
pub fn repo_relative_path(
    raw: &str,
    snapshot: &Path,
    canonical_snapshot: Option<&Path>,
    working_dir: &Path,
) -> String {
    let unified = raw.replace('\\', "/");
    let path = Path::new(&unified);

    let relative: PathBuf = if path.is_absolute() {
        let stripped = path
            .strip_prefix(snapshot)
            .ok()
            .or_else(|| canonical_snapshot.and_then(|root| path.strip_prefix(root).ok()));
        match stripped {
            Some(rel) => rel.to_path_buf(),
            None => return unified,
        }
    } else {
        working_dir.join(path)
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}
