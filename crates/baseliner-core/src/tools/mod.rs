//! Analysis tool capability and its concrete integrations.
//!
//! Callers depend only on [`AnalysisTool`]: how to invoke the tool and how
//! to read its JSON. Adding a tool means adding one implementation here and
//! a match arm in [`resolve`]; the runner, comparator, and reporter are
//! untouched.

pub mod deptry;
pub mod mypy;
pub mod pyright;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{BaselineError, IdentityScheme, Result, Severity};

pub use deptry::Deptry;
pub use mypy::Mypy;
pub use pyright::Pyright;

/// Identifiers accepted by [`resolve`].
pub const KNOWN_TOOLS: &[&str] = &["mypy", "pyright", "deptry"];

/// Where a tool writes its JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    /// The file passed to [`AnalysisTool::invocation`].
    File,
}

/// A fully-built command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub output: OutputChannel,
}

/// One diagnostic as the tool reported it, before path normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDiagnostic {
    /// Path as emitted (absolute, or relative to the tool's working dir).
    pub path: String,
    /// 1-based line; values below 1 are clamped.
    pub line: i64,
    /// 1-based column.
    pub column: Option<i64>,
    pub code: Option<String>,
    pub message: String,
    pub severity: Severity,
}

/// Per-tool settings from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    /// Binary name or path. Defaults to the tool identifier.
    pub binary: Option<String>,

    /// Extra arguments inserted before the targets.
    pub args: Vec<String>,

    /// Identity scheme override.
    pub identity: Option<IdentityScheme>,
}

/// Polymorphic analysis tool capability.
pub trait AnalysisTool: Send + Sync {
    /// Stable identifier (used in baseline keys).
    fn id(&self) -> &str;

    /// Build the command line for `targets` (paths relative to the working
    /// directory; empty means the whole tree).
    fn invocation(&self, targets: &[PathBuf], output_file: &Path) -> Invocation;

    /// Whether the tool can be restricted to individual files.
    fn supports_file_targets(&self) -> bool {
        true
    }

    /// Exit codes meaning "ran to completion" (with or without findings).
    fn completion_exit_codes(&self) -> &[i32] {
        &[0, 1]
    }

    /// Whether an empty output stream on a zero exit is a well-formed
    /// "no issues" result.
    fn empty_output_is_clean(&self) -> bool {
        false
    }

    /// Identity scheme used when comparing this tool's diagnostics.
    fn identity_scheme(&self) -> IdentityScheme {
        IdentityScheme::FileLineCode
    }

    /// Parse raw output. Errors are human-readable reasons.
    fn parse(&self, raw: &str) -> std::result::Result<Vec<ToolDiagnostic>, String>;
}

/// Locate a tool's binary once and build its capability.
///
/// Fails fast with `ToolNotFound` rather than retrying per call.
pub fn resolve(id: &str, settings: &ToolSettings) -> Result<Box<dyn AnalysisTool>> {
    if !KNOWN_TOOLS.contains(&id) {
        return Err(BaselineError::Config(format!(
            "unknown tool '{id}' (known: {})",
            KNOWN_TOOLS.join(", ")
        )));
    }

    let binary = settings.binary.clone().unwrap_or_else(|| id.to_string());
    let program = which::which(&binary).map_err(|e| BaselineError::ToolNotFound {
        tool: id.to_string(),
        reason: format!("'{binary}': {e}"),
    })?;
    tracing::debug!(tool = %id, program = %program.display(), "resolved tool binary");

    Ok(build(id, program, settings))
}

/// Resolved tools keyed by identifier.
pub type ToolSet = BTreeMap<String, Arc<dyn AnalysisTool>>;

/// Resolve every tool in `ids` up front, stopping at the first failure.
pub fn resolve_all<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    settings: impl Fn(&str) -> ToolSettings,
) -> Result<ToolSet> {
    let mut set = ToolSet::new();
    for id in ids {
        if set.contains_key(id) {
            continue;
        }
        let tool = resolve(id, &settings(id))?;
        set.insert(id.to_string(), Arc::from(tool));
    }
    Ok(set)
}

/// Build a capability around an already-located program.
pub fn build(id: &str, program: PathBuf, settings: &ToolSettings) -> Box<dyn AnalysisTool> {
    let args = settings.args.clone();
    match id {
        "pyright" => Box::new(Pyright::new(program, args, settings.identity)),
        "deptry" => Box::new(Deptry::new(program, args, settings.identity)),
        _ => Box::new(Mypy::new(program, args, settings.identity)),
    }
}
