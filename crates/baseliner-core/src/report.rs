//! Rendering of comparison results and the fail/advise policy.
//!
//! Three audiences: a terminal, a machine-readable JSON summary, and the
//! GitHub workflow-command annotation feed used for inline review comments.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ComparisonResult, Diagnostic, IdentityScheme, Result, Severity};

/// No new diagnostics (or local mode).
pub const EXIT_OK: i32 = 0;
/// New diagnostics in pipeline mode, operational error, or incomplete run.
pub const EXIT_FAILURE: i32 = 1;
/// Invalid invocation.
pub const EXIT_INVALID: i32 = 2;

/// Caller policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Fail-closed automated check.
    Pipeline,
    /// Advisory developer run.
    Local,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Pipeline => "pipeline",
            Mode::Local => "local",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pipeline" => Ok(Mode::Pipeline),
            "local" => Ok(Mode::Local),
            other => Err(format!("unknown mode '{other}' (expected pipeline or local)")),
        }
    }
}

/// Where a comparison's base set came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BaseOrigin {
    /// Loaded from the baseline store.
    Stored,
    /// No stored baseline: first adoption, base treated as empty.
    FirstAdoption,
    /// Computed from a fresh checkout of the reference commit.
    Recomputed { commit: String },
    /// Base analysis failed; base treated as empty.
    Degraded { reason: String },
}

impl BaseOrigin {
    fn describe(&self) -> String {
        match self {
            BaseOrigin::Stored => "stored baseline".to_string(),
            BaseOrigin::FirstAdoption => "no baseline".to_string(),
            BaseOrigin::Recomputed { commit } => {
                format!("recomputed at {}", &commit[..commit.len().min(12)])
            }
            BaseOrigin::Degraded { .. } => "unavailable".to_string(),
        }
    }
}

/// One tool's comparison for one package.
#[derive(Debug, Clone)]
pub struct ToolComparison {
    pub package: String,
    pub tool: String,
    pub scheme: IdentityScheme,
    pub base_ref: String,
    pub head_ref: String,
    pub base: BaseOrigin,
    pub result: ComparisonResult,
}

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Advisory,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub new: usize,
    pub fixed: usize,
    pub unchanged: usize,
}

/// One diagnostic in the machine summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub fingerprint: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub package: String,
    pub tool: String,
    pub base_ref: String,
    pub head_ref: String,
    pub base: BaseOrigin,
    pub totals: Totals,
    pub new: Vec<SummaryEntry>,
    pub fixed: Vec<SummaryEntry>,
}

/// Machine-readable summary. `totals` is `null` for an incomplete run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub mode: Mode,
    pub status: Status,
    pub totals: Option<Totals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub comparisons: Vec<ComparisonSummary>,
}

impl Summary {
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        Ok(body)
    }
}

/// Everything the caller needs to finish the process.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub exit_code: i32,
    pub output: String,
    pub summary: Summary,
}

/// Render comparisons and apply the mode's exit policy.
pub fn report(comparisons: &[ToolComparison], mode: Mode) -> Rendered {
    let summary = build_summary(comparisons, mode);
    let exit_code = match summary.status {
        Status::Fail | Status::Incomplete => EXIT_FAILURE,
        Status::Pass | Status::Advisory => EXIT_OK,
    };

    let mut output = String::new();
    if mode == Mode::Pipeline {
        for line in render_annotations(comparisons) {
            output.push_str(&line);
            output.push('\n');
        }
    }
    output.push_str(&render_text(comparisons, &summary));

    Rendered {
        exit_code,
        output,
        summary,
    }
}

/// Report a comparison that did not finish. Never reads as "zero new".
pub fn report_incomplete(mode: Mode, reason: &str) -> Rendered {
    let summary = Summary {
        mode,
        status: Status::Incomplete,
        totals: None,
        reason: Some(reason.to_string()),
        comparisons: Vec::new(),
    };
    Rendered {
        exit_code: EXIT_FAILURE,
        output: format!(
            "INCOMPLETE: comparison did not finish ({reason}); no result is available\n"
        ),
        summary,
    }
}

pub fn build_summary(comparisons: &[ToolComparison], mode: Mode) -> Summary {
    let mut totals = Totals {
        new: 0,
        fixed: 0,
        unchanged: 0,
    };
    let entries: Vec<ComparisonSummary> = comparisons
        .iter()
        .map(|c| {
            let entries = |list: &[Diagnostic]| -> Vec<SummaryEntry> {
                list.iter()
                    .zip(fingerprints(&c.tool, list, c.scheme))
                    .map(|(d, fingerprint)| SummaryEntry {
                        fingerprint,
                        file: d.file.clone(),
                        line: d.line,
                        column: d.column,
                        code: d.code.clone(),
                        severity: d.severity,
                        message: d.message.clone(),
                    })
                    .collect()
            };
            let tool_totals = Totals {
                new: c.result.new_diagnostics.len(),
                fixed: c.result.fixed_diagnostics.len(),
                unchanged: c.result.unchanged_count,
            };
            totals.new += tool_totals.new;
            totals.fixed += tool_totals.fixed;
            totals.unchanged += tool_totals.unchanged;
            ComparisonSummary {
                package: c.package.clone(),
                tool: c.tool.clone(),
                base_ref: c.base_ref.clone(),
                head_ref: c.head_ref.clone(),
                base: c.base.clone(),
                totals: tool_totals,
                new: entries(&c.result.new_diagnostics),
                fixed: entries(&c.result.fixed_diagnostics),
            }
        })
        .collect();

    let status = match (totals.new, mode) {
        (0, _) => Status::Pass,
        (_, Mode::Pipeline) => Status::Fail,
        (_, Mode::Local) => Status::Advisory,
    };

    Summary {
        mode,
        status,
        totals: Some(totals),
        reason: None,
        comparisons: entries,
    }
}

/// Stable 16-hex fingerprint of a diagnostic's identity anchor.
///
/// Column and message wording do not participate, so the fingerprint
/// survives the same edits the comparator tolerates. `occurrence` numbers
/// diagnostics that share an anchor within one list.
pub fn fingerprint(
    tool: &str,
    diagnostic: &Diagnostic,
    scheme: IdentityScheme,
    occurrence: usize,
) -> String {
    let key = diagnostic.identity_key(scheme);
    let (file, line, primary) = key.anchor();
    let mut hasher = Sha256::new();
    hasher.update(format!("{tool}:{file}:{line}:{primary}:{occurrence}").as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Fingerprints for a sorted diagnostic list, one per entry and all distinct.
pub fn fingerprints(
    tool: &str,
    diagnostics: &[Diagnostic],
    scheme: IdentityScheme,
) -> Vec<String> {
    let mut seen: HashMap<(String, u32, String), usize> = HashMap::new();
    diagnostics
        .iter()
        .map(|d| {
            let key = d.identity_key(scheme);
            let occurrence = seen.entry((key.file, key.line, key.primary)).or_insert(0);
            let fp = fingerprint(tool, d, scheme, *occurrence);
            *occurrence += 1;
            fp
        })
        .collect()
}

/// GitHub workflow commands, one per new diagnostic.
pub fn render_annotations(comparisons: &[ToolComparison]) -> Vec<String> {
    comparisons
        .iter()
        .flat_map(|c| {
            c.result.new_diagnostics.iter().map(move |d| {
                let level = match d.severity {
                    Severity::Note => "notice",
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                };
                format!(
                    "::{level} file={file},line={line},col={col},title={title}::{message}",
                    file = escape_property(&d.file),
                    line = d.line,
                    col = d.column,
                    title = escape_property(&format!("{} [{}]", c.tool, d.code)),
                    message = escape_data(&d.message),
                )
            })
        })
        .collect()
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// Plain-text rendering for terminals and pipeline log fallbacks.
pub fn render_text(comparisons: &[ToolComparison], summary: &Summary) -> String {
    let mut out = String::new();

    for c in comparisons {
        let r = &c.result;
        out.push_str(&format!(
            "{tool} on {package}: {new} new, {fixed} fixed, {unchanged} unchanged (base {base_ref}: {origin}; head {head_ref})\n",
            tool = c.tool,
            package = c.package,
            new = r.new_diagnostics.len(),
            fixed = r.fixed_diagnostics.len(),
            unchanged = r.unchanged_count,
            base_ref = c.base_ref,
            origin = c.base.describe(),
            head_ref = c.head_ref,
        ));
        match &c.base {
            BaseOrigin::FirstAdoption => out.push_str(&format!(
                "  note: no baseline recorded for {}; first adoption run, every head diagnostic is reported as new\n",
                c.base_ref
            )),
            BaseOrigin::Degraded { reason } => out.push_str(&format!(
                "  warning: base {} could not be analyzed ({reason}); base treated as empty\n",
                c.base_ref
            )),
            BaseOrigin::Stored | BaseOrigin::Recomputed { .. } => {}
        }
        if !r.new_diagnostics.is_empty() {
            out.push_str("  new:\n");
            for d in &r.new_diagnostics {
                out.push_str(&format!("    + {d}\n"));
            }
        }
        if !r.fixed_diagnostics.is_empty() {
            out.push_str("  fixed:\n");
            for d in &r.fixed_diagnostics {
                out.push_str(&format!("    - {d}\n"));
            }
        }
    }

    let (new, fixed) = summary
        .totals
        .as_ref()
        .map(|t| (t.new, t.fixed))
        .unwrap_or_default();
    let verdict = match summary.status {
        Status::Pass => "ok: no new diagnostics".to_string(),
        Status::Fail => format!("FAILED: {new} new diagnostic(s)"),
        Status::Advisory => format!("advisory: {new} new diagnostic(s); local mode does not fail"),
        Status::Incomplete => "INCOMPLETE".to_string(),
    };
    out.push_str(&verdict);
    if fixed > 0 {
        out.push_str(&format!(", {fixed} fixed, nice work"));
    } else {
        out.push_str(", 0 fixed");
    }
    out.push('\n');
    out
}
