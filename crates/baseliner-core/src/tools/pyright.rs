//! pyright integration (`--outputjson`, a single JSON document).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{AnalysisTool, Invocation, OutputChannel, ToolDiagnostic};
use crate::domain::{IdentityScheme, Severity};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PyrightReport {
    general_diagnostics: Vec<PyrightDiagnostic>,
}

#[derive(Debug, Deserialize)]
struct PyrightDiagnostic {
    file: String,
    severity: String,
    message: String,
    #[serde(default)]
    range: Option<PyrightRange>,
    #[serde(default)]
    rule: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PyrightRange {
    start: PyrightPosition,
}

/// Zero-based position.
#[derive(Debug, Deserialize)]
struct PyrightPosition {
    line: i64,
    character: i64,
}

pub struct Pyright {
    program: PathBuf,
    args: Vec<String>,
    identity: Option<IdentityScheme>,
}

impl Pyright {
    pub fn new(program: PathBuf, args: Vec<String>, identity: Option<IdentityScheme>) -> Self {
        Self {
            program,
            args,
            identity,
        }
    }
}

impl AnalysisTool for Pyright {
    fn id(&self) -> &str {
        "pyright"
    }

    fn invocation(&self, targets: &[PathBuf], _output_file: &Path) -> Invocation {
        let mut args = vec![OsString::from("--outputjson")];
        args.extend(self.args.iter().map(OsString::from));
        args.extend(targets.iter().map(|t| t.as_os_str().to_os_string()));
        Invocation {
            program: self.program.clone(),
            args,
            output: OutputChannel::Stdout,
        }
    }

    fn identity_scheme(&self) -> IdentityScheme {
        self.identity.unwrap_or_default()
    }

    fn parse(&self, raw: &str) -> std::result::Result<Vec<ToolDiagnostic>, String> {
        let report: PyrightReport = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        report
            .general_diagnostics
            .into_iter()
            .map(|d| {
                let severity = match d.severity.as_str() {
                    "error" => Severity::Error,
                    "warning" => Severity::Warning,
                    "information" => Severity::Note,
                    other => return Err(format!("unknown severity '{other}'")),
                };
                let (line, column) = d
                    .range
                    .map(|r| (r.start.line + 1, Some(r.start.character + 1)))
                    .unwrap_or((1, None));
                Ok(ToolDiagnostic {
                    path: d.file,
                    line,
                    column,
                    code: d.rule,
                    message: d.message,
                    severity,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> Pyright {
        Pyright::new(PathBuf::from("pyright"), Vec::new(), None)
    }

    #[test]
    fn test_parse_converts_zero_based_positions() {
        let raw = r#"{
            "version": "1.1.380",
            "generalDiagnostics": [
                {
                    "file": "/snap/pkg/a.py",
                    "severity": "error",
                    "message": "\"foo\" is not defined",
                    "range": {"start": {"line": 9, "character": 0}, "end": {"line": 9, "character": 3}},
                    "rule": "reportUndefinedVariable"
                },
                {
                    "file": "/snap/pkg/b.py",
                    "severity": "information",
                    "message": "Import cycle"
                }
            ],
            "summary": {"errorCount": 1, "warningCount": 0, "informationCount": 1}
        }"#;
        let diags = tool().parse(raw).unwrap();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].line, 10);
        assert_eq!(diags[0].column, Some(1));
        assert_eq!(diags[0].code.as_deref(), Some("reportUndefinedVariable"));
        assert_eq!(diags[1].severity, Severity::Note);
        assert_eq!(diags[1].line, 1);
    }

    #[test]
    fn test_parse_clean_report() {
        let raw = r#"{"generalDiagnostics": [], "summary": {"errorCount": 0}}"#;
        assert!(tool().parse(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_diagnostics_array() {
        assert!(tool().parse(r#"{"summary": {}}"#).is_err());
        assert!(tool().parse("No configuration file found.").is_err());
    }

    #[test]
    fn test_invocation_omits_targets_for_whole_tree() {
        let inv = tool().invocation(&[], Path::new("/tmp/o.json"));
        assert_eq!(inv.args, vec![OsString::from("--outputjson")]);
    }
}
