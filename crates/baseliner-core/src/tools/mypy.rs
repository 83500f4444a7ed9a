//! mypy integration (`--output json`, one JSON object per line).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{AnalysisTool, Invocation, OutputChannel, ToolDiagnostic};
use crate::domain::{IdentityScheme, Severity};

/// One line of `mypy --output json`.
#[derive(Debug, Deserialize)]
struct MypyRecord {
    file: String,
    line: i64,
    #[serde(default)]
    column: Option<i64>,
    message: String,
    #[serde(default)]
    code: Option<String>,
    severity: String,
}

pub struct Mypy {
    program: PathBuf,
    args: Vec<String>,
    identity: Option<IdentityScheme>,
}

impl Mypy {
    pub fn new(program: PathBuf, args: Vec<String>, identity: Option<IdentityScheme>) -> Self {
        Self {
            program,
            args,
            identity,
        }
    }
}

impl AnalysisTool for Mypy {
    fn id(&self) -> &str {
        "mypy"
    }

    fn invocation(&self, targets: &[PathBuf], _output_file: &Path) -> Invocation {
        let mut args: Vec<OsString> = [
            "--output",
            "json",
            "--no-error-summary",
            "--hide-error-context",
            "--no-pretty",
            "--no-color-output",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.extend(self.args.iter().map(OsString::from));
        if targets.is_empty() {
            args.push(OsString::from("."));
        } else {
            args.extend(targets.iter().map(|t| t.as_os_str().to_os_string()));
        }
        Invocation {
            program: self.program.clone(),
            args,
            output: OutputChannel::Stdout,
        }
    }

    // mypy exits 2 on crashes and usage errors.
    fn completion_exit_codes(&self) -> &[i32] {
        &[0, 1]
    }

    // A clean run prints nothing once the summary is suppressed.
    fn empty_output_is_clean(&self) -> bool {
        true
    }

    fn identity_scheme(&self) -> IdentityScheme {
        self.identity.unwrap_or_default()
    }

    fn parse(&self, raw: &str) -> std::result::Result<Vec<ToolDiagnostic>, String> {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                let record: MypyRecord = serde_json::from_str(line)
                    .map_err(|e| format!("line {}: {e}", idx + 1))?;
                let severity = match record.severity.as_str() {
                    "error" => Severity::Error,
                    "warning" => Severity::Warning,
                    "note" => Severity::Note,
                    other => return Err(format!("line {}: unknown severity '{other}'", idx + 1)),
                };
                Ok(ToolDiagnostic {
                    path: record.file,
                    line: record.line,
                    // mypy reports 0-based columns; -1 when unknown.
                    column: record.column.filter(|c| *c >= 0).map(|c| c + 1),
                    code: record.code,
                    message: record.message,
                    severity,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> Mypy {
        Mypy::new(PathBuf::from("mypy"), vec!["--strict".to_string()], None)
    }

    #[test]
    fn test_invocation_whole_tree_and_targets() {
        let out = Path::new("/tmp/out.json");
        let whole = tool().invocation(&[], out);
        assert_eq!(whole.output, OutputChannel::Stdout);
        assert!(whole.args.contains(&OsString::from("--strict")));
        assert_eq!(whole.args.last(), Some(&OsString::from(".")));

        let scoped = tool().invocation(&[PathBuf::from("pkg/a.py")], out);
        assert_eq!(scoped.args.last(), Some(&OsString::from("pkg/a.py")));
        assert!(!scoped.args.contains(&OsString::from(".")));
    }

    #[test]
    fn test_parse_json_lines() {
        let raw = concat!(
            r#"{"file": "pkg/a.py", "line": 10, "column": 4, "message": "Incompatible types", "hint": null, "code": "assignment", "severity": "error"}"#,
            "\n\n",
            r#"{"file": "pkg/b.py", "line": -1, "column": -1, "message": "See docs", "hint": null, "code": null, "severity": "note"}"#,
            "\n"
        );
        let diags = tool().parse(raw).unwrap();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].path, "pkg/a.py");
        assert_eq!(diags[0].column, Some(5));
        assert_eq!(diags[0].code.as_deref(), Some("assignment"));
        assert_eq!(diags[1].severity, Severity::Note);
        assert_eq!(diags[1].column, None);
        assert!(diags[1].code.is_none());
    }

    #[test]
    fn test_parse_empty_is_empty() {
        assert!(tool().parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_text_output() {
        let err = tool().parse("pkg/a.py:1: error: oops  [misc]\n").unwrap_err();
        assert!(err.starts_with("line 1"));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = tool().parse(r#"{"file": "a.py", "message": "x"}"#).unwrap_err();
        assert!(err.contains("line 1"));
    }
}
