//! deptry integration (dependency-usage issues written with `--json-output`).
//!
//! deptry analyzes the whole project against its dependency declarations,
//! so it cannot be scoped to individual files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{AnalysisTool, Invocation, OutputChannel, ToolDiagnostic};
use crate::domain::{IdentityScheme, Severity};

#[derive(Debug, Deserialize)]
struct DeptryIssue {
    error: DeptryError,
    #[serde(default)]
    module: Option<String>,
    location: DeptryLocation,
}

#[derive(Debug, Deserialize)]
struct DeptryError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeptryLocation {
    file: String,
    #[serde(default)]
    line: Option<i64>,
    #[serde(default)]
    column: Option<i64>,
}

pub struct Deptry {
    program: PathBuf,
    args: Vec<String>,
    identity: Option<IdentityScheme>,
}

impl Deptry {
    pub fn new(program: PathBuf, args: Vec<String>, identity: Option<IdentityScheme>) -> Self {
        Self {
            program,
            args,
            identity,
        }
    }
}

impl AnalysisTool for Deptry {
    fn id(&self) -> &str {
        "deptry"
    }

    fn invocation(&self, _targets: &[PathBuf], output_file: &Path) -> Invocation {
        let mut args = vec![
            OsString::from("."),
            OsString::from("--json-output"),
            output_file.as_os_str().to_os_string(),
        ];
        args.extend(self.args.iter().map(OsString::from));
        Invocation {
            program: self.program.clone(),
            args,
            output: OutputChannel::File,
        }
    }

    fn supports_file_targets(&self) -> bool {
        false
    }

    fn identity_scheme(&self) -> IdentityScheme {
        // Every unanchored issue lands on line 1 of the manifest, so the
        // module in the message has to take part in matching.
        self.identity
            .unwrap_or(IdentityScheme::FileLineCodeMessage)
    }

    fn parse(&self, raw: &str) -> std::result::Result<Vec<ToolDiagnostic>, String> {
        let issues: Vec<DeptryIssue> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Ok(issues
            .into_iter()
            .map(|issue| {
                // The module name is part of the message, which keeps two
                // issues on the same pyproject line apart.
                let message = match issue.module {
                    Some(module) if !issue.error.message.contains(&module) => {
                        format!("{} ({module})", issue.error.message)
                    }
                    _ => issue.error.message,
                };
                ToolDiagnostic {
                    path: issue.location.file,
                    line: issue.location.line.unwrap_or(1),
                    column: issue.location.column,
                    code: Some(issue.error.code),
                    message,
                    severity: Severity::Error,
                }
            })
            .collect())
    }
}
