//! Canonical diagnostic types shared by every analysis tool.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code recorded when a tool does not report a rule identifier.
pub const UNKNOWN_CODE: &str = "unknown";

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapse every whitespace run (newlines included) to a single space and trim.
pub fn normalize_message(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single reported issue.
///
/// Field order drives the derived ordering: `(file, line, code)` first, so
/// sorted diagnostic lists come out in report order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Diagnostic {
    /// Repository-relative, forward-slash path.
    pub file: String,

    /// Line number (1-indexed).
    pub line: u32,

    /// Stable rule/category identifier.
    pub code: String,

    /// Whitespace-normalized message.
    pub message: String,

    /// Column number (1-indexed).
    pub column: u32,

    pub severity: Severity,
}

impl Diagnostic {
    /// Create a diagnostic at column 1, normalizing the message and code.
    pub fn new(
        file: impl Into<String>,
        line: u32,
        code: impl Into<String>,
        message: &str,
        severity: Severity,
    ) -> Self {
        let code = code.into();
        let code = if code.trim().is_empty() {
            UNKNOWN_CODE.to_string()
        } else {
            code.trim().to_string()
        };
        Self {
            file: file.into(),
            line: line.max(1),
            code,
            message: normalize_message(message),
            column: 1,
            severity,
        }
    }

    /// Set the column (clamped to 1-based).
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = column.max(1);
        self
    }

    /// Identity key under the given scheme.
    pub fn identity_key(&self, scheme: IdentityScheme) -> IdentityKey {
        let message = normalize_message(&self.message);
        let (primary, tiebreak) = match scheme {
            IdentityScheme::FileLineCode | IdentityScheme::FileLineCodeMessage => {
                (self.code.clone(), message)
            }
            IdentityScheme::FileLineMessage => (message, self.code.clone()),
        };
        IdentityKey {
            file: self.file.clone(),
            line: self.line,
            primary,
            tiebreak,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}] {}",
            self.file, self.line, self.column, self.severity, self.code, self.message
        )
    }
}

/// Which fields identify a diagnostic across two runs.
///
/// Column is never part of identity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IdentityScheme {
    /// Match on `(file, line, code)`; message breaks ties when codes collide.
    #[default]
    FileLineCode,
    /// Match on `(file, line, message)`; code breaks ties.
    FileLineMessage,
    /// Match on `(file, line, code, message)` exactly. For tools whose
    /// subject (a module name, say) lives only in the message.
    FileLineCodeMessage,
}

impl IdentityScheme {
    /// Whether leftover diagnostics sharing an anchor pair off as reworded.
    pub fn pairs_rewordings(&self) -> bool {
        !matches!(self, IdentityScheme::FileLineCodeMessage)
    }
}

/// Identity key of a diagnostic.
///
/// `(file, line, primary)` anchors a match; `tiebreak` only separates
/// diagnostics sharing an anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey {
    pub file: String,
    pub line: u32,
    pub primary: String,
    pub tiebreak: String,
}

impl IdentityKey {
    /// The anchor portion of the key.
    pub fn anchor(&self) -> (&str, u32, &str) {
        (&self.file, self.line, &self.primary)
    }
}

/// Immutable, deduplicated, sorted collection of diagnostics for one
/// (tool, package, commit) triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticSet {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn new(diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        let mut diagnostics: Vec<Diagnostic> = diagnostics.into_iter().collect();
        diagnostics.sort();
        diagnostics.dedup();
        Self { diagnostics }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Distinct files carrying at least one diagnostic, sorted.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.diagnostics.iter().map(|d| d.file.as_str()).collect();
        files.dedup();
        files
    }
}

impl FromIterator<Diagnostic> for DiagnosticSet {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a DiagnosticSet {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serde() {
        for sev in &[Severity::Note, Severity::Warning, Severity::Error] {
            let json = serde_json::to_string(sev).expect("serialize");
            assert_eq!(json, format!("\"{}\"", sev.as_str()));
            let deserialized: Severity = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(*sev, deserialized);
        }
    }

    #[test]
    fn test_new_defaults_and_normalization() {
        let diag = Diagnostic::new("a.py", 0, "  ", "  line one\n   line two  ", Severity::Error);
        assert_eq!(diag.code, UNKNOWN_CODE);
        assert_eq!(diag.line, 1);
        assert_eq!(diag.column, 1);
        assert_eq!(diag.message, "line one line two");
    }

    #[test]
    fn test_identity_ignores_column_and_whitespace() {
        let a = Diagnostic::new("a.py", 10, "E001", "bad thing", Severity::Error).with_column(4);
        let mut b = Diagnostic::new("a.py", 10, "E001", "bad\n thing ", Severity::Error)
            .with_column(17);
        b.message = "bad   thing".to_string();
        for scheme in [
            IdentityScheme::FileLineCode,
            IdentityScheme::FileLineMessage,
            IdentityScheme::FileLineCodeMessage,
        ] {
            assert_eq!(a.identity_key(scheme), b.identity_key(scheme));
        }
    }

    #[test]
    fn test_identity_scheme_selects_primary() {
        let diag = Diagnostic::new("a.py", 3, "arg-type", "wrong type", Severity::Error);
        assert_eq!(diag.identity_key(IdentityScheme::FileLineCode).primary, "arg-type");
        assert_eq!(
            diag.identity_key(IdentityScheme::FileLineMessage).primary,
            "wrong type"
        );
    }

    #[test]
    fn test_exact_scheme_keeps_message_in_key() {
        let diag =
            Diagnostic::new("pyproject.toml", 1, "DEP002", "'toolz' unused", Severity::Error);
        let key = diag.identity_key(IdentityScheme::FileLineCodeMessage);
        assert_eq!(key.primary, "DEP002");
        assert_eq!(key.tiebreak, "'toolz' unused");
        assert!(!IdentityScheme::FileLineCodeMessage.pairs_rewordings());
        assert!(IdentityScheme::FileLineCode.pairs_rewordings());
    }

    #[test]
    fn test_set_sorts_and_dedups() {
        let d1 = Diagnostic::new("b.py", 5, "E002", "two", Severity::Error);
        let d2 = Diagnostic::new("a.py", 10, "E001", "one", Severity::Error);
        let set = DiagnosticSet::new(vec![d1.clone(), d2.clone(), d1.clone()]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice(), &[d2, d1]);
        assert_eq!(set.files(), vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_display_format() {
        let diag =
            Diagnostic::new("src/a.py", 10, "E001", "oops", Severity::Warning).with_column(2);
        assert_eq!(diag.to_string(), "src/a.py:10:2: warning [E001] oops");
    }
}
