//! Domain-level error taxonomy for Baseliner.

use std::path::PathBuf;
use std::time::Duration;

/// Render an optional process exit status for error messages.
fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Baseliner engine errors.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("reference '{reference}' not found in repository {}", .repo.display())]
    RefNotFound { reference: String, repo: PathBuf },

    #[error("checkout of '{reference}' at {} failed: {reason}", .path.display())]
    Checkout {
        reference: String,
        path: PathBuf,
        reason: String,
    },

    #[error("tool '{tool}' is not available: {reason}")]
    ToolNotFound { tool: String, reason: String },

    #[error(
        "tool '{tool}' produced unusable output in {} (exit status {}): {reason}",
        .snapshot.display(),
        exit_status(.exit_code)
    )]
    ToolOutput {
        tool: String,
        snapshot: PathBuf,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("tool '{tool}' timed out after {}s in {}", .timeout.as_secs(), .snapshot.display())]
    ToolTimeout {
        tool: String,
        snapshot: PathBuf,
        timeout: Duration,
    },

    #[error("failed to normalize '{tool}' output: {reason}")]
    Normalization { tool: String, reason: String },

    #[error("baseline I/O error at {}: {source}", .path.display())]
    BaselineIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("comparison invariant violated: {0}")]
    ComparisonInvariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("comparison incomplete: {0}")]
    Incomplete(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BaselineError {
    /// Whether this error stems from how the engine was invoked rather than
    /// from the repository or tools.
    pub fn is_invalid_invocation(&self) -> bool {
        matches!(self, BaselineError::Config(_))
    }

    /// Whether this error, raised while evaluating the base side, may be
    /// downgraded to an empty base set.
    ///
    /// Persistence and internal-consistency failures are never recoverable.
    pub fn is_recoverable_for_base(&self) -> bool {
        matches!(
            self,
            BaselineError::RefNotFound { .. }
                | BaselineError::Checkout { .. }
                | BaselineError::ToolOutput { .. }
                | BaselineError::ToolTimeout { .. }
                | BaselineError::Normalization { .. }
        )
    }
}

/// Result type for Baseliner operations.
pub type Result<T> = std::result::Result<T, BaselineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_not_found_names_reference() {
        let err = BaselineError::RefNotFound {
            reference: "feature/missing".to_string(),
            repo: PathBuf::from("/work/repo"),
        };
        let msg = err.to_string();
        assert!(msg.contains("feature/missing"));
        assert!(msg.contains("/work/repo"));
    }

    #[test]
    fn test_tool_output_includes_exit_status() {
        let err = BaselineError::ToolOutput {
            tool: "mypy".to_string(),
            snapshot: PathBuf::from("/tmp/snap-1"),
            exit_code: Some(2),
            reason: "empty output".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit status 2"));
        assert!(msg.contains("/tmp/snap-1"));

        let err = BaselineError::ToolOutput {
            tool: "mypy".to_string(),
            snapshot: PathBuf::from("/tmp/snap-1"),
            exit_code: None,
            reason: "empty output".to_string(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_timeout_reports_budget() {
        let err = BaselineError::ToolTimeout {
            tool: "pyright".to_string(),
            snapshot: PathBuf::from("/tmp/snap-2"),
            timeout: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn test_base_recoverability() {
        let checkout = BaselineError::Checkout {
            reference: "main".to_string(),
            path: PathBuf::from("/tmp/x"),
            reason: "disk full".to_string(),
        };
        assert!(checkout.is_recoverable_for_base());

        let io = BaselineError::BaselineIo {
            path: PathBuf::from(".baselines/mypy/root/main.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!io.is_recoverable_for_base());
        assert!(!BaselineError::ComparisonInvariant("x".to_string()).is_recoverable_for_base());
    }

    #[test]
    fn test_invalid_invocation_classification() {
        assert!(BaselineError::Config("unknown package 'x'".to_string()).is_invalid_invocation());
        assert!(!BaselineError::Incomplete("interrupted".to_string()).is_invalid_invocation());
    }
}
