//! Structured observability hooks for the comparison lifecycle.
//!
//! This module provides:
//! - Comparison-scoped tracing spans via `ComparisonSpan` RAII guard
//! - Emission functions for key lifecycle events: snapshot creation and
//!   release, tool completion, baseline persistence, comparison outcome
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, pass `--log-json` to the CLI.

use std::path::Path;

use tracing::{error, info, warn};

/// RAII guard that enters a comparison-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = ComparisonSpan::enter("core", "mypy");
/// // All tracing calls are now tagged with package = "core", tool = "mypy"
/// ```
pub struct ComparisonSpan {
    _span: tracing::span::EnteredSpan,
}

impl ComparisonSpan {
    /// Create and enter a span tagged with the package and tool.
    pub fn enter(package: &str, tool: &str) -> Self {
        Self {
            _span: comparison_span(package, tool).entered(),
        }
    }
}

/// Span for async work on one package/tool pair; attach with
/// [`tracing::Instrument`] instead of entering across awaits.
pub fn comparison_span(package: &str, tool: &str) -> tracing::Span {
    tracing::info_span!("baseliner.compare", package = %package, tool = %tool)
}

/// Emit event: an isolated snapshot was materialized.
pub fn emit_checkout_created(reference: &str, path: &Path, duration_ms: u64) {
    info!(
        event = "checkout.created",
        reference = %reference,
        path = %path.display(),
        duration_ms = duration_ms,
    );
}

/// Emit event: an isolated snapshot was removed.
pub fn emit_checkout_released(path: &Path, clean: bool) {
    info!(event = "checkout.released", path = %path.display(), clean = clean);
}

/// Emit event: an analysis tool finished running.
pub fn emit_tool_finished(tool: &str, exit_code: Option<i32>, duration_ms: u64, bytes: usize) {
    info!(
        event = "tool.finished",
        tool = %tool,
        exit_code = ?exit_code,
        duration_ms = duration_ms,
        output_bytes = bytes,
    );
}

/// Emit event: a baseline artifact was written.
pub fn emit_baseline_saved(key: &str, path: &Path, count: usize) {
    info!(event = "baseline.saved", key = %key, path = %path.display(), count = count);
}

/// Emit event: a baseline artifact was looked up. `count` is `None` when absent.
pub fn emit_baseline_loaded(key: &str, path: &Path, count: Option<usize>) {
    info!(
        event = "baseline.loaded",
        key = %key,
        path = %path.display(),
        present = count.is_some(),
        count = count.unwrap_or(0),
    );
}

/// Emit event: a comparison finished.
pub fn emit_comparison_finished(
    package: &str,
    tool: &str,
    new: usize,
    fixed: usize,
    unchanged: usize,
) {
    info!(
        event = "comparison.finished",
        package = %package,
        tool = %tool,
        new = new,
        fixed = fixed,
        unchanged = unchanged,
    );
}

/// Emit event: the base side failed and is treated as empty (warning level).
pub fn emit_base_degraded(reference: &str, error: &dyn std::fmt::Display) {
    warn!(event = "base.degraded", reference = %reference, error = %error);
}

/// Emit event: tool output could not be normalized (error level).
pub fn emit_normalization_failed(tool: &str, error: &dyn std::fmt::Display) {
    error!(event = "normalize.failed", tool = %tool, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_span_create() {
        // Just ensure ComparisonSpan::enter doesn't panic
        let _span = ComparisonSpan::enter("core", "mypy");
    }
}
