//! Domain models for Baseliner.
//!
//! Canonical definitions for the core entities:
//! - `Diagnostic`: One reported issue, tool-independent
//! - `DiagnosticSet`: Immutable, deduplicated diagnostics for one run
//! - `ComparisonResult`: New/fixed/unchanged partition of two sets
//! - `BaselineError`: Engine error taxonomy

pub mod comparison;
pub mod diagnostic;
pub mod error;

// Re-export main types and errors
pub use comparison::ComparisonResult;
pub use diagnostic::{
    normalize_message, Diagnostic, DiagnosticSet, IdentityKey, IdentityScheme, Severity,
    UNKNOWN_CODE,
};
pub use error::{BaselineError, Result};
