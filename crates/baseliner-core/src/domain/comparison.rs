//! Comparison outcome between a base and a head diagnostic set.

use serde::{Deserialize, Serialize};

use super::diagnostic::Diagnostic;
use super::error::{BaselineError, Result};

/// Derived, ephemeral result of comparing two diagnostic sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonResult {
    /// Present in head, absent from base. Sorted.
    pub new_diagnostics: Vec<Diagnostic>,

    /// Present in base, absent from head. Sorted.
    pub fixed_diagnostics: Vec<Diagnostic>,

    /// Identity keys present in both.
    pub unchanged_count: usize,
}

impl ComparisonResult {
    /// No new diagnostics were introduced.
    pub fn is_clean(&self) -> bool {
        self.new_diagnostics.is_empty()
    }

    /// Check the partition invariants against the sizes of the inputs.
    ///
    /// Every head diagnostic is either new or unchanged, every base
    /// diagnostic is either fixed or unchanged, and new and fixed never share
    /// an entry.
    pub fn verify(&self, base_len: usize, head_len: usize) -> Result<()> {
        if self.new_diagnostics.len() + self.unchanged_count != head_len {
            return Err(BaselineError::ComparisonInvariant(format!(
                "new ({}) + unchanged ({}) != head ({})",
                self.new_diagnostics.len(),
                self.unchanged_count,
                head_len
            )));
        }
        if self.fixed_diagnostics.len() + self.unchanged_count != base_len {
            return Err(BaselineError::ComparisonInvariant(format!(
                "fixed ({}) + unchanged ({}) != base ({})",
                self.fixed_diagnostics.len(),
                self.unchanged_count,
                base_len
            )));
        }
        if let Some(shared) = self
            .new_diagnostics
            .iter()
            .find(|d| self.fixed_diagnostics.binary_search(d).is_ok())
        {
            return Err(BaselineError::ComparisonInvariant(format!(
                "diagnostic reported as both new and fixed: {shared}"
            )));
        }
        Ok(())
    }
}
