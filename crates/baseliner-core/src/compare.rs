//! Set difference between a base and a head diagnostic set.
//!
//! Diagnostics are grouped by the anchor of their identity key
//! (`file`, `line`, primary field). Inside an anchor, entries with equal
//! tiebreaks match first; any remaining entries pair off in sorted order, so
//! a single diagnostic whose message was reworded stays unchanged. Whatever
//! is left over is new (head side) or fixed (base side).
//!
//! Schemes that do not pair rewordings (see
//! [`IdentityScheme::pairs_rewordings`]) skip that pairing step.
//!
//! The matching procedure does not depend on which side is base, which
//! gives `compare(a, b).new_diagnostics == compare(b, a).fixed_diagnostics`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{ComparisonResult, Diagnostic, DiagnosticSet, IdentityScheme, Result};

type Anchor = (String, u32, String);
type Group<'a> = Vec<(String, &'a Diagnostic)>;

/// Compare two sets using the default `(file, line, code)` identity.
pub fn compare(base: &DiagnosticSet, head: &DiagnosticSet) -> Result<ComparisonResult> {
    compare_with(base, head, IdentityScheme::default())
}

/// Compare two sets under an explicit identity scheme.
pub fn compare_with(
    base: &DiagnosticSet,
    head: &DiagnosticSet,
    scheme: IdentityScheme,
) -> Result<ComparisonResult> {
    let base_groups = group(base, scheme);
    let head_groups = group(head, scheme);

    let mut anchors: Vec<&Anchor> = base_groups.keys().chain(head_groups.keys()).collect();
    anchors.sort();
    anchors.dedup();

    let empty: Group<'_> = Vec::new();
    let mut result = ComparisonResult::default();

    for anchor in anchors {
        let base_group = base_groups.get(anchor).unwrap_or(&empty);
        let head_group = head_groups.get(anchor).unwrap_or(&empty);
        let (fixed, new, matched) =
            match_group(base_group, head_group, scheme.pairs_rewordings());
        result.fixed_diagnostics.extend(fixed.into_iter().cloned());
        result.new_diagnostics.extend(new.into_iter().cloned());
        result.unchanged_count += matched;
    }

    result.new_diagnostics.sort();
    result.fixed_diagnostics.sort();
    result.verify(base.len(), head.len())?;

    debug!(
        new = result.new_diagnostics.len(),
        fixed = result.fixed_diagnostics.len(),
        unchanged = result.unchanged_count,
        "comparison computed"
    );
    Ok(result)
}

fn group(set: &DiagnosticSet, scheme: IdentityScheme) -> BTreeMap<Anchor, Group<'_>> {
    let mut groups: BTreeMap<Anchor, Group<'_>> = BTreeMap::new();
    for diag in set {
        let key = diag.identity_key(scheme);
        groups
            .entry((key.file, key.line, key.primary))
            .or_default()
            .push((key.tiebreak, diag));
    }
    for entries in groups.values_mut() {
        entries.sort();
    }
    groups
}

/// Returns `(unmatched base, unmatched head, matched count)` for one anchor.
fn match_group<'a>(
    base: &[(String, &'a Diagnostic)],
    head: &[(String, &'a Diagnostic)],
    pair_rewordings: bool,
) -> (Vec<&'a Diagnostic>, Vec<&'a Diagnostic>, usize) {
    let mut leftover_base = Vec::new();
    let mut leftover_head = Vec::new();
    let mut matched = 0;

    let (mut i, mut j) = (0, 0);
    while i < base.len() && j < head.len() {
        match base[i].0.cmp(&head[j].0) {
            std::cmp::Ordering::Equal => {
                matched += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                leftover_base.push(base[i].1);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                leftover_head.push(head[j].1);
                j += 1;
            }
        }
    }
    leftover_base.extend(base[i..].iter().map(|(_, d)| *d));
    leftover_head.extend(head[j..].iter().map(|(_, d)| *d));

    if !pair_rewordings {
        return (leftover_base, leftover_head, matched);
    }

    // Same anchor, different wording: still the same diagnostic.
    let paired = leftover_base.len().min(leftover_head.len());
    matched += paired;
    let fixed = leftover_base.split_off(paired);
    let new = leftover_head.split_off(paired);

    (fixed, new, matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;

    fn diag(file: &str, line: u32, code: &str, message: &str) -> Diagnostic {
        Diagnostic::new(file, line, code, message, Severity::Error)
    }

    fn set(items: &[(&str, u32, &str)]) -> DiagnosticSet {
        items
            .iter()
            .map(|(f, l, c)| diag(f, *l, c, "message"))
            .collect()
    }

    #[test]
    fn test_new_fixed_unchanged_partition() {
        let base = set(&[("a.py", 10, "E001"), ("b.py", 5, "E002")]);
        let head = set(&[("a.py", 10, "E001"), ("c.py", 1, "E003")]);
        let result = compare(&base, &head).unwrap();

        assert_eq!(result.new_diagnostics, vec![diag("c.py", 1, "E003", "message")]);
        assert_eq!(result.fixed_diagnostics, vec![diag("b.py", 5, "E002", "message")]);
        assert_eq!(result.unchanged_count, 1);
    }

    #[test]
    fn test_both_empty() {
        let result = compare(&DiagnosticSet::empty(), &DiagnosticSet::empty()).unwrap();
        assert_eq!(result, ComparisonResult::default());
    }

    #[test]
    fn test_empty_base_makes_everything_new() {
        let head = set(&[("a.py", 1, "E1"), ("new_file.py", 3, "E2")]);
        let result = compare(&DiagnosticSet::empty(), &head).unwrap();
        assert_eq!(result.new_diagnostics.len(), 2);
        assert!(result.fixed_diagnostics.is_empty());
        assert_eq!(result.unchanged_count, 0);
    }

    #[test]
    fn test_column_and_rewording_are_unchanged() {
        let base = DiagnosticSet::new(vec![
            diag("a.py", 4, "arg-type", "Argument 1 has incompatible type").with_column(3)
        ]);
        let head = DiagnosticSet::new(vec![diag(
            "a.py",
            4,
            "arg-type",
            "Argument 1 to \"f\" has incompatible type",
        )
        .with_column(9)]);
        let result = compare(&base, &head).unwrap();
        assert!(result.is_clean());
        assert!(result.fixed_diagnostics.is_empty());
        assert_eq!(result.unchanged_count, 1);
    }

    #[test]
    fn test_message_breaks_code_collisions() {
        let base = DiagnosticSet::new(vec![diag("a.py", 1, "E1", "first")]);
        let head = DiagnosticSet::new(vec![
            diag("a.py", 1, "E1", "first"),
            diag("a.py", 1, "E1", "second"),
        ]);
        let result = compare(&base, &head).unwrap();
        assert_eq!(result.new_diagnostics, vec![diag("a.py", 1, "E1", "second")]);
        assert_eq!(result.unchanged_count, 1);
    }

    #[test]
    fn test_line_move_is_new_and_fixed() {
        let base = set(&[("a.py", 1, "E1")]);
        let head = set(&[("a.py", 2, "E1")]);
        let result = compare(&base, &head).unwrap();
        assert_eq!(result.new_diagnostics.len(), 1);
        assert_eq!(result.fixed_diagnostics.len(), 1);
    }

    #[test]
    fn test_file_line_message_scheme() {
        let base = DiagnosticSet::new(vec![diag("a.py", 1, "old-code", "same text")]);
        let head = DiagnosticSet::new(vec![diag("a.py", 1, "new-code", "same text")]);

        let by_code = compare_with(&base, &head, IdentityScheme::FileLineCode).unwrap();
        assert_eq!(by_code.new_diagnostics.len(), 1);

        let by_message = compare_with(&base, &head, IdentityScheme::FileLineMessage).unwrap();
        assert!(by_message.is_clean());
        assert_eq!(by_message.unchanged_count, 1);
    }

    #[test]
    fn test_exact_scheme_keeps_swapped_subjects_apart() {
        let base = DiagnosticSet::new(vec![diag("pyproject.toml", 1, "DEP002", "'toolz' unused")]);
        let head = DiagnosticSet::new(vec![diag("pyproject.toml", 1, "DEP002", "'numpy' unused")]);

        let by_code = compare_with(&base, &head, IdentityScheme::FileLineCode).unwrap();
        assert_eq!(by_code.unchanged_count, 1);

        let exact = compare_with(&base, &head, IdentityScheme::FileLineCodeMessage).unwrap();
        assert_eq!(exact.new_diagnostics, head.as_slice());
        assert_eq!(exact.fixed_diagnostics, base.as_slice());
        assert_eq!(exact.unchanged_count, 0);

        let same = compare_with(&base, &base, IdentityScheme::FileLineCodeMessage).unwrap();
        assert_eq!(same.unchanged_count, 1);
    }

    #[test]
    fn test_output_sorted_by_file_line_code() {
        let head = set(&[("z.py", 1, "E1"), ("a.py", 9, "E2"), ("a.py", 2, "E9")]);
        let result = compare(&DiagnosticSet::empty(), &head).unwrap();
        let order: Vec<(&str, u32)> = result
            .new_diagnostics
            .iter()
            .map(|d| (d.file.as_str(), d.line))
            .collect();
        assert_eq!(order, vec![("a.py", 2), ("a.py", 9), ("z.py", 1)]);
    }
}
