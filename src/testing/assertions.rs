//! Custom assertions for composition results.

use crate::prompt::CompositionResult;
use std::collections::HashSet;

/// Assert that no fragment appears twice in the final prompt.
///
/// # Panics
///
/// Panics listing the repeated fragments.
pub fn assert_no_duplicates(result: &CompositionResult) {
    let mut seen = HashSet::new();
    let repeated: Vec<&String> = result
        .fragments
        .iter()
        .filter(|fragment| !seen.insert(fragment.as_str()))
        .collect();
    assert!(
        repeated.is_empty(),
        "Expected unique fragments, found repeats: {:?}\nPrompt: {}",
        repeated,
        result.assembled_text
    );
}

/// Assert that the joined prompt fits the length budget.
///
/// # Panics
///
/// Panics if the prompt is longer than `max_total_length` characters.
pub fn assert_within_budget(result: &CompositionResult, max_total_length: usize) {
    let length = result.assembled_text.chars().count();
    assert!(
        length <= max_total_length,
        "Expected at most {} characters, got {}.\nPrompt: {}",
        max_total_length,
        length,
        result.assembled_text
    );
}

/// Assert that `trigger` removed `removed`.
///
/// # Panics
///
/// Panics if no matching audit record exists or the fragment survived.
pub fn assert_removed(result: &CompositionResult, trigger: &str, removed: &str) {
    assert!(
        result
            .removed_by_conflict
            .iter()
            .any(|r| r.trigger == trigger && r.removed == removed),
        "Expected '{}' to remove '{}'. Removals: {:?}",
        trigger,
        removed,
        result.removed_by_conflict
    );
    assert!(
        !result.fragments.iter().any(|f| f == removed),
        "'{}' was recorded as removed but is still in the prompt",
        removed
    );
}
