//! Cancel-pair conflict resolution.
//!
//! Triggers are matched strictly: case-insensitive equality, or the fragment
//! starting with the trigger followed by a space. Removal targets are matched
//! loosely: exact equality, or a substring of the fragment once its weight
//! annotations are stripped, so `"(looking at viewer:1.4)"` is removed by the
//! pattern `"looking at viewer"`.

use crate::library::CancelPairTable;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static WEIGHT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*-?\d+(?:\.\d+)?\s*\)").expect("valid weight regex"));

/// Remove emphasis syntax from a fragment.
///
/// `"(looking at viewer:1.4)"` becomes `"looking at viewer"`; nested and
/// unweighted parentheses are dropped as well.
#[must_use]
pub fn strip_weight_annotations(fragment: &str) -> String {
    let without_weights = WEIGHT_SUFFIX.replace_all(fragment, ")");
    without_weights
        .chars()
        .filter(|c| !matches!(c, '(' | ')'))
        .collect::<String>()
        .trim()
        .to_string()
}

// ============================================================================
// Matchers
// ============================================================================

/// Decides whether a fragment matches a pattern.
pub trait FragmentMatcher: Send + Sync {
    /// Whether `fragment` matches `pattern`.
    fn matches(&self, fragment: &str, pattern: &str) -> bool;
}

/// Exact string equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl FragmentMatcher for ExactMatcher {
    fn matches(&self, fragment: &str, pattern: &str) -> bool {
        fragment == pattern
    }
}

/// Equality, or substring of the weight-stripped fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightTolerantMatcher;

impl FragmentMatcher for WeightTolerantMatcher {
    fn matches(&self, fragment: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        ExactMatcher.matches(fragment, pattern)
            || strip_weight_annotations(fragment).contains(pattern)
    }
}

/// Case-insensitive equality or `"<trigger> ..."` prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerMatcher;

impl FragmentMatcher for TriggerMatcher {
    fn matches(&self, fragment: &str, pattern: &str) -> bool {
        let fragment = fragment.to_lowercase();
        let trigger = pattern.to_lowercase();
        fragment == trigger
            || fragment
                .strip_prefix(trigger.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Audit record for one removed fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRemoval {
    /// Trigger that fired.
    pub trigger: String,
    /// Fragment that was removed.
    pub removed: String,
}

/// Applies a [`CancelPairTable`] to an assembled fragment list.
pub struct ConflictResolver<'a> {
    table: &'a CancelPairTable,
    trigger_matcher: Box<dyn FragmentMatcher + 'a>,
    removal_matcher: Box<dyn FragmentMatcher + 'a>,
}

impl<'a> ConflictResolver<'a> {
    /// Resolver with the default trigger and weight-tolerant removal matchers.
    #[must_use]
    pub fn new(table: &'a CancelPairTable) -> Self {
        Self {
            table,
            trigger_matcher: Box::new(TriggerMatcher),
            removal_matcher: Box::new(WeightTolerantMatcher),
        }
    }

    /// Replace the removal matcher.
    #[must_use]
    pub fn with_removal_matcher(mut self, matcher: impl FragmentMatcher + 'a) -> Self {
        self.removal_matcher = Box::new(matcher);
        self
    }

    /// Replace the trigger matcher.
    #[must_use]
    pub fn with_trigger_matcher(mut self, matcher: impl FragmentMatcher + 'a) -> Self {
        self.trigger_matcher = Box::new(matcher);
        self
    }

    /// Remove fragments that conflict with a present trigger.
    ///
    /// Triggers are processed in table order against the list as it stands
    /// after earlier triggers fired. A fragment that matches the trigger
    /// itself is never removed by that trigger's rule.
    #[must_use]
    pub fn resolve(&self, fragments: Vec<String>) -> (Vec<String>, Vec<ConflictRemoval>) {
        let mut kept = fragments;
        let mut removals = Vec::new();

        for (trigger, patterns) in self.table.iter() {
            let present = kept
                .iter()
                .any(|fragment| self.trigger_matcher.matches(fragment, trigger));
            if !present {
                continue;
            }

            kept.retain(|fragment| {
                if self.trigger_matcher.matches(fragment, trigger) {
                    return true;
                }
                let conflicting = patterns
                    .iter()
                    .any(|pattern| self.removal_matcher.matches(fragment, pattern));
                if conflicting {
                    debug!("Cancel pair '{}' removed '{}'", trigger, fragment);
                    removals.push(ConflictRemoval {
                        trigger: trigger.to_string(),
                        removed: fragment.clone(),
                    });
                }
                !conflicting
            });
        }

        (kept, removals)
    }
}
