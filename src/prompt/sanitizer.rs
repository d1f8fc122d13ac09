//! Prompt sanitizer.
//!
//! Passes, in order:
//!
//! 1. stable dedupe (first occurrence wins)
//! 2. weight-priority truncation to the total length budget
//! 3. per-fragment quality checks
//! 4. a second stable dedupe, since step 3 can make two fragments equal
//!
//! Only step 2 may reorder, and only when truncation is actually needed.
//! Lengths are counted in characters.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::prompt::placement::SEPARATOR;

static WEIGHT_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*:\s*(-?\d+(?:\.\d+)?)\s*\)").expect("valid weight regex")
});

static REPEATED_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(?:\s*,)+").expect("valid separator regex"));

/// Weight of an unannotated fragment.
pub const DEFAULT_WEIGHT: f64 = 1.0;

// ============================================================================
// Configuration
// ============================================================================

/// Length budgets for sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Budget for the joined prompt.
    #[serde(default = "default_max_total_length", rename = "maxTotalLength")]
    pub max_total_length: usize,

    /// Cap for a single fragment, ellipsis included.
    #[serde(default = "default_max_fragment_length", rename = "maxFragmentLength")]
    pub max_fragment_length: usize,

    /// Marker appended to truncated fragments.
    #[serde(default = "default_ellipsis")]
    pub ellipsis: String,
}

fn default_max_total_length() -> usize {
    500
}

fn default_max_fragment_length() -> usize {
    200
}

fn default_ellipsis() -> String {
    "...".to_string()
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_total_length: default_max_total_length(),
            max_fragment_length: default_max_fragment_length(),
            ellipsis: default_ellipsis(),
        }
    }
}

impl SanitizerConfig {
    /// Override the total budget.
    #[must_use]
    pub fn with_max_total_length(mut self, max: usize) -> Self {
        self.max_total_length = max;
        self
    }

    /// Override the per-fragment cap.
    #[must_use]
    pub fn with_max_fragment_length(mut self, max: usize) -> Self {
        self.max_fragment_length = max;
        self
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Weight of the first `(text:w)` annotation, or [`DEFAULT_WEIGHT`].
#[must_use]
pub fn parse_weight(fragment: &str) -> f64 {
    WEIGHT_ANNOTATION
        .captures(fragment)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(DEFAULT_WEIGHT)
}

/// Stable, order-preserving dedupe.
#[must_use]
pub fn dedupe(fragments: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(fragments.len());
    fragments
        .into_iter()
        .filter(|fragment| seen.insert(fragment.clone()))
        .collect()
}

fn joined_length(fragments: &[String]) -> usize {
    let separators = fragments.len().saturating_sub(1) * SEPARATOR.chars().count();
    fragments.iter().map(|f| f.chars().count()).sum::<usize>() + separators
}

/// Keep the heaviest fragments that fit in `max_total_length`.
///
/// If the joined list already fits, it is returned unchanged. Otherwise the
/// fragments are stable-sorted by descending weight and accumulated while
/// `running + len + 2 <= max_total_length`; the first fragment that does not
/// fit ends the pass.
#[must_use]
pub fn truncate_by_weight(fragments: Vec<String>, max_total_length: usize) -> Vec<String> {
    if joined_length(&fragments) <= max_total_length {
        return fragments;
    }

    let mut weighted: Vec<(f64, String)> = fragments
        .into_iter()
        .map(|fragment| (parse_weight(&fragment), fragment))
        .collect();
    weighted.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut running = 0;
    let mut kept = Vec::new();
    for (weight, fragment) in weighted {
        let len = fragment.chars().count();
        if running + len + SEPARATOR.len() > max_total_length {
            debug!(
                "Length budget reached at '{}' (weight {}), dropping the rest",
                fragment, weight
            );
            break;
        }
        running += len + SEPARATOR.len();
        kept.push(fragment);
    }
    kept
}

/// Drop unmatched parenthesized spans.
///
/// An unmatched `)` removes everything from the start of the fragment up to
/// and including it; an unmatched `(` removes everything from it to the end.
#[must_use]
pub fn remove_unbalanced(fragment: &str) -> String {
    let chars: Vec<char> = fragment.chars().collect();

    let mut depth = 0usize;
    let mut cut_before = 0;
    for (i, c) in chars.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => cut_before = i + 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    let rest = &chars[cut_before..];

    let mut open = Vec::new();
    for (i, c) in rest.iter().enumerate() {
        match c {
            '(' => open.push(i),
            ')' => {
                open.pop();
            }
            _ => {}
        }
    }
    let cut_after = open.first().copied().unwrap_or(rest.len());
    rest[..cut_after].iter().collect()
}

/// Truncate to exactly `max` characters, ellipsis included.
#[must_use]
pub fn truncate_fragment(fragment: &str, max: usize, ellipsis: &str) -> String {
    if fragment.chars().count() <= max {
        return fragment.to_string();
    }
    let marker = ellipsis.chars().count();
    if marker >= max {
        return fragment.chars().take(max).collect();
    }
    let mut truncated: String = fragment.chars().take(max - marker).collect();
    truncated.push_str(ellipsis);
    truncated
}

// ============================================================================
// Sanitizer
// ============================================================================

/// Runs all sanitizer passes with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    /// Create a sanitizer.
    #[must_use]
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Clean one fragment, or `None` if nothing usable remains.
    ///
    /// The length cap is applied before the parenthesis check, so a span cut
    /// by the cap is removed rather than left open.
    #[must_use]
    pub fn clean_fragment(&self, fragment: &str) -> Option<String> {
        if fragment.trim().is_empty() {
            return None;
        }

        let stripped: String = fragment
            .chars()
            .filter(|c| !matches!(c, '<' | '>' | '{' | '}'))
            .collect();
        let capped = truncate_fragment(
            stripped.trim(),
            self.config.max_fragment_length,
            &self.config.ellipsis,
        );
        let balanced = remove_unbalanced(&capped);
        let collapsed = REPEATED_SEPARATOR.replace_all(&balanced, ",");
        let trimmed = collapsed.trim_matches(|c: char| c == ',' || c.is_whitespace());
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Run every pass.
    #[must_use]
    pub fn sanitize(&self, fragments: Vec<String>) -> Vec<String> {
        let before = fragments.len();
        let unique = dedupe(fragments);
        let budgeted = truncate_by_weight(unique, self.config.max_total_length);
        let cleaned: Vec<String> = budgeted
            .iter()
            .filter_map(|fragment| self.clean_fragment(fragment))
            .collect();
        let result = dedupe(cleaned);
        if result.len() != before {
            debug!("Sanitizer kept {} of {} fragments", result.len(), before);
        }
        result
    }
}
