//! Fragment library validation.
//!
//! Walks a prompts tree, loads every tier that has a `positive_base.json`
//! and reports authoring defects. Used by `promptloom validate`.
//!
//! # Example
//!
//! ```rust,ignore
//! use promptloom::config::LibraryValidator;
//!
//! let report = LibraryValidator::new("prompts").validate();
//! if !report.is_valid() {
//!     for error in &report.errors {
//!         eprintln!("Error: {}", error);
//!     }
//!     std::process::exit(report.exit_code());
//! }
//! ```

use crate::library::{FragmentLibrary, LibraryFile, PromptSet, TierPath};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Deepest tier: `style/category/subcategory`.
const MAX_TIER_DEPTH: usize = 3;

/// Outcome for one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierReport {
    /// `style/category/subcategory`, or empty for the root tier.
    pub tier: String,
    pub positive_collections: usize,
    pub negative_collections: usize,
    pub fragments: usize,
    pub cancel_pairs: usize,
    /// Load error, if the tier is invalid.
    pub error: Option<String>,
}

impl TierReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of validating a prompts tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Prompts root that was walked.
    pub root: PathBuf,
    pub tiers: Vec<TierReport>,
    /// Errors that make a tier unusable.
    pub errors: Vec<String>,
    /// Suspicious but loadable content.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns true if no tier failed to load.
    ///
    /// Warnings do not affect validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// 0 if valid, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    /// Generate a human-readable summary of the validation result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                format!("{} tier(s) valid.", self.tiers.len())
            } else {
                format!(
                    "{} tier(s) valid with {} warning(s).",
                    self.tiers.len(),
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Library is invalid with {} error(s) in {} tier(s).",
                self.errors.len(),
                self.tiers.len()
            )
        }
    }
}

/// Validates every tier under a prompts root.
#[derive(Debug, Clone)]
pub struct LibraryValidator {
    root: PathBuf,
}

impl LibraryValidator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Tiers under the root that contain a `positive_base.json`.
    #[must_use]
    pub fn discover_tiers(&self) -> Vec<TierPath> {
        let base = LibraryFile::PositiveBase.file_name();
        let mut tiers: Vec<TierPath> = WalkDir::new(&self.root)
            .max_depth(MAX_TIER_DEPTH + 1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == base)
            .filter_map(|entry| {
                let dir = entry.path().parent()?;
                tier_from_relative(dir.strip_prefix(&self.root).ok()?)
            })
            .collect();
        tiers.sort_by_key(ToString::to_string);
        tiers.dedup();
        tiers
    }

    /// Load every discovered tier and collect findings.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport {
            root: self.root.clone(),
            ..ValidationReport::default()
        };

        if !self.root.is_dir() {
            report
                .errors
                .push(format!("Prompts directory not found: {}", self.root.display()));
            return report;
        }

        let tiers = self.discover_tiers();
        if tiers.is_empty() {
            report.errors.push(format!(
                "No {} found under {}",
                LibraryFile::PositiveBase,
                self.root.display()
            ));
            return report;
        }

        for tier in tiers {
            debug!("Validating tier '{}'", tier);
            let label = tier.to_string();
            match PromptSet::load(&self.root, &tier, true) {
                Ok(set) => {
                    collect_warnings(&label, &set.positive, &mut report.warnings);
                    collect_warnings(&label, &set.negative, &mut report.warnings);
                    report.tiers.push(TierReport {
                        tier: label,
                        positive_collections: set.positive.len(),
                        negative_collections: set.negative.len(),
                        fragments: set.positive.fragment_count() + set.negative.fragment_count(),
                        cancel_pairs: set.cancel_pairs.len(),
                        error: None,
                    });
                }
                Err(e) => {
                    report.errors.push(format!("[{}] {}", display_tier(&label), e));
                    report.tiers.push(TierReport {
                        tier: label,
                        positive_collections: 0,
                        negative_collections: 0,
                        fragments: 0,
                        cancel_pairs: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        report
    }
}

fn display_tier(label: &str) -> &str {
    if label.is_empty() {
        "<root>"
    } else {
        label
    }
}

fn tier_from_relative(relative: &Path) -> Option<TierPath> {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() > MAX_TIER_DEPTH {
        return None;
    }
    let part = |i: usize| parts.get(i).cloned().unwrap_or_default();
    Some(TierPath::new(part(0), part(1), part(2)))
}

fn collect_warnings(tier: &str, library: &FragmentLibrary, warnings: &mut Vec<String>) {
    for collection in library.iter() {
        if collection.fragments.is_empty() {
            warnings.push(format!(
                "[{}] collection '{}' has no fragments",
                display_tier(tier),
                collection.name
            ));
        } else if collection.min_count > collection.fragments.len() {
            warnings.push(format!(
                "[{}] collection '{}' asks for at least {} of {} fragments",
                display_tier(tier),
                collection.name,
                collection.min_count,
                collection.fragments.len()
            ));
        }
    }
}
