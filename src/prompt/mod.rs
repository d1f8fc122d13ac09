//! Prompt composition engine.
//!
//! - [`sampler`] - Per-collection random selection
//! - [`conditional`] - Two-pass conditional inclusion
//! - [`placement`] - Start / untagged / end ordering
//! - [`cancel`] - Cancel-pair conflict resolution
//! - [`sanitizer`] - Dedupe, length budgets and fragment cleanup
//! - [`composer`] - The full pipeline
//!
//! # Example
//!
//! ```
//! use promptloom::library::{CancelPairTable, FragmentCollection, FragmentLibrary, Placement};
//! use promptloom::prompt::PromptComposer;
//! use promptloom::seed::SeedPolicy;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let library = FragmentLibrary::new(vec![
//!     FragmentCollection::new("A", ["a"], 1, 1),
//!     FragmentCollection::new("B", ["b"], 1, 1).with_placement(Placement::Start),
//!     FragmentCollection::new("C", ["c"], 1, 1).with_placement(Placement::End),
//! ])
//! .expect("valid library");
//! let cancel_pairs = CancelPairTable::new();
//! let policy = SeedPolicy::default();
//!
//! let composer = PromptComposer::new(&library, &cancel_pairs, &policy);
//! let result = composer.compose(&mut StdRng::seed_from_u64(1)).expect("composes");
//! assert_eq!(result.assembled_text, "b, a, c");
//! ```
//!
//! # Pipeline
//!
//! ```text
//! SeedPolicy::draw ─> ConditionalResolver ─> placement::assemble
//!                                                    │
//!          join <─ Sanitizer::sanitize <─ ConflictResolver
//! ```

pub mod cancel;
pub mod composer;
pub mod conditional;
pub mod placement;
pub mod sampler;
pub mod sanitizer;

pub use cancel::{
    ConflictRemoval, ConflictResolver, ExactMatcher, FragmentMatcher, TriggerMatcher,
    WeightTolerantMatcher,
};
pub use composer::{compose, compose_negative, CompositionResult, PromptComposer};
pub use conditional::{ConditionalResolver, Selection};
pub use sanitizer::{Sanitizer, SanitizerConfig};
