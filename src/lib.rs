//! promptloom - prompt composition engine for text-to-image services
//!
//! Builds prompts from curated fragment libraries, resolves conflicts
//! between fragments, and drives a Stable Diffusion WebUI style HTTP API in
//! batches, saving each image next to the metadata that produced it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`library`] - Fragment collections, cancel pairs and tiered loading
//! - [`prompt`] - Sampling, conditional inclusion, placement, conflicts, sanitizing
//! - [`seed`] - Seed denylist and threshold
//! - [`retry`] - Bounded retry combinators
//! - [`backend`] - Image service abstraction and WebUI client
//! - [`artifact`] - Output layout and metadata files
//! - [`generator`] - Batch driver with "another version" generation
//! - [`config`] - Settings loading and library validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (mocks, fixtures, assertions)
//!
//! # Example
//!
//! ```rust,ignore
//! use promptloom::library::{PromptSet, TierPath};
//! use promptloom::prompt::PromptComposer;
//! use rand::SeedableRng;
//!
//! let tier = TierPath::new("anime", "portrait", "close_up");
//! let set = PromptSet::load("prompts".as_ref(), &tier, false)?;
//!
//! let composer = PromptComposer::new(&set.positive, &set.cancel_pairs, &set.seed_policy);
//! let result = composer.compose(&mut rand::rngs::StdRng::seed_from_u64(7))?;
//! println!("{}", result.assembled_text);
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod generator;
pub mod library;
pub mod prompt;
pub mod retry;
pub mod seed;
pub mod testing;

// Re-export commonly used types
pub use error::{IntoLoomError, LoomError, Result};

pub use config::GeneratorConfig;

pub use library::{
    CancelPairTable, Condition, FragmentCollection, FragmentLibrary, Placement, PromptSet,
    TierPath,
};

pub use prompt::{compose, CompositionResult, PromptComposer, SanitizerConfig};

pub use seed::SeedPolicy;

pub use backend::{GenerationBackend, Txt2ImgRequest, Txt2ImgResponse, WebUiBackend};

pub use generator::{GenerateOptions, GenerationSummary, Generator};

pub use testing::MockBackend;
