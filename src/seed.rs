//! Seed acceptance filter.
//!
//! A candidate seed is drawn uniformly from the backend's seed space and
//! redrawn while it is denylisted or at or below the minimum acceptable value.
//! The loop is bounded by [`SeedPolicy::max_attempts`]; running out of
//! attempts is reported as [`LoomError::SeedExhaustion`].
//!
//! The threshold itself carries no derived meaning here. It is configuration
//! supplied by whoever curates the library (`cancel_seeds.json` or
//! `settings.json`).

use crate::error::{LoomError, Result};
use crate::retry::retry;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Largest seed the backend accepts (seeds are unsigned 32-bit).
pub const SEED_SPACE_MAX: i64 = u32::MAX as i64;

/// Default lower bound; seeds `<=` this value are rejected.
pub const DEFAULT_MIN_ACCEPTABLE_SEED: i64 = 0;

/// Default cap on redraws before giving up.
pub const DEFAULT_SEED_ATTEMPTS: u32 = 64;

/// Denylist and threshold for generated seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Seeds that are never used.
    #[serde(default, rename = "Seeds")]
    pub denylist: BTreeSet<i64>,

    /// Seeds `<=` this value are rejected.
    #[serde(default = "default_min_acceptable", rename = "MinSeed")]
    pub min_acceptable: i64,

    /// Maximum number of draws before [`LoomError::SeedExhaustion`].
    #[serde(default = "default_max_attempts", rename = "MaxAttempts")]
    pub max_attempts: u32,
}

fn default_min_acceptable() -> i64 {
    DEFAULT_MIN_ACCEPTABLE_SEED
}

fn default_max_attempts() -> u32 {
    DEFAULT_SEED_ATTEMPTS
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            denylist: BTreeSet::new(),
            min_acceptable: default_min_acceptable(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// State of a candidate seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedState {
    /// Rejected; a new candidate must be drawn.
    Candidate(i64),
    /// Usable for a generation request.
    Accepted(i64),
}

impl SeedPolicy {
    /// Create a policy with an explicit denylist and threshold.
    pub fn new(denylist: impl IntoIterator<Item = i64>, min_acceptable: i64) -> Self {
        Self {
            denylist: denylist.into_iter().collect(),
            min_acceptable,
            max_attempts: default_max_attempts(),
        }
    }

    /// Policy that accepts every seed in the seed space.
    #[must_use]
    pub fn permissive() -> Self {
        Self::new([], -1)
    }

    /// Parse a `cancel_seeds.json` document.
    ///
    /// # Errors
    ///
    /// Returns a JSON error on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Override the minimum acceptable seed.
    #[must_use]
    pub fn with_min_acceptable(mut self, min_acceptable: i64) -> Self {
        self.min_acceptable = min_acceptable;
        self
    }

    /// Override the draw cap.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether `seed` may be used.
    #[must_use]
    pub fn accepts(&self, seed: i64) -> bool {
        !self.denylist.contains(&seed) && seed > self.min_acceptable
    }

    /// Classify a candidate.
    #[must_use]
    pub fn evaluate(&self, seed: i64) -> SeedState {
        if self.accepts(seed) {
            SeedState::Accepted(seed)
        } else {
            SeedState::Candidate(seed)
        }
    }

    /// Draw seeds until one is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`LoomError::SeedExhaustion`] after `max_attempts` rejections.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Result<i64> {
        let outcome = retry(
            self.max_attempts,
            |attempt| {
                let candidate = rng.gen_range(0..=SEED_SPACE_MAX);
                let state = self.evaluate(candidate);
                if let SeedState::Candidate(rejected) = state {
                    debug!("Seed {} rejected (attempt {})", rejected, attempt);
                }
                state
            },
            |state| matches!(state, SeedState::Accepted(_)),
        );

        outcome
            .into_result(|attempts, last| LoomError::SeedExhaustion {
                attempts,
                last: match last {
                    Some(SeedState::Candidate(seed) | SeedState::Accepted(seed)) => seed,
                    None => -1,
                },
            })
            .map(|state| match state {
                SeedState::Accepted(seed) | SeedState::Candidate(seed) => seed,
            })
    }
}
