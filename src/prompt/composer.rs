//! Composition pipeline.
//!
//! One call draws the seed, samples the library in two passes, places the
//! fragments, resolves cancel pairs, sanitizes and joins. Everything it reads
//! is borrowed and immutable; the random stream is the only moving part, so a
//! fixed RNG seed reproduces the same [`CompositionResult`].

use crate::error::Result;
use crate::library::{CancelPairTable, FragmentLibrary};
use crate::prompt::cancel::{ConflictRemoval, ConflictResolver};
use crate::prompt::conditional::{ConditionalResolver, Selection};
use crate::prompt::placement;
use crate::prompt::sanitizer::{Sanitizer, SanitizerConfig};
use crate::seed::SeedPolicy;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

/// Output of one composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionResult {
    /// Sampled fragments per collection, in declaration order.
    pub selected: Selection,
    /// The final prompt text.
    pub assembled_text: String,
    /// Fragments removed by cancel pairs.
    pub removed_by_conflict: Vec<ConflictRemoval>,
    /// Sanitized fragments that were joined into `assembled_text`.
    pub fragments: Vec<String>,
    /// Accepted seed, if this composition carries one.
    pub seed: Option<i64>,
}

impl CompositionResult {
    /// Selections of the named collections, for pinning a variant.
    #[must_use]
    pub fn pinned<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Selection {
        names
            .into_iter()
            .filter_map(|name| {
                self.selected
                    .get(name)
                    .map(|picked| (name.to_string(), picked.clone()))
            })
            .collect()
    }

    /// Whether the composition produced any text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assembled_text.is_empty()
    }
}

/// Composes prompts from one library.
#[derive(Debug, Clone)]
pub struct PromptComposer<'a> {
    library: &'a FragmentLibrary,
    cancel_pairs: &'a CancelPairTable,
    seed_policy: &'a SeedPolicy,
    sanitizer: Sanitizer,
}

impl<'a> PromptComposer<'a> {
    /// Create a composer with the default sanitizer budgets.
    #[must_use]
    pub fn new(
        library: &'a FragmentLibrary,
        cancel_pairs: &'a CancelPairTable,
        seed_policy: &'a SeedPolicy,
    ) -> Self {
        Self {
            library,
            cancel_pairs,
            seed_policy,
            sanitizer: Sanitizer::default(),
        }
    }

    /// Use a custom sanitizer configuration.
    #[must_use]
    pub fn with_sanitizer(mut self, config: SanitizerConfig) -> Self {
        self.sanitizer = Sanitizer::new(config);
        self
    }

    /// Draw a seed and compose a fresh prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoomError::SeedExhaustion`] if no acceptable seed is
    /// drawn, or a range error from the sampler.
    pub fn compose<R: Rng>(&self, rng: &mut R) -> Result<CompositionResult> {
        let seed = self.seed_policy.draw(rng)?;
        debug!("Accepted seed {}", seed);
        self.run(None, Some(seed), rng)
    }

    /// Compose another version: `pinned` selections are reused verbatim,
    /// everything else is resampled, and `seed` is kept.
    ///
    /// # Errors
    ///
    /// Returns a range error from the sampler.
    pub fn compose_variant<R: Rng>(
        &self,
        pinned: &Selection,
        seed: i64,
        rng: &mut R,
    ) -> Result<CompositionResult> {
        self.run(Some(pinned), Some(seed), rng)
    }

    fn run<R: Rng>(
        &self,
        pinned: Option<&Selection>,
        seed: Option<i64>,
        rng: &mut R,
    ) -> Result<CompositionResult> {
        compose_with(
            self.library,
            self.cancel_pairs,
            &self.sanitizer,
            pinned,
            seed,
            rng,
        )
    }
}

/// Compose a negative prompt: no cancel pairs and no seed.
///
/// # Errors
///
/// Returns a range error from the sampler.
pub fn compose_negative<R: Rng>(
    library: &FragmentLibrary,
    sanitizer: &Sanitizer,
    pinned: Option<&Selection>,
    rng: &mut R,
) -> Result<CompositionResult> {
    compose_with(
        library,
        &CancelPairTable::new(),
        sanitizer,
        pinned,
        None,
        rng,
    )
}

/// Single-call composition with a freshly drawn seed.
///
/// # Errors
///
/// See [`PromptComposer::compose`].
pub fn compose<R: Rng>(
    library: &FragmentLibrary,
    cancel_pairs: &CancelPairTable,
    seed_policy: &SeedPolicy,
    sanitizer: &SanitizerConfig,
    rng: &mut R,
) -> Result<CompositionResult> {
    PromptComposer::new(library, cancel_pairs, seed_policy)
        .with_sanitizer(sanitizer.clone())
        .compose(rng)
}

fn compose_with<R: Rng>(
    library: &FragmentLibrary,
    cancel_pairs: &CancelPairTable,
    sanitizer: &Sanitizer,
    pinned: Option<&Selection>,
    seed: Option<i64>,
    rng: &mut R,
) -> Result<CompositionResult> {
    let resolver = match pinned {
        Some(pinned) => ConditionalResolver::new(library).with_pinned(pinned),
        None => ConditionalResolver::new(library),
    };
    let selected = resolver.resolve(rng)?;

    let placed = placement::assemble(library, &selected);
    let (kept, removed_by_conflict) = ConflictResolver::new(cancel_pairs).resolve(placed);
    let fragments = sanitizer.sanitize(kept);
    let assembled_text = placement::join(&fragments);

    Ok(CompositionResult {
        selected,
        assembled_text,
        removed_by_conflict,
        fragments,
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Condition, FragmentCollection, Placement};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn portrait_library() -> FragmentLibrary {
        FragmentLibrary::new(vec![
            FragmentCollection::new("Pose", ["selfie", "standing"], 1, 1)
                .with_placement(Placement::Start),
            FragmentCollection::new(
                "Base",
                ["(looking at viewer:1.4)", "smile", "red dragon", "red hair"],
                2,
                4,
            ),
            FragmentCollection::new("Rider", ["dragon rider"], 1, 1)
                .with_condition(Condition::new("Base", ["dragon"])),
            FragmentCollection::new("Quality", ["masterpiece"], 1, 1)
                .with_placement(Placement::End),
        ])
        .unwrap()
    }

    fn selfie_table() -> CancelPairTable {
        CancelPairTable::new().with_pair("selfie", ["looking at viewer"])
    }

    #[test]
    fn test_compose_is_reproducible() {
        let library = portrait_library();
        let table = selfie_table();
        let policy = SeedPolicy::default();
        let composer = PromptComposer::new(&library, &table, &policy);

        let a = composer.compose(&mut StdRng::seed_from_u64(11)).unwrap();
        let b = composer.compose(&mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert!(a.seed.is_some_and(|s| policy.accepts(s)));
    }

    #[test]
    fn test_selfie_never_keeps_viewer_fragment() {
        let library = portrait_library();
        let table = selfie_table();
        let policy = SeedPolicy::default();
        let composer = PromptComposer::new(&library, &table, &policy);

        for seed in 0..100 {
            let result = composer.compose(&mut StdRng::seed_from_u64(seed)).unwrap();
            if result.fragments.iter().any(|f| f == "selfie") {
                assert!(!result.assembled_text.contains("looking at viewer"));
            }
            for removal in &result.removed_by_conflict {
                assert_eq!(removal.trigger, "selfie");
                assert_eq!(removal.removed, "(looking at viewer:1.4)");
            }
        }
    }

    #[test]
    fn test_placement_and_gating_in_output() {
        let library = portrait_library();
        let table = CancelPairTable::new();
        let policy = SeedPolicy::default();
        let composer = PromptComposer::new(&library, &table, &policy);

        for seed in 0..100 {
            let result = composer.compose(&mut StdRng::seed_from_u64(seed)).unwrap();
            let first = result.fragments.first().unwrap();
            assert!(first == "selfie" || first == "standing");
            assert_eq!(result.fragments.last().unwrap(), "masterpiece");

            let has_dragon = result.selected["Base"].iter().any(|f| f.contains("dragon"));
            assert_eq!(result.selected.contains_key("Rider"), has_dragon);

            let unique: HashSet<_> = result.fragments.iter().collect();
            assert_eq!(unique.len(), result.fragments.len());
        }
    }

    #[test]
    fn test_length_budget_holds() {
        let library = FragmentLibrary::new(vec![FragmentCollection::new(
            "Many",
            (0..60).map(|i| format!("descriptive fragment number {}", i)),
            30,
            60,
        )])
        .unwrap();
        let table = CancelPairTable::new();
        let policy = SeedPolicy::default();
        let config = SanitizerConfig::default().with_max_total_length(120);
        let composer = PromptComposer::new(&library, &table, &policy).with_sanitizer(config);

        for seed in 0..20 {
            let result = composer.compose(&mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(result.assembled_text.chars().count() <= 120);
            assert!(!result.is_empty());
        }
    }

    #[test]
    fn test_variant_keeps_pinned_base_and_seed() {
        let library = portrait_library();
        let table = CancelPairTable::new();
        let policy = SeedPolicy::default();
        let composer = PromptComposer::new(&library, &table, &policy);

        let original = composer.compose(&mut StdRng::seed_from_u64(3)).unwrap();
        let pinned = original.pinned(["Base"]);
        let seed = original.seed.unwrap();

        for rng_seed in 0..10 {
            let variant = composer
                .compose_variant(&pinned, seed, &mut StdRng::seed_from_u64(rng_seed))
                .unwrap();
            assert_eq!(variant.seed, Some(seed));
            assert_eq!(variant.selected["Base"], original.selected["Base"]);
        }
    }

    #[test]
    fn test_negative_has_no_seed() {
        let library = FragmentLibrary::new(vec![FragmentCollection::new(
            "Negative",
            ["blurry", "lowres"],
            2,
            2,
        )])
        .unwrap();
        let result =
            compose_negative(&library, &Sanitizer::default(), None, &mut StdRng::seed_from_u64(1))
                .unwrap();
        assert_eq!(result.seed, None);
        assert_eq!(result.fragments.len(), 2);
        assert!(result.removed_by_conflict.is_empty());
    }

    #[test]
    fn test_free_compose_matches_composer() {
        let library = portrait_library();
        let table = selfie_table();
        let policy = SeedPolicy::default();
        let config = SanitizerConfig::default();

        let a = compose(&library, &table, &policy, &config, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = PromptComposer::new(&library, &table, &policy)
            .compose(&mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a, b);
    }
}
