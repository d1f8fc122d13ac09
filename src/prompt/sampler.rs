//! Weighted sampler: picks a random count of distinct fragments from one
//! collection.

use crate::error::Result;
use crate::library::FragmentCollection;
use rand::seq::SliceRandom;
use rand::Rng;

/// Inclusive bounds the sampler draws the fragment count from.
///
/// Both ends are clamped to the number of available fragments, so a
/// collection whose `max_count` exceeds its size simply yields everything.
#[must_use]
pub fn count_bounds(collection: &FragmentCollection) -> (usize, usize) {
    let upper = collection.max_count.min(collection.fragments.len());
    let lower = collection.min_count.min(upper);
    (lower, upper)
}

/// Sample fragments from `collection` without replacement.
///
/// The count is uniform in [`count_bounds`]; the chosen fragments come back
/// in random order. A count of zero yields an empty selection.
///
/// # Errors
///
/// Returns [`crate::LoomError::InvalidRange`] if the collection declares
/// `min_count > max_count`.
pub fn sample<R: Rng>(collection: &FragmentCollection, rng: &mut R) -> Result<Vec<String>> {
    collection.validate_range()?;

    let (lower, upper) = count_bounds(collection);
    let count = rng.gen_range(lower..=upper);
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut pool: Vec<&String> = collection.fragments.iter().collect();
    let (chosen, _) = pool.partial_shuffle(rng, count);
    Ok(chosen.iter().map(|fragment| (*fragment).clone()).collect())
}
