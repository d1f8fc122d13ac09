//! Two-pass conditional inclusion.
//!
//! Pass 1 samples every unconditional collection. Pass 2 samples a
//! conditional collection only if a fragment chosen in pass 1 from its
//! `depends_on` collection contains one of its trigger strings. Conditions
//! can therefore only look at unconditional collections, which the library
//! enforces at load time, so no dependency graph is needed.

use crate::error::Result;
use crate::library::FragmentLibrary;
use crate::prompt::sampler;
use indexmap::IndexMap;
use rand::Rng;
use tracing::debug;

/// Per-collection selections in library declaration order.
pub type Selection = IndexMap<String, Vec<String>>;

/// Resolves which collections contribute to a composition and samples them.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalResolver<'a> {
    library: &'a FragmentLibrary,
    pinned: Option<&'a Selection>,
}

impl<'a> ConditionalResolver<'a> {
    /// Create a resolver over `library`.
    #[must_use]
    pub fn new(library: &'a FragmentLibrary) -> Self {
        Self {
            library,
            pinned: None,
        }
    }

    /// Reuse these selections verbatim instead of sampling the named
    /// collections. Used when generating another version of an image.
    #[must_use]
    pub fn with_pinned(mut self, pinned: &'a Selection) -> Self {
        self.pinned = Some(pinned);
        self
    }

    fn pick<R: Rng>(&self, name: &str, rng: &mut R) -> Result<Vec<String>> {
        if let Some(previous) = self.pinned.and_then(|p| p.get(name)) {
            return Ok(previous.clone());
        }
        match self.library.get(name) {
            Some(collection) => sampler::sample(collection, rng),
            None => Ok(Vec::new()),
        }
    }

    /// Run both passes.
    ///
    /// Unconditional collections always appear in the result, possibly with
    /// an empty list. Conditional collections appear only when activated.
    ///
    /// # Errors
    ///
    /// Propagates sampler range errors.
    pub fn resolve<R: Rng>(&self, rng: &mut R) -> Result<Selection> {
        let mut first_pass = Selection::new();
        for collection in self.library.iter().filter(|c| !c.is_conditional()) {
            let picked = self.pick(&collection.name, rng)?;
            first_pass.insert(collection.name.clone(), picked);
        }

        let mut second_pass = Selection::new();
        for collection in self.library.iter() {
            let Some(condition) = &collection.condition else {
                continue;
            };
            let source = first_pass
                .get(&condition.depends_on)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if condition.is_satisfied_by(source) {
                debug!(
                    "Condition on '{}' satisfied by '{}'",
                    collection.name, condition.depends_on
                );
                let picked = self.pick(&collection.name, rng)?;
                second_pass.insert(collection.name.clone(), picked);
            }
        }

        let mut selection = Selection::with_capacity(first_pass.len() + second_pass.len());
        for name in self.library.names() {
            if let Some(picked) = first_pass
                .shift_remove(name)
                .or_else(|| second_pass.shift_remove(name))
            {
                selection.insert(name.to_string(), picked);
            }
        }
        Ok(selection)
    }
}
