//! Batch generation driver.
//!
//! For each batch the generator composes a positive and a negative prompt,
//! asks the backend for an image (retrying while the result is empty),
//! persists it, then produces the configured number of "another version"
//! images. Variants reuse the base collections' selections and the seed, so
//! they show the same subject with a different pose and optional details.

use crate::artifact::{ArtifactStore, ImageMetadata, SavedArtifact, SelectedFragments};
use crate::backend::{GenerationBackend, Txt2ImgRequest, Txt2ImgResponse};
use crate::config::GeneratorConfig;
use crate::error::{IntoLoomError, LoomError, Result};
use crate::library::{PromptSet, TierPath};
use crate::prompt::{compose_negative, CompositionResult, PromptComposer, Sanitizer, Selection};
use crate::retry::retry_async;
use crate::seed::SeedPolicy;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-run options, usually from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub tier: TierPath,
    /// Seed for the composition RNG; entropy when `None`.
    pub rng_seed: Option<u64>,
    /// Compose without calling the backend.
    pub dry_run: bool,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

/// A composed positive/negative pair and the request built from it.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedImage {
    pub image_number: u32,
    pub positive: CompositionResult,
    pub negative: CompositionResult,
    pub request: Txt2ImgRequest,
}

/// What a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationSummary {
    pub run_id: Uuid,
    pub batches: u32,
    /// Every composition, in generation order.
    pub composed: Vec<ComposedImage>,
    /// Files written; empty on a dry run.
    pub saved: Vec<PathBuf>,
}

/// Drives the backend over a loaded prompt set.
pub struct Generator {
    prompts: PromptSet,
    config: GeneratorConfig,
    seed_policy: SeedPolicy,
    sanitizer: Sanitizer,
    backend: Box<dyn GenerationBackend>,
    store: ArtifactStore,
    run_id: Uuid,
}

impl Generator {
    /// Create a generator. Seed overrides from `config` are applied to the
    /// prompt set's policy here.
    pub fn new(
        prompts: PromptSet,
        config: GeneratorConfig,
        backend: Box<dyn GenerationBackend>,
        store: ArtifactStore,
    ) -> Self {
        let seed_policy = config.seed_policy(prompts.seed_policy.clone());
        let sanitizer = Sanitizer::new(config.sanitizer.clone());
        Self {
            prompts,
            config,
            seed_policy,
            sanitizer,
            backend,
            store,
            run_id: Uuid::new_v4(),
        }
    }

    /// Identifier written into every metadata file of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn composer(&self) -> PromptComposer<'_> {
        PromptComposer::new(
            &self.prompts.positive,
            &self.prompts.cancel_pairs,
            &self.seed_policy,
        )
        .with_sanitizer(self.config.sanitizer.clone())
    }

    fn build_request(&self, positive: &CompositionResult, negative: &CompositionResult) -> Txt2ImgRequest {
        let mut request = self.config.base_request();
        request.prompt = positive.assembled_text.clone();
        request.negative_prompt = negative.assembled_text.clone();
        request.seed = positive.seed.unwrap_or(-1);
        request
    }

    async fn request_image(&self, request: &Txt2ImgRequest) -> Result<Txt2ImgResponse> {
        let backend = self.backend.as_ref();
        let outcome = retry_async(
            &self.config.retry,
            move |attempt| {
                debug!("{} request attempt {}", backend.name(), attempt);
                backend.txt2img(request)
            },
            |response| !response.is_empty(),
        )
        .await
        .into_loom_backend()?;

        outcome.into_result(|attempts, _| LoomError::EmptyResult { attempts })
    }

    fn persist(
        &self,
        folder: &std::path::Path,
        image_number: u32,
        seed: i64,
        png: &[u8],
        composed: &ComposedImage,
    ) -> Result<SavedArtifact> {
        let selected = SelectedFragments {
            positive: composed.positive.selected.clone(),
            negative: composed.negative.selected.clone(),
        };
        let metadata = ImageMetadata {
            run_id: self.run_id,
            seed,
            image_number,
            positive_prompt: composed.positive.assembled_text.clone(),
            negative_prompt: composed.negative.assembled_text.clone(),
            selected,
            removed_by_conflict: composed.positive.removed_by_conflict.clone(),
            parameters: composed.request.clone(),
            created_at: Local::now(),
        };
        self.store.save(folder, png, &metadata)
    }

    fn progress_bar(&self, total: u32, visible: bool) -> ProgressBar {
        if !visible {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(u64::from(total));
        if let Ok(style) =
            ProgressStyle::with_template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    }

    /// Run all batches.
    ///
    /// # Errors
    ///
    /// Stops at the first composition, backend or IO error. Images saved
    /// before the error stay on disk.
    pub async fn run(&self, options: &GenerateOptions) -> Result<GenerationSummary> {
        let mut rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let composer = self.composer();
        let base_names: Vec<&str> = self.prompts.base_collections().collect();

        let mut summary = GenerationSummary {
            run_id: self.run_id,
            ..GenerationSummary::default()
        };

        info!(
            "Run {}: {} batch(es), {} variant(s) each{}",
            self.run_id,
            self.config.batch_count,
            self.config.another_version_count,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let bar = self.progress_bar(self.config.batch_count, options.show_progress);
        for batch in 0..self.config.batch_count {
            bar.set_message(format!("batch {}", batch + 1));

            let positive = composer.compose(&mut rng)?;
            let negative = compose_negative(&self.prompts.negative, &self.sanitizer, None, &mut rng)?;
            let request = self.build_request(&positive, &negative);
            let original = ComposedImage {
                image_number: 0,
                positive,
                negative,
                request,
            };

            let pinned = original.positive.pinned(base_names.iter().copied());
            let negative_pinned = original.negative.selected.clone();

            let (seed, folder) = if options.dry_run {
                (original.request.seed, None)
            } else {
                let response = self.request_image(&original.request).await?;
                let seed = response.seed.unwrap_or(original.request.seed);
                if seed != original.request.seed {
                    warn!(
                        "Backend used seed {} instead of requested {}",
                        seed, original.request.seed
                    );
                }
                let folder = self.store.batch_folder(&options.tier, Local::now(), seed);
                if let Some(png) = response.images.first() {
                    let saved = self.persist(&folder, 0, seed, png, &original)?;
                    summary.saved.push(saved.image_path);
                }
                (seed, Some(folder))
            };
            summary.composed.push(original);

            for number in 1..=self.config.another_version_count {
                let variant =
                    self.compose_variant(&composer, &pinned, &negative_pinned, seed, number, &mut rng)?;
                if let Some(folder) = &folder {
                    let response = self.request_image(&variant.request).await?;
                    if let Some(png) = response.images.first() {
                        let saved = self.persist(folder, number, seed, png, &variant)?;
                        summary.saved.push(saved.image_path);
                    }
                }
                summary.composed.push(variant);
            }

            summary.batches += 1;
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "Run {} finished: {} image(s) saved",
            self.run_id,
            summary.saved.len()
        );
        Ok(summary)
    }

    fn compose_variant(
        &self,
        composer: &PromptComposer<'_>,
        pinned: &Selection,
        negative_pinned: &Selection,
        seed: i64,
        image_number: u32,
        rng: &mut StdRng,
    ) -> Result<ComposedImage> {
        let positive = composer.compose_variant(pinned, seed, rng)?;
        let negative =
            compose_negative(&self.prompts.negative, &self.sanitizer, Some(negative_pinned), rng)?;
        let request = self.build_request(&positive, &negative);
        Ok(ComposedImage {
            image_number,
            positive,
            negative,
            request,
        })
    }
}
