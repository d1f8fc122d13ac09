//! Artifact persistence.
//!
//! Images are grouped per generation batch:
//!
//! ```text
//! <output>/<style>/<category>/<subcategory>/<YYYYMMDD-HH>-<seed>/
//! ├── 00000-<seed>.png
//! ├── 00000-<seed>.json
//! ├── 00001-<seed>.png
//! └── 00001-<seed>.json
//! ```
//!
//! Image 0 is the original; 1..N are "another version" images that share the
//! seed and base selection.

use crate::backend::Txt2ImgRequest;
use crate::error::Result;
use crate::library::TierPath;
use crate::prompt::{ConflictRemoval, Selection};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Collections sampled for one image, kept per library.
///
/// The two libraries may use the same collection names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedFragments {
    pub positive: Selection,
    pub negative: Selection,
}

/// Companion metadata written next to each image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Identifier shared by every image of one generator run.
    pub run_id: Uuid,
    pub seed: i64,
    pub image_number: u32,
    pub positive_prompt: String,
    pub negative_prompt: String,
    /// Positive selection followed by the negative selection.
    pub selected: SelectedFragments,
    pub removed_by_conflict: Vec<ConflictRemoval>,
    /// Request parameters, prompts included.
    pub parameters: Txt2ImgRequest,
    pub created_at: DateTime<Local>,
}

/// Paths written for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Writes images and metadata under an output root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. Nothing is created until the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for the batch started at `started` with `seed`.
    #[must_use]
    pub fn batch_folder(&self, tier: &TierPath, started: DateTime<Local>, seed: i64) -> PathBuf {
        self.root
            .join(tier.relative())
            .join(format!("{}-{}", started.format("%Y%m%d-%H"), seed))
    }

    /// File stem for an image.
    #[must_use]
    pub fn file_stem(image_number: u32, seed: i64) -> String {
        format!("{:05}-{}", image_number, seed)
    }

    /// Write the PNG bytes and metadata JSON into `folder`.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn save(
        &self,
        folder: &Path,
        png: &[u8],
        metadata: &ImageMetadata,
    ) -> Result<SavedArtifact> {
        fs::create_dir_all(folder)?;
        let stem = Self::file_stem(metadata.image_number, metadata.seed);
        let image_path = folder.join(format!("{}.png", stem));
        let metadata_path = folder.join(format!("{}.json", stem));

        fs::write(&image_path, png)?;
        fs::write(&metadata_path, serde_json::to_string_pretty(metadata)?)?;
        debug!("Saved {}", image_path.display());

        Ok(SavedArtifact {
            image_path,
            metadata_path,
        })
    }
}
