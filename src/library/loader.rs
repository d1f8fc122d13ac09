//! Prompt set loading across directory tiers.
//!
//! Library files live under a prompts root, optionally specialised per
//! style, category and subcategory:
//!
//! ```text
//! prompts/
//! ├── negative.json
//! └── anime/
//!     ├── positive_cancel_pair.json
//!     └── portrait/
//!         ├── positive_base.json
//!         └── close_up/
//!             └── positive_pose.json
//! ```
//!
//! Each file is resolved independently: the most specific directory that
//! contains it wins. Only `positive_base.json` and `negative.json` are
//! required.

use super::{parse_collections, CancelPairTable, FragmentCollection, FragmentLibrary};
use crate::error::{LoomError, Result};
use crate::seed::SeedPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// Library Files
// ============================================================================

/// One of the files a prompt set is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryFile {
    PositivePose,
    PositiveBase,
    PositiveOptional,
    PositiveSelfie,
    Negative,
    CancelPairs,
    CancelSeeds,
}

impl LibraryFile {
    /// All files, in load order.
    pub const ALL: [LibraryFile; 7] = [
        LibraryFile::PositivePose,
        LibraryFile::PositiveBase,
        LibraryFile::PositiveOptional,
        LibraryFile::PositiveSelfie,
        LibraryFile::Negative,
        LibraryFile::CancelPairs,
        LibraryFile::CancelSeeds,
    ];

    /// File name on disk.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::PositivePose => "positive_pose.json",
            Self::PositiveBase => "positive_base.json",
            Self::PositiveOptional => "positive_optional.json",
            Self::PositiveSelfie => "positive_selfie.json",
            Self::Negative => "negative.json",
            Self::CancelPairs => "positive_cancel_pair.json",
            Self::CancelSeeds => "cancel_seeds.json",
        }
    }

    /// Whether loading fails when the file is absent from every tier.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, Self::PositiveBase | Self::Negative)
    }

    /// Whether the file holds collections pinned by "another version".
    #[must_use]
    pub fn is_base(self) -> bool {
        matches!(self, Self::PositiveBase | Self::Negative)
    }
}

impl fmt::Display for LibraryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

// ============================================================================
// Tier Path
// ============================================================================

/// A `style/category/subcategory` location. Empty components are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TierPath {
    pub style: String,
    pub category: String,
    pub subcategory: String,
}

impl TierPath {
    /// Create a tier path.
    pub fn new(
        style: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            style: style.into(),
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }

    fn components(&self) -> Vec<&str> {
        [&self.style, &self.category, &self.subcategory]
            .into_iter()
            .map(String::as_str)
            .take_while(|c| !c.is_empty())
            .collect()
    }

    /// Relative directory of this tier.
    #[must_use]
    pub fn relative(&self) -> PathBuf {
        self.components().iter().collect()
    }

    /// Candidate directories under `root`, most specific first, `root` last.
    #[must_use]
    pub fn candidates(&self, root: &Path) -> Vec<PathBuf> {
        let components = self.components();
        (0..=components.len())
            .rev()
            .map(|depth| {
                let mut dir = root.to_path_buf();
                dir.extend(&components[..depth]);
                dir
            })
            .collect()
    }
}

impl fmt::Display for TierPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components().join("/"))
    }
}

// ============================================================================
// Locator
// ============================================================================

/// Finds library files for one tier.
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    root: PathBuf,
    tier: TierPath,
}

impl LibraryLocator {
    /// Create a locator over `root` (the prompts directory).
    pub fn new(root: impl Into<PathBuf>, tier: TierPath) -> Self {
        Self {
            root: root.into(),
            tier,
        }
    }

    /// The prompts root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The tier being resolved.
    #[must_use]
    pub fn tier(&self) -> &TierPath {
        &self.tier
    }

    /// Most specific existing path for `file`.
    #[must_use]
    pub fn locate(&self, file: LibraryFile) -> Option<PathBuf> {
        self.tier
            .candidates(&self.root)
            .into_iter()
            .map(|dir| dir.join(file.file_name()))
            .find(|path| path.is_file())
    }

    /// Like [`locate`](Self::locate) but fails for a missing file.
    ///
    /// # Errors
    ///
    /// Returns [`LoomError::MissingLibraryFile`] if no tier has the file.
    pub fn require(&self, file: LibraryFile) -> Result<PathBuf> {
        self.locate(file).ok_or_else(|| LoomError::MissingLibraryFile {
            file: file.file_name().to_string(),
            searched: self.root.join(self.tier.relative()),
        })
    }

    fn read(&self, file: LibraryFile) -> Result<Option<(PathBuf, String)>> {
        let path = if file.is_required() {
            Some(self.require(file)?)
        } else {
            self.locate(file)
        };
        match path {
            Some(path) => {
                debug!("Loading {} from {}", file, path.display());
                let content = std::fs::read_to_string(&path)?;
                Ok(Some((path, content)))
            }
            None => Ok(None),
        }
    }

    fn read_collections(&self, file: LibraryFile) -> Result<Vec<FragmentCollection>> {
        match self.read(file)? {
            Some((path, content)) => parse_collections(&content)
                .map_err(|e| LoomError::config_with_path(format!("{}: {}", file, e), path)),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// Prompt Set
// ============================================================================

/// Everything needed to compose prompts for one tier.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Pose, base, optional and (if requested) selfie collections.
    pub positive: FragmentLibrary,
    /// Negative collections.
    pub negative: FragmentLibrary,
    /// Cancel pairs applied to the positive prompt.
    pub cancel_pairs: CancelPairTable,
    /// Seed denylist and threshold.
    pub seed_policy: SeedPolicy,
    /// Tier this set was loaded for.
    pub tier: TierPath,
    base_collections: Vec<String>,
}

impl PromptSet {
    /// Load and validate the prompt set for `tier`.
    ///
    /// # Errors
    ///
    /// Fails on a missing required file, malformed JSON or an invalid
    /// library.
    pub fn load(prompts_root: &Path, tier: &TierPath, selfie: bool) -> Result<Self> {
        let locator = LibraryLocator::new(prompts_root, tier.clone());

        let mut positive = Vec::new();
        let mut base_collections = Vec::new();
        for file in [
            LibraryFile::PositivePose,
            LibraryFile::PositiveBase,
            LibraryFile::PositiveOptional,
            LibraryFile::PositiveSelfie,
        ] {
            if file == LibraryFile::PositiveSelfie && !selfie {
                continue;
            }
            let collections = locator.read_collections(file)?;
            if file.is_base() {
                base_collections.extend(collections.iter().map(|c| c.name.clone()));
            }
            positive.extend(collections);
        }

        let negative = locator.read_collections(LibraryFile::Negative)?;

        let cancel_pairs = match locator.read(LibraryFile::CancelPairs)? {
            Some((path, content)) => CancelPairTable::from_json(&content).map_err(|e| {
                LoomError::config_with_path(format!("{}: {}", LibraryFile::CancelPairs, e), path)
            })?,
            None => CancelPairTable::new(),
        };

        let seed_policy = match locator.read(LibraryFile::CancelSeeds)? {
            Some((path, content)) => SeedPolicy::from_json(&content).map_err(|e| {
                LoomError::config_with_path(format!("{}: {}", LibraryFile::CancelSeeds, e), path)
            })?,
            None => SeedPolicy::default(),
        };

        let set = Self {
            positive: FragmentLibrary::new(positive)?,
            negative: FragmentLibrary::new(negative)?,
            cancel_pairs,
            seed_policy,
            tier: tier.clone(),
            base_collections,
        };
        info!(
            "Loaded prompt set '{}': {} positive, {} negative collections, {} cancel pairs",
            tier,
            set.positive.len(),
            set.negative.len(),
            set.cancel_pairs.len()
        );
        Ok(set)
    }

    /// Names of the positive collections that "another version" reuses.
    ///
    /// Negative collections are never listed here.
    pub fn base_collections(&self) -> impl Iterator<Item = &str> {
        self.base_collections.iter().map(String::as_str)
    }
}
