//! Test fixtures for creating reproducible prompt trees.

use crate::library::{PromptSet, TierPath};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project with a `prompts/` tree.
///
/// Automatically cleans up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = LibraryFixture::portrait();
/// let set = fixture.load(false);
/// assert!(set.positive.get("Base").is_some());
/// ```
pub struct LibraryFixture {
    temp_dir: TempDir,
}

impl LibraryFixture {
    /// Empty project.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// A complete `anime/portrait/close_up` tier with every file type.
    ///
    /// # Panics
    ///
    /// Panics if file creation fails.
    #[must_use]
    pub fn portrait() -> Self {
        let fixture = Self::empty();
        fixture.write("prompts/negative.json", Self::negative_content());
        fixture.write("prompts/anime/positive_pose.json", Self::pose_content());
        fixture.write("prompts/anime/portrait/positive_base.json", Self::base_content());
        fixture.write(
            "prompts/anime/portrait/close_up/positive_optional.json",
            Self::optional_content(),
        );
        fixture.write("prompts/positive_selfie.json", Self::selfie_content());
        fixture.write(
            "prompts/anime/positive_cancel_pair.json",
            r#"{"selfie": ["looking at viewer"]}"#,
        );
        fixture.write("prompts/cancel_seeds.json", r#"{"Seeds": [42]}"#);
        fixture
    }

    /// Project directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `prompts/` under the project.
    #[must_use]
    pub fn prompts_dir(&self) -> PathBuf {
        self.path().join("prompts")
    }

    /// `output/` under the project (not created).
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    /// The tier written by [`portrait`](Self::portrait).
    #[must_use]
    pub fn tier(&self) -> TierPath {
        TierPath::new("anime", "portrait", "close_up")
    }

    /// Write a file relative to the project, creating parents.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        std::fs::write(&path, content).expect("Failed to write fixture file");
    }

    /// Load the fixture tier.
    ///
    /// # Panics
    ///
    /// Panics if the fixture does not load.
    #[must_use]
    pub fn load(&self, selfie: bool) -> PromptSet {
        PromptSet::load(&self.prompts_dir(), &self.tier(), selfie).expect("fixture should load")
    }

    fn pose_content() -> &'static str {
        r#"{
    "Pose": {
        "prompts": ["standing", "sitting", "selfie"],
        "use_min_prompts": 1,
        "use_max_prompts": 1,
        "position": "start"
    }
}"#
    }

    fn base_content() -> &'static str {
        r#"{
    "Base": {
        "prompts": ["1girl", "red dragon", "(looking at viewer:1.4)", "smile", "long hair"],
        "use_min_prompts": 2,
        "use_max_prompts": 4
    },
    "Quality": {
        "prompts": ["masterpiece", "best quality"],
        "use_min_prompts": 1,
        "use_max_prompts": 2,
        "position": "end"
    }
}"#
    }

    fn optional_content() -> &'static str {
        r#"{
    "Rider": {
        "prompts": ["dragon rider", "saddle"],
        "use_min_prompts": 1,
        "use_max_prompts": 2,
        "condition": {"depends_on": "Base", "must_contain_any": ["dragon"]}
    },
    "Background": {
        "prompts": ["in a park", "on a beach", "night sky"],
        "use_min_prompts": 0,
        "use_max_prompts": 1
    }
}"#
    }

    fn selfie_content() -> &'static str {
        r#"{
    "Selfie": {
        "prompts": ["holding phone"],
        "use_min_prompts": 1,
        "use_max_prompts": 1
    }
}"#
    }

    fn negative_content() -> &'static str {
        r#"{
    "Negative": {
        "prompts": ["lowres", "bad anatomy", "blurry"],
        "use_min_prompts": 2,
        "use_max_prompts": 3
    }
}"#
    }
}
