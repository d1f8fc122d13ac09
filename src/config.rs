//! Configuration management for promptloom.
//!
//! Settings live in `<project>/settings.json`. Every field is optional; a
//! missing file yields [`GeneratorConfig::default`]. CLI flags override
//! individual fields after loading.

pub mod validation;

pub use validation::{LibraryValidator, TierReport, ValidationReport};

use crate::backend::Txt2ImgRequest;
use crate::error::{LoomError, Result};
use crate::prompt::SanitizerConfig;
use crate::retry::RetryPolicy;
use crate::seed::SeedPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file name inside the project directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of the image service.
    #[serde(default = "default_url")]
    pub url: String,

    /// Model checkpoint to request, if any.
    #[serde(default)]
    pub checkpoint: Option<String>,

    /// Fragment library root, relative to the project directory.
    #[serde(default = "default_prompts_dir", rename = "promptsDir")]
    pub prompts_dir: PathBuf,

    /// Output root, relative to the project directory.
    #[serde(default = "default_output_dir", rename = "outputDir")]
    pub output_dir: PathBuf,

    /// Number of original images to generate.
    #[serde(default = "default_batch_count", rename = "batchCount")]
    pub batch_count: u32,

    /// Variants generated per original image.
    #[serde(default, rename = "anotherVersionCount")]
    pub another_version_count: u32,

    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_cfg_scale", rename = "cfgScale")]
    pub cfg_scale: f64,

    #[serde(default = "default_sampler_name", rename = "samplerName")]
    pub sampler_name: String,

    /// Enable the high-resolution pass.
    #[serde(default, rename = "enableHr")]
    pub enable_hr: bool,

    /// Load `positive_selfie.json` into the positive library.
    #[serde(default)]
    pub selfie: bool,

    /// HTTP timeout for one request, in seconds.
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,

    /// Overrides the library's seed threshold when set.
    #[serde(default, rename = "minSeed")]
    pub min_seed: Option<i64>,

    /// Overrides the seed draw cap when set.
    #[serde(default, rename = "seedAttempts")]
    pub seed_attempts: Option<u32>,

    /// Attempts and backoff for "regenerate until non-empty".
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Length budgets.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

fn default_url() -> String {
    crate::backend::webui::DEFAULT_URL.to_string()
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_batch_count() -> u32 {
    1
}

fn default_steps() -> u32 {
    40
}

fn default_width() -> u32 {
    512
}

fn default_height() -> u32 {
    768
}

fn default_cfg_scale() -> f64 {
    7.0
}

fn default_sampler_name() -> String {
    "DPM++ 2M Karras".to_string()
}

fn default_timeout_secs() -> u64 {
    crate::backend::webui::DEFAULT_TIMEOUT_SECS
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            checkpoint: None,
            prompts_dir: default_prompts_dir(),
            output_dir: default_output_dir(),
            batch_count: default_batch_count(),
            another_version_count: 0,
            steps: default_steps(),
            width: default_width(),
            height: default_height(),
            cfg_scale: default_cfg_scale(),
            sampler_name: default_sampler_name(),
            enable_hr: false,
            selfie: false,
            timeout_secs: default_timeout_secs(),
            min_seed: None,
            seed_attempts: None,
            retry: RetryPolicy::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load settings for a project, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error carrying the path if the file exists
    /// but cannot be read or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                LoomError::config_with_path(format!("{}: {}", SETTINGS_FILE, e), settings_path)
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_FILE)
    }

    /// Absolute prompts root for a project.
    #[must_use]
    pub fn prompts_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.prompts_dir)
    }

    /// Absolute output root for a project.
    #[must_use]
    pub fn output_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.output_dir)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`LoomError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(LoomError::invalid_config("url", "must not be empty"));
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value % 8 != 0 {
                return Err(LoomError::invalid_config(
                    field,
                    format!("{} is not a positive multiple of 8", value),
                ));
            }
        }
        if self.steps == 0 {
            return Err(LoomError::invalid_config("steps", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(LoomError::invalid_config(
                "retry.maxAttempts",
                "must be at least 1",
            ));
        }
        if self.seed_attempts == Some(0) {
            return Err(LoomError::invalid_config("seedAttempts", "must be at least 1"));
        }
        if self.sanitizer.max_fragment_length <= self.sanitizer.ellipsis.chars().count() {
            return Err(LoomError::invalid_config(
                "sanitizer.maxFragmentLength",
                "must be longer than the ellipsis",
            ));
        }
        if self.sanitizer.max_total_length == 0 {
            return Err(LoomError::invalid_config(
                "sanitizer.maxTotalLength",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Apply seed overrides to a library's policy.
    #[must_use]
    pub fn seed_policy(&self, base: SeedPolicy) -> SeedPolicy {
        let mut policy = base;
        if let Some(min) = self.min_seed {
            policy = policy.with_min_acceptable(min);
        }
        if let Some(attempts) = self.seed_attempts {
            policy = policy.with_max_attempts(attempts);
        }
        policy
    }

    /// Request template with every parameter except prompts and seed.
    #[must_use]
    pub fn base_request(&self) -> Txt2ImgRequest {
        Txt2ImgRequest {
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            sampler_name: self.sampler_name.clone(),
            ..Txt2ImgRequest::default()
        }
        .with_size(self.width, self.height)
        .with_hires(self.enable_hr)
        .with_checkpoint(self.checkpoint.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = GeneratorConfig::load(dir.path()).unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.batch_count, 1);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{
                "url": "http://gpu-box:7860",
                "batchCount": 5,
                "anotherVersionCount": 2,
                "enableHr": true,
                "minSeed": 1000,
                "retry": {"maxAttempts": 4},
                "sanitizer": {"maxTotalLength": 300}
            }"#,
        )
        .unwrap();

        let config = GeneratorConfig::load(dir.path()).unwrap();
        assert_eq!(config.url, "http://gpu-box:7860");
        assert_eq!(config.batch_count, 5);
        assert_eq!(config.another_version_count, 2);
        assert!(config.enable_hr);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.sanitizer.max_total_length, 300);
        assert_eq!(config.sanitizer.max_fragment_length, 200);
        assert_eq!(config.width, 512);
    }

    #[test]
    fn test_malformed_settings_reports_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();
        let err = GeneratorConfig::load(dir.path()).unwrap_err();
        assert!(err.is_config_defect());
        assert!(matches!(err, LoomError::Config { path: Some(_), .. }));
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let config = GeneratorConfig {
            width: 500,
            ..GeneratorConfig::default()
        };
        match config.validate() {
            Err(LoomError::InvalidConfig { field, .. }) => assert_eq!(field, "width"),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_seed_policy_overrides() {
        let config = GeneratorConfig {
            min_seed: Some(50),
            seed_attempts: Some(9),
            ..GeneratorConfig::default()
        };
        let policy = config.seed_policy(SeedPolicy::new([1], 0));
        assert_eq!(policy.min_acceptable, 50);
        assert_eq!(policy.max_attempts, 9);
        assert!(policy.denylist.contains(&1));
    }

    #[test]
    fn test_base_request_uses_settings() {
        let config = GeneratorConfig {
            width: 768,
            enable_hr: true,
            checkpoint: Some("model.safetensors".to_string()),
            ..GeneratorConfig::default()
        };
        let request = config.base_request();
        assert_eq!(request.width, 768);
        assert!(request.enable_hr);
        assert_eq!(request.seed, -1);
        assert!(request.override_settings.is_some());
    }
}
