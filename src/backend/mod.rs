//! Image generation backend abstraction.
//!
//! The [`GenerationBackend`] trait is the seam between prompt composition and
//! the HTTP image service. [`WebUiBackend`] talks to a Stable Diffusion WebUI
//! style API; tests use [`crate::testing::MockBackend`].
//!
//! # Example
//!
//! ```rust,ignore
//! use promptloom::backend::{GenerationBackend, Txt2ImgRequest, WebUiBackend};
//!
//! let backend = WebUiBackend::new("http://127.0.0.1:7860")?;
//! let request = Txt2ImgRequest::new("1girl, smile", "lowres").with_seed(12345);
//! let response = backend.txt2img(&request).await?;
//! println!("{} image(s), seed {:?}", response.images.len(), response.seed);
//! ```

pub mod webui;

pub use webui::WebUiBackend;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SEED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Seed:\s*(\d+)").expect("valid seed regex"));

/// Text-to-image service.
///
/// Implementations must be `Send + Sync` so a generator can hold them as
/// `Box<dyn GenerationBackend>`.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate images for one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable, answers with a
    /// non-success status, or the response cannot be decoded.
    async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<Txt2ImgResponse>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: GenerationBackend + ?Sized> GenerationBackend for std::sync::Arc<T> {
    async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<Txt2ImgResponse> {
        (**self).txt2img(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Request
// ============================================================================

/// JSON payload for `/sdapi/v1/txt2img`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txt2ImgRequest {
    pub prompt: String,
    pub negative_prompt: String,
    /// `-1` lets the service choose.
    pub seed: i64,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f64,
    pub batch_size: u32,
    pub n_iter: u32,
    pub sampler_name: String,
    pub enable_hr: bool,
    pub hr_scale: f64,
    pub hr_upscaler: String,
    pub denoising_strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<OverrideSettings>,
}

/// Per-request service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSettings {
    pub sd_model_checkpoint: String,
}

impl Default for Txt2ImgRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            seed: -1,
            steps: 40,
            width: 512,
            height: 768,
            cfg_scale: 7.0,
            batch_size: 1,
            n_iter: 1,
            sampler_name: "DPM++ 2M Karras".to_string(),
            enable_hr: false,
            hr_scale: 2.0,
            hr_upscaler: "4x-UltraSharp".to_string(),
            denoising_strength: 0.3,
            override_settings: None,
        }
    }
}

impl Txt2ImgRequest {
    /// Request with default parameters for the given prompts.
    pub fn new(prompt: impl Into<String>, negative_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: negative_prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_hires(mut self, enable_hr: bool) -> Self {
        self.enable_hr = enable_hr;
        self
    }

    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: Option<&str>) -> Self {
        self.override_settings = checkpoint.map(|name| OverrideSettings {
            sd_model_checkpoint: name.to_string(),
        });
        self
    }
}

// ============================================================================
// Response
// ============================================================================

/// Decoded service response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txt2ImgResponse {
    /// PNG bytes, one per generated image.
    pub images: Vec<Vec<u8>>,
    /// Seed the service reports having used.
    pub seed: Option<i64>,
    /// Raw generation info text.
    pub info: String,
}

impl Txt2ImgResponse {
    /// Whether the service produced no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Extract the seed from a generation info string.
///
/// The WebUI returns `info` as a JSON document with a `"seed"` field; older
/// builds and PNG metadata use a `Seed: N` text form instead.
#[must_use]
pub fn parse_seed(info: &str) -> Option<i64> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(info) {
        if let Some(seed) = value.get("seed").and_then(serde_json::Value::as_i64) {
            return Some(seed);
        }
        if let Some(text) = value.get("infotexts").and_then(|t| t.get(0)).and_then(|t| t.as_str())
        {
            return parse_seed_text(text);
        }
    }
    parse_seed_text(info)
}

fn parse_seed_text(text: &str) -> Option<i64> {
    SEED_TEXT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = Txt2ImgRequest::new("p", "n");
        assert_eq!(request.seed, -1);
        assert_eq!(request.steps, 40);
        assert_eq!((request.width, request.height), (512, 768));
        assert_eq!(request.sampler_name, "DPM++ 2M Karras");
        assert!(!request.enable_hr);
        assert_eq!(request.hr_upscaler, "4x-UltraSharp");
    }

    #[test]
    fn test_request_serializes_override_only_when_set() {
        let plain = serde_json::to_value(Txt2ImgRequest::new("p", "n")).unwrap();
        assert!(plain.get("override_settings").is_none());

        let with = serde_json::to_value(
            Txt2ImgRequest::new("p", "n").with_checkpoint(Some("model.safetensors")),
        )
        .unwrap();
        assert_eq!(
            with["override_settings"]["sd_model_checkpoint"],
            "model.safetensors"
        );
    }

    #[test]
    fn test_parse_seed_from_json_info() {
        assert_eq!(parse_seed(r#"{"seed": 1234, "prompt": "x"}"#), Some(1234));
    }

    #[test]
    fn test_parse_seed_from_infotexts() {
        let info = r#"{"infotexts": ["x\nSteps: 40, Seed: 987, Size: 512x768"]}"#;
        assert_eq!(parse_seed(info), Some(987));
    }

    #[test]
    fn test_parse_seed_from_text() {
        assert_eq!(parse_seed("Steps: 40, Seed:  42, Size: 512x768"), Some(42));
        assert_eq!(parse_seed("no seed here"), None);
    }
}
