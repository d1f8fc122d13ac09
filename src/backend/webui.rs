//! Stable Diffusion WebUI HTTP backend.

use super::{parse_seed, GenerationBackend, Txt2ImgRequest, Txt2ImgResponse};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Default service address.
pub const DEFAULT_URL: &str = "http://127.0.0.1:7860";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
const PNG_INFO_PATH: &str = "/sdapi/v1/png-info";

#[derive(Debug, Deserialize)]
struct RawTxt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPngInfoResponse {
    #[serde(default)]
    info: Option<String>,
}

/// Client for `/sdapi/v1/txt2img`.
#[derive(Debug, Clone)]
pub struct WebUiBackend {
    client: Client,
    base_url: String,
}

impl WebUiBackend {
    /// Create a backend with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a backend with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Service base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn png_info(&self, encoded: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint(PNG_INFO_PATH))
            .json(&json!({ "image": format!("data:image/png;base64,{}", encoded) }))
            .send()
            .await
            .context("png-info request failed")?
            .error_for_status()?;
        let raw: RawPngInfoResponse = response.json().await?;
        Ok(raw.info.unwrap_or_default())
    }
}

/// Decode a base64 image, tolerating a `data:` URL prefix.
///
/// # Errors
///
/// Returns an error if the payload is not valid base64.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once("base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    general_purpose::STANDARD
        .decode(payload.trim())
        .context("Invalid base64 image data")
}

#[async_trait]
impl GenerationBackend for WebUiBackend {
    async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<Txt2ImgResponse> {
        let url = self.endpoint(TXT2IMG_PATH);
        debug!(
            "POST {} (seed {}, {} chars prompt)",
            url,
            request.seed,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("txt2img returned {}: {}", status, body));
        }

        let raw: RawTxt2ImgResponse = response
            .json()
            .await
            .context("Malformed txt2img response")?;

        let mut info = raw.info.unwrap_or_default();
        let mut seed = parse_seed(&info);
        if seed.is_none() {
            if let Some(first) = raw.images.first() {
                match self.png_info(first).await {
                    Ok(text) => {
                        seed = parse_seed(&text);
                        info = text;
                    }
                    Err(e) => warn!("Could not read PNG info: {:#}", e),
                }
            }
        }

        let images = raw
            .images
            .iter()
            .map(|encoded| decode_image(encoded))
            .collect::<Result<Vec<_>>>()?;

        Ok(Txt2ImgResponse { images, seed, info })
    }

    fn name(&self) -> &str {
        "webui"
    }
}
