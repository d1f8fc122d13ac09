//! Mock generation backend.
//!
//! Provides a controllable test double for [`GenerationBackend`], enabling
//! deterministic generator tests without an image service.

use crate::backend::{GenerationBackend, Txt2ImgRequest, Txt2ImgResponse};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// PNG file signature, used as the default fake image.
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Mock implementation of [`GenerationBackend`].
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockBackend::new()
///     .with_seed(1234)
///     .with_empty_responses(2);
///
/// // The first two calls return no images, the third succeeds.
/// ```
#[derive(Debug)]
pub struct MockBackend {
    seed: Option<i64>,
    error: Option<String>,
    empty_responses: u32,
    image: Vec<u8>,
    images_per_call: usize,
    call_count: AtomicU32,
    requests: Mutex<Vec<Txt2ImgRequest>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            seed: None,
            error: None,
            empty_responses: 0,
            image: PNG_SIGNATURE.to_vec(),
            images_per_call: 1,
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockBackend {
    /// Create a new mock with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this seed instead of echoing the requested one.
    #[must_use]
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Configure the mock to return an error.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Return no images for the first `count` calls.
    #[must_use]
    pub fn with_empty_responses(mut self, count: u32) -> Self {
        self.empty_responses = count;
        self
    }

    /// Bytes returned for every image.
    #[must_use]
    pub fn with_image(mut self, bytes: &[u8]) -> Self {
        self.image = bytes.to_vec();
        self
    }

    /// Get the number of times txt2img was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Txt2ImgRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<Txt2ImgResponse> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(ref error) = self.error {
            bail!("{}", error);
        }

        let seed = self.seed.unwrap_or(request.seed);
        if call <= self.empty_responses {
            return Ok(Txt2ImgResponse {
                images: Vec::new(),
                seed: Some(seed),
                info: String::new(),
            });
        }

        Ok(Txt2ImgResponse {
            images: vec![self.image.clone(); self.images_per_call],
            seed: Some(seed),
            info: format!("{}\nSteps: {}, Seed: {}", request.prompt, request.steps, seed),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
