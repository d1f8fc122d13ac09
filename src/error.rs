//! Custom error types for promptloom.
//!
//! Configuration defects in a fragment library are fatal and surface
//! immediately. Runtime conditions that the pipeline can retry (seed
//! rejection, empty backend results) have their own variants so callers can
//! tell exhaustion apart from everything else.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for promptloom operations
#[derive(Error, Debug)]
pub enum LoomError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Required library file not found in any directory tier
    #[error("Missing library file: {file} (searched from {searched})")]
    MissingLibraryFile { file: String, searched: PathBuf },

    // =========================================================================
    // Fragment Library Defects
    // =========================================================================
    /// A collection declares `min_count > max_count`
    #[error("Collection '{collection}' has invalid range: min {min} > max {max}")]
    InvalidRange {
        collection: String,
        min: usize,
        max: usize,
    },

    /// A condition references a collection that does not exist
    #[error("Collection '{collection}' depends on unknown collection '{depends_on}'")]
    UnknownDependency {
        collection: String,
        depends_on: String,
    },

    /// A condition references another conditional collection
    #[error("Collection '{collection}' depends on conditional collection '{depends_on}'")]
    ConditionalDependency {
        collection: String,
        depends_on: String,
    },

    // =========================================================================
    // Runtime Exhaustion
    // =========================================================================
    /// No acceptable seed was drawn within the retry bound
    #[error("No acceptable seed after {attempts} attempts (last candidate: {last})")]
    SeedExhaustion { attempts: u32, last: i64 },

    /// The backend kept returning no images
    #[error("Backend returned no images after {attempts} attempts")]
    EmptyResult { attempts: u32 },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Generation backend request failed
    #[error("Backend error: {message}")]
    Backend { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoomError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is an authoring defect in the fragment library or
    /// settings rather than a runtime condition.
    pub fn is_config_defect(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingLibraryFile { .. }
                | Self::InvalidRange { .. }
                | Self::UnknownDependency { .. }
                | Self::ConditionalDependency { .. }
        )
    }

    /// Check if retrying the whole operation later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::EmptyResult { .. } | Self::SeedExhaustion { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SeedExhaustion { .. } => 3,
            Self::EmptyResult { .. } | Self::Backend { .. } => 4,
            Self::MissingLibraryFile { .. } => 6,
            e if e.is_config_defect() => 7,
            _ => 1,
        }
    }
}

/// Type alias for promptloom results
pub type Result<T> = std::result::Result<T, LoomError>;

/// Extension trait for converting foreign errors into [`LoomError`]
pub trait IntoLoomError<T> {
    fn into_loom_config(self) -> Result<T>;
    fn into_loom_backend(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoLoomError<T> for std::result::Result<T, E> {
    fn into_loom_config(self) -> Result<T> {
        self.map_err(|e| LoomError::config(e.into().to_string()))
    }

    fn into_loom_backend(self) -> Result<T> {
        self.map_err(|e| LoomError::backend(format!("{:#}", e.into())))
    }
}
