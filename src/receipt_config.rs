//! # Receipt Pipeline Configuration Module
//!
//! This module defines configuration structures for the receipt pipeline:
//! input limits, preprocessing parameters, OCR engine settings and the
//! model-based parser connection.

use std::env;

use crate::errors::{AppError, AppResult};

// Constants for pipeline configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for receipt images
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;
pub const DEFAULT_MODEL_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL_NAME: &str = "gemini-1.5-flash";

/// Page Segmentation Mode for Tesseract OCR
///
/// Receipts are mostly a single column of short lines, so only the modes that
/// make sense for that layout are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    #[default]
    Auto,
    /// Assume a single column of text
    SingleColumn,
    /// Assume a single uniform block of text
    SingleBlock,
    /// Find as much text as possible in no particular order
    SparseText,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse the Tesseract numeric code back into a mode
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Image preprocessing parameters
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Maximum output width in pixels; larger images are scaled down
    pub max_width: u32,
    /// Maximum output height in pixels; larger images are scaled down
    pub max_height: u32,
    /// Whether to apply the sharpening kernel
    pub sharpen: bool,
    /// Percentage of darkest/brightest pixels ignored when stretching contrast
    pub normalize_clip_percent: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            sharpen: true,
            normalize_clip_percent: 1.0,
        }
    }
}

impl PreprocessConfig {
    /// Validate preprocessing parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(AppError::Config(format!(
                "max_width and max_height must be greater than 0 (got {}x{})",
                self.max_width, self.max_height
            )));
        }
        if !(0.0..50.0).contains(&self.normalize_clip_percent) {
            return Err(AppError::Config(format!(
                "normalize_clip_percent must be in [0, 50), got {}",
                self.normalize_clip_percent
            )));
        }
        Ok(())
    }
}

/// Tesseract engine settings
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng", "eng+hin")
    pub languages: String,
    /// Page segmentation mode used for every recognition
    pub psm_mode: PageSegMode,
    /// Explicit tessdata directory; `None` uses the system default
    pub tessdata_path: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            psm_mode: PageSegMode::default(),
            tessdata_path: None,
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }
        if let Some(path) = &self.tessdata_path {
            if path.trim().is_empty() {
                return Err(AppError::Config(
                    "tessdata_path cannot be empty if provided".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Connection settings for the model-based primary parser
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key; the primary parser is disabled when absent
    pub api_key: Option<String>,
    /// Base URL of the generative model API
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Consecutive failures before the circuit breaker opens
    pub circuit_breaker_threshold: u32,
    /// Seconds the breaker stays open before letting a request through again
    pub circuit_breaker_reset_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model: DEFAULT_MODEL_NAME.to_string(),
            timeout_secs: 20,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl ModelConfig {
    /// Whether the primary parser has credentials to call out
    pub fn is_enabled(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    /// Validate model connection parameters
    pub fn validate(&self) -> AppResult<()> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(AppError::Config(format!(
                "model endpoint must start with http:// or https://, got '{}'",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::Config("model name cannot be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::Config(
                "model timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs > 300 {
            return Err(AppError::Config(
                "model timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration structure for the whole receipt pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum accepted input file size in bytes
    pub max_file_size: u64,
    /// Accepted file extensions, lowercase, without the dot
    pub allowed_extensions: Vec<String>,
    /// Default deadline applied when the caller does not pass one
    pub default_deadline_secs: Option<u64>,
    /// Image preprocessing parameters
    pub preprocess: PreprocessConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Model-based parser connection
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            default_deadline_secs: None,
            preprocess: PreprocessConfig::default(),
            ocr: OcrConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var("RECEIPT_MAX_FILE_SIZE") {
            config.max_file_size = value.parse().map_err(|_| {
                AppError::Config("RECEIPT_MAX_FILE_SIZE must be a valid number of bytes".to_string())
            })?;
        }
        if let Ok(value) = env::var("RECEIPT_MAX_DIMENSION") {
            let dimension: u32 = value.parse().map_err(|_| {
                AppError::Config("RECEIPT_MAX_DIMENSION must be a valid number of pixels".to_string())
            })?;
            config.preprocess.max_width = dimension;
            config.preprocess.max_height = dimension;
        }
        if let Ok(value) = env::var("RECEIPT_DEADLINE_SECS") {
            config.default_deadline_secs = Some(value.parse().map_err(|_| {
                AppError::Config("RECEIPT_DEADLINE_SECS must be a valid number of seconds".to_string())
            })?);
        }

        if let Ok(value) = env::var("OCR_LANGUAGES") {
            config.ocr.languages = value;
        }
        if let Ok(value) = env::var("OCR_PSM_MODE") {
            config.ocr.psm_mode = PageSegMode::from_code(&value).ok_or_else(|| {
                AppError::Config(format!("OCR_PSM_MODE '{}' is not a supported mode", value))
            })?;
        }
        config.ocr.tessdata_path = env::var("OCR_TESSDATA_PATH").ok();

        config.model.api_key = env::var("RECEIPT_MODEL_API_KEY").ok();
        if let Ok(value) = env::var("RECEIPT_MODEL_ENDPOINT") {
            config.model.endpoint = value;
        }
        if let Ok(value) = env::var("RECEIPT_MODEL_NAME") {
            config.model.model = value;
        }
        if let Ok(value) = env::var("RECEIPT_MODEL_TIMEOUT_SECS") {
            config.model.timeout_secs = value.parse().map_err(|_| {
                AppError::Config(
                    "RECEIPT_MODEL_TIMEOUT_SECS must be a valid number of seconds".to_string(),
                )
            })?;
        }
        if let Ok(value) = env::var("RECEIPT_MODEL_BREAKER_THRESHOLD") {
            config.model.circuit_breaker_threshold = value.parse().map_err(|_| {
                AppError::Config(
                    "RECEIPT_MODEL_BREAKER_THRESHOLD must be a valid number of failures".to_string(),
                )
            })?;
        }
        if let Ok(value) = env::var("RECEIPT_MODEL_BREAKER_RESET_SECS") {
            config.model.circuit_breaker_reset_secs = value.parse().map_err(|_| {
                AppError::Config(
                    "RECEIPT_MODEL_BREAKER_RESET_SECS must be a valid number of seconds".to_string(),
                )
            })?;
        }

        Ok(config)
    }

    /// Validate pipeline configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(AppError::Config(
                "allowed_extensions cannot be empty".to_string(),
            ));
        }
        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.starts_with('.') || ext.to_lowercase() != **ext)
        {
            return Err(AppError::Config(format!(
                "allowed extension '{}' must be lowercase and given without a leading dot",
                ext
            )));
        }
        if self.default_deadline_secs == Some(0) {
            return Err(AppError::Config(
                "default_deadline_secs must be greater than 0 when set".to_string(),
            ));
        }

        // Validate nested configurations
        self.preprocess.validate()?;
        self.ocr.validate()?;
        self.model.validate()?;

        Ok(())
    }
}
