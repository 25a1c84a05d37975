//! # Application Error Types
//!
//! This module defines the application-level error type used by configuration
//! and integration code, plus structured error logging helpers shared by the
//! pipeline components.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Receipt pipeline errors
    Receipt(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Receipt(msg) => write!(f, "[RECEIPT] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<crate::receipt_errors::ReceiptError> for AppError {
    fn from(err: crate::receipt_errors::ReceiptError) -> Self {
        AppError::Receipt(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the crate
pub mod error_logging {
    use tracing::{error, warn};

    /// Log a fatal receipt pipeline error with image and processing context
    pub fn log_receipt_error(
        error: &crate::receipt_errors::ReceiptError,
        operation: &str,
        image_path: Option<&str>,
        image_size: Option<u64>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            error_kind = error.kind(),
            operation = %operation,
            image_path = ?image_path,
            image_size_bytes = ?image_size,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Receipt processing failed"
        );
    }

    /// Log a recovered primary-parser failure. The pipeline continues with the
    /// fallback parser, so this is a warning rather than an error.
    pub fn log_model_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
        model: Option<&str>,
    ) {
        warn!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            model = ?model,
            "Model-based receipt parsing failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&str>,
        file_size: Option<u64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            file_size_bytes = ?file_size,
            "File system operation failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
