//! # Unified Application Configuration
//!
//! Consolidates the pipeline and observability settings into a single
//! structured configuration object loaded from the environment.

use crate::errors::{error_logging, AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::receipt_config::PipelineConfig;

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Receipt pipeline configuration
    pub pipeline: PipelineConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and then the environment
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let pipeline = PipelineConfig::from_env().inspect_err(|e| {
            error_logging::log_config_error(e, "pipeline", "load_from_env");
        })?;

        Ok(Self {
            pipeline,
            observability: ObservabilityConfig::from_env(),
        })
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.pipeline.validate()?;
        self.observability
            .validate()
            .map_err(|e| AppError::Config(format!("observability: {}", e)))?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: environment={}, max_file_size={}, max_dimension={}x{}, ocr_languages={}, model={}, model_api_key={}, deadline_secs={:?}",
            self.observability.environment,
            self.pipeline.max_file_size,
            self.pipeline.preprocess.max_width,
            self.pipeline.preprocess.max_height,
            self.pipeline.ocr.languages,
            self.pipeline.model.model,
            if self.pipeline.model.is_enabled() { "[REDACTED]" } else { "unset" },
            self.pipeline.default_deadline_secs,
        )
    }
}
