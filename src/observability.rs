//! Observability module for logging and metrics setup.
//!
//! This module provides:
//! - Structured logging through `tracing-subscriber` (pretty or JSON)
//! - Prometheus metrics recorder installation
//! - Span and metric helpers used by the receipt pipeline
//!
//! The crate has no server of its own: [`init_observability`] hands back the
//! Prometheus handle and the host decides how to expose `render()`.

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;

/// Initialize logging and, when enabled, the metrics recorder
pub fn init_observability(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    let handle = if config.enable_metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = config.enable_metrics,
        "Observability stack initialized successfully"
    );
    Ok(handle)
}

/// Initialize structured logging with tracing and configuration
///
/// `RUST_LOG` directives are honored; `LOG_LEVEL` sets this crate's level.
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("receipt_ingest={}", config.log_level).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    if config.use_pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Span wrapping one pipeline invocation
pub fn receipt_span(operation: &str, image_path: &str) -> tracing::Span {
    tracing::info_span!(
        "receipt_operation",
        operation = operation,
        image_path = image_path,
        component = "receipt_pipeline"
    )
}

/// Record the end of a pipeline run (`completed` or the error kind)
pub fn record_pipeline_run(result: &'static str, duration: std::time::Duration) {
    metrics::counter!("receipt_pipeline_runs_total", "result" => result).increment(1);
    metrics::histogram!("receipt_pipeline_duration_seconds").record(duration.as_secs_f64());
}

/// Record how long one stage took
pub fn record_stage_duration(stage: &'static str, duration: std::time::Duration) {
    metrics::histogram!("receipt_stage_duration_seconds", "stage" => stage)
        .record(duration.as_secs_f64());
}

/// Record which parser produced the emitted draft
pub fn record_parse_strategy(strategy: &'static str, confidence: f64) {
    metrics::counter!("receipt_parse_strategy_total", "strategy" => strategy).increment(1);
    metrics::histogram!("receipt_draft_confidence", "strategy" => strategy).record(confidence);
}

/// Record the outcome of a primary parse attempt
pub fn record_primary_outcome(outcome: &'static str) {
    metrics::counter!("receipt_primary_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record the size of an accepted input image
pub fn record_input_metrics(image_size: u64) {
    metrics::histogram!("receipt_image_size_bytes").record(image_size as f64);
}

/// Record OCR output length and engine confidence
pub fn record_ocr_metrics(characters: usize, confidence: f32) {
    metrics::histogram!("receipt_ocr_characters").record(characters as f64);
    metrics::histogram!("receipt_ocr_confidence").record(confidence as f64);
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(is_open: bool) {
    metrics::gauge!("receipt_model_circuit_breaker_open").set(if is_open { 1.0 } else { 0.0 });
}
