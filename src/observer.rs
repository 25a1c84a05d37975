//! # Pipeline Observer
//!
//! Stage-level notifications emitted by the receipt pipeline. The default
//! [`TracingObserver`] turns them into log records and metrics; hosts can
//! inject their own observer to collect them elsewhere.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::draft::ParseStrategy;
use crate::observability;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Validate,
    Preprocess,
    Extract,
    ParsePrimary,
    ParseFallback,
    Emit,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validate => "validate",
            PipelineStage::Preprocess => "preprocess",
            PipelineStage::Extract => "extract",
            PipelineStage::ParsePrimary => "parse_primary",
            PipelineStage::ParseFallback => "parse_fallback",
            PipelineStage::Emit => "emit",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened during one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Input accepted
    Validated { file_size: u64 },
    /// A stage finished successfully
    StageCompleted {
        stage: PipelineStage,
        duration: Duration,
    },
    /// Recognition produced text
    TextExtracted { characters: usize, confidence: f32 },
    /// The primary parser answered; `reason` is set for failures
    PrimaryResolved {
        outcome: &'static str,
        reason: Option<String>,
    },
    /// A draft was emitted
    Completed {
        strategy: ParseStrategy,
        confidence: f64,
        duration: Duration,
    },
    /// The run ended with a fatal error
    Failed {
        stage: PipelineStage,
        error_kind: &'static str,
        duration: Duration,
    },
}

/// Receives pipeline events. Called inline, so implementations must be quick.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Logs events and records them as metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Validated { file_size } => {
                debug!(file_size, "Receipt image accepted");
                observability::record_input_metrics(*file_size);
            }
            PipelineEvent::StageCompleted { stage, duration } => {
                debug!(stage = stage.as_str(), duration_ms = duration.as_millis() as u64, "Stage completed");
                observability::record_stage_duration(stage.as_str(), *duration);
            }
            PipelineEvent::TextExtracted {
                characters,
                confidence,
            } => {
                debug!(characters, confidence, "Text extracted");
                observability::record_ocr_metrics(*characters, *confidence);
            }
            PipelineEvent::PrimaryResolved { outcome, reason } => {
                match reason {
                    Some(reason) => info!(outcome, reason = %reason, "Primary parser did not produce a draft"),
                    None => debug!(outcome, "Primary parser resolved"),
                }
                observability::record_primary_outcome(outcome);
            }
            PipelineEvent::Completed {
                strategy,
                confidence,
                duration,
            } => {
                info!(
                    strategy = strategy.as_str(),
                    confidence,
                    duration_ms = duration.as_millis() as u64,
                    "Receipt draft emitted"
                );
                observability::record_parse_strategy(strategy.as_str(), *confidence);
                observability::record_pipeline_run("completed", *duration);
            }
            PipelineEvent::Failed {
                stage,
                error_kind,
                duration,
            } => {
                warn!(
                    stage = stage.as_str(),
                    error_kind,
                    duration_ms = duration.as_millis() as u64,
                    "Receipt pipeline aborted"
                );
                observability::record_pipeline_run(error_kind, *duration);
            }
        }
    }
}
