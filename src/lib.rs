//! # Receipt Ingest
//!
//! Turns a photographed receipt into a draft transaction: the image is
//! validated, normalized for OCR, read by Tesseract, and parsed into a
//! [`ReceiptDraft`] by a generative model, with a deterministic rule-based
//! parser taking over whenever the model is unavailable or unhelpful.
//!
//! ```rust,no_run
//! use receipt_ingest::{AppConfig, ReceiptPipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//! let _metrics = receipt_ingest::observability::init_observability(&config.observability)?;
//!
//! let pipeline = ReceiptPipeline::from_config(config.pipeline)?;
//! let draft = pipeline.process("receipt.jpg".as_ref(), None).await?;
//! println!("{}", serde_json::to_string_pretty(&draft)?);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod draft;
pub mod errors;
pub mod fallback_parser;
pub mod instance_manager;
pub mod jobs;
pub mod model_parser;
pub mod observability;
pub mod observability_config;
pub mod observer;
pub mod ocr;
pub mod pipeline;
pub mod preprocessing;
pub mod receipt_config;
pub mod receipt_errors;
pub mod validation;

// Re-export types for easier access
pub use config::AppConfig;
pub use draft::{ParseStrategy, ReceiptCategory, ReceiptDraft};
pub use jobs::{JobId, JobStatus, ReceiptJobs};
pub use model_parser::{GeminiClient, ModelClient, PrimaryOutcome};
pub use observer::{PipelineEvent, PipelineObserver, PipelineStage};
pub use ocr::{OcrOutput, TesseractRecognizer, TextRecognizer};
pub use pipeline::ReceiptPipeline;
pub use receipt_config::PipelineConfig;
pub use receipt_errors::ReceiptError;
