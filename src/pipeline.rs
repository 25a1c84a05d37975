//! # Receipt Pipeline
//!
//! Orchestrates one receipt image into one [`ReceiptDraft`]:
//!
//! ```text
//! Validate → Preprocess → Extract → ParsePrimary ─┬─ Parsed ──────────────► Emit (primary)
//!                                                 └─ Failed / Degenerate ─► ParseFallback → Emit (fallback)
//! ```
//!
//! Validation, preprocessing and extraction failures are fatal and returned
//! as [`ReceiptError`]. The primary parser never fails the run: whatever
//! goes wrong there, the fallback parser produces the draft.
//!
//! Preprocessing and OCR are blocking and run on the blocking thread pool.
//! An optional deadline bounds them; the time left after extraction also
//! bounds the primary parse, and running out there hands over to the
//! fallback parser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::circuit_breaker::CircuitBreaker;
use crate::draft::ReceiptDraft;
use crate::errors::{error_logging, AppError, AppResult};
use crate::fallback_parser;
use crate::model_parser::{ModelClient, PrimaryOutcome, PrimaryParser};
use crate::observability;
use crate::observer::{PipelineEvent, PipelineObserver, PipelineStage, TracingObserver};
use crate::ocr::{OcrOutput, TesseractRecognizer, TextRecognizer};
use crate::preprocessing::ImagePreprocessor;
use crate::receipt_config::PipelineConfig;
use crate::receipt_errors::ReceiptError;
use crate::validation::validate_receipt_image;

/// A fatal error tagged with the stage that raised it
struct StageFailure {
    stage: PipelineStage,
    error: ReceiptError,
}

impl StageFailure {
    fn new(stage: PipelineStage, error: ReceiptError) -> Self {
        Self { stage, error }
    }
}

/// Receipt image to draft transaction pipeline
///
/// Cheap to share behind an `Arc`; concurrent `process` calls only share the
/// recognizer's engine pool and the model circuit breaker.
pub struct ReceiptPipeline {
    config: PipelineConfig,
    preprocessor: ImagePreprocessor,
    recognizer: Arc<dyn TextRecognizer>,
    primary: PrimaryParser,
    observer: Arc<dyn PipelineObserver>,
    today: Option<NaiveDate>,
}

impl ReceiptPipeline {
    /// Assemble a pipeline from explicit collaborators.
    ///
    /// `model` is the primary parser's client; `None` disables the primary
    /// parser so every draft comes from the fallback parser.
    pub fn new(
        config: PipelineConfig,
        recognizer: Arc<dyn TextRecognizer>,
        model: Option<Arc<dyn ModelClient>>,
    ) -> Self {
        let primary = match model {
            Some(client) => PrimaryParser::new(client, CircuitBreaker::from_config(&config.model)),
            None => PrimaryParser::disabled(),
        };

        Self {
            preprocessor: ImagePreprocessor::new(config.preprocess.clone()),
            config,
            recognizer,
            primary,
            observer: Arc::new(TracingObserver),
            today: None,
        }
    }

    /// Validate `config` and wire the Tesseract recognizer and the Gemini
    /// client (when an API key is configured)
    pub fn from_config(config: PipelineConfig) -> AppResult<Self> {
        config.validate()?;

        let primary = PrimaryParser::from_config(&config.model).map_err(|e| {
            error_logging::log_config_error(&e, "model", "build_primary_parser");
            AppError::Config(e.to_string())
        })?;
        let recognizer = Arc::new(TesseractRecognizer::new(config.ocr.clone()));

        Ok(Self {
            preprocessor: ImagePreprocessor::new(config.preprocess.clone()),
            config,
            recognizer,
            primary,
            observer: Arc::new(TracingObserver),
            today: None,
        })
    }

    /// Replace the default [`TracingObserver`]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Pin the date used when a receipt has none
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn primary_parser(&self) -> &PrimaryParser {
        &self.primary
    }

    /// Process one receipt image.
    ///
    /// `deadline` overrides the configured default; `None` with no default
    /// means no time limit.
    ///
    /// # Errors
    ///
    /// - `Validation` when the path is not an acceptable image file
    /// - `ImageProcessing` when the image cannot be decoded or written
    /// - `Extraction` when the OCR engine fails
    /// - `Timeout` when the deadline passes during preprocessing or extraction
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use std::time::Duration;
    /// use receipt_ingest::pipeline::ReceiptPipeline;
    /// use receipt_ingest::receipt_config::PipelineConfig;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let pipeline = ReceiptPipeline::from_config(PipelineConfig::from_env()?)?;
    /// let draft = pipeline
    ///     .process(Path::new("uploads/receipt.jpg"), Some(Duration::from_secs(30)))
    ///     .await?;
    /// println!("{} spent {:.2} at {}", draft.date, draft.amount, draft.merchant);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process(
        &self,
        image_path: &Path,
        deadline: Option<Duration>,
    ) -> Result<ReceiptDraft, ReceiptError> {
        let span = observability::receipt_span("process", &image_path.to_string_lossy());
        self.run(image_path, deadline).instrument(span).await
    }

    async fn run(
        &self,
        image_path: &Path,
        deadline: Option<Duration>,
    ) -> Result<ReceiptDraft, ReceiptError> {
        let started = Instant::now();
        let expires_at = deadline
            .or(self.config.default_deadline_secs.map(Duration::from_secs))
            .map(|limit| started + limit);

        let file_size = match validate_receipt_image(image_path, &self.config) {
            Ok(size) => size,
            Err(error) => {
                return Err(self.abort(
                    StageFailure::new(PipelineStage::Validate, error),
                    image_path,
                    None,
                    started,
                ))
            }
        };
        self.observer.on_event(&PipelineEvent::Validated { file_size });
        self.observer.on_event(&PipelineEvent::StageCompleted {
            stage: PipelineStage::Validate,
            duration: started.elapsed(),
        });

        match self.extract_and_parse(image_path, expires_at).await {
            Ok(draft) => {
                self.observer.on_event(&PipelineEvent::Completed {
                    strategy: draft.parsed_with,
                    confidence: draft.confidence,
                    duration: started.elapsed(),
                });
                Ok(draft)
            }
            Err(failure) => Err(self.abort(failure, image_path, Some(file_size), started)),
        }
    }

    async fn extract_and_parse(
        &self,
        image_path: &Path,
        expires_at: Option<Instant>,
    ) -> Result<ReceiptDraft, StageFailure> {
        // The guard stays with the orchestrator; blocking tasks only get an
        // open handle or a path, so the file is gone on every return,
        // including a deadline that abandons a task still running.
        let stage_start = Instant::now();
        let (mut processed, output_file) = self
            .preprocessor
            .create_output(image_path)
            .map_err(|error| StageFailure::new(PipelineStage::Preprocess, error))?;
        let preprocessor = self.preprocessor.clone();
        let source: PathBuf = image_path.to_path_buf();
        let stats = run_blocking(PipelineStage::Preprocess, expires_at, move || {
            preprocessor.render(&source, output_file)
        })
        .await?;
        processed.record(stats);
        self.observer.on_event(&PipelineEvent::StageCompleted {
            stage: PipelineStage::Preprocess,
            duration: stage_start.elapsed(),
        });

        let stage_start = Instant::now();
        let recognizer = Arc::clone(&self.recognizer);
        let ocr_input = processed.path().to_path_buf();
        let OcrOutput { text, confidence } =
            run_blocking(PipelineStage::Extract, expires_at, move || {
                recognizer.recognize(&ocr_input)
            })
            .await?;
        drop(processed);
        self.observer.on_event(&PipelineEvent::TextExtracted {
            characters: text.chars().count(),
            confidence,
        });
        self.observer.on_event(&PipelineEvent::StageCompleted {
            stage: PipelineStage::Extract,
            duration: stage_start.elapsed(),
        });

        let today = self.today();
        let stage_start = Instant::now();
        let outcome = match expires_at {
            Some(at) => tokio::time::timeout_at(at, self.primary.parse(&text, today))
                .await
                .unwrap_or_else(|_| {
                    PrimaryOutcome::Failed("deadline exceeded during primary parse".to_string())
                }),
            None => self.primary.parse(&text, today).await,
        };
        self.observer.on_event(&PipelineEvent::PrimaryResolved {
            outcome: outcome.label(),
            reason: match &outcome {
                PrimaryOutcome::Failed(reason) => Some(reason.clone()),
                PrimaryOutcome::Degenerate(_) => Some("no merchant in model reply".to_string()),
                PrimaryOutcome::Parsed(_) => None,
            },
        });
        self.observer.on_event(&PipelineEvent::StageCompleted {
            stage: PipelineStage::ParsePrimary,
            duration: stage_start.elapsed(),
        });

        let draft = match outcome {
            PrimaryOutcome::Parsed(candidate) => candidate.into_draft(text),
            PrimaryOutcome::Degenerate(_) | PrimaryOutcome::Failed(_) => {
                let stage_start = Instant::now();
                let draft = fallback_parser::parse_receipt_text(&text, today);
                self.observer.on_event(&PipelineEvent::StageCompleted {
                    stage: PipelineStage::ParseFallback,
                    duration: stage_start.elapsed(),
                });
                draft
            }
        };

        Ok(draft)
    }

    fn abort(
        &self,
        failure: StageFailure,
        image_path: &Path,
        file_size: Option<u64>,
        started: Instant,
    ) -> ReceiptError {
        let elapsed = started.elapsed();
        let path = image_path.to_string_lossy();
        error_logging::log_receipt_error(
            &failure.error,
            failure.stage.as_str(),
            Some(path.as_ref()),
            file_size,
            Some(elapsed),
        );
        self.observer.on_event(&PipelineEvent::Failed {
            stage: failure.stage,
            error_kind: failure.error.kind(),
            duration: elapsed,
        });
        failure.error
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Run blocking work on the blocking pool, bounded by `expires_at`
async fn run_blocking<T, F>(
    stage: PipelineStage,
    expires_at: Option<Instant>,
    work: F,
) -> Result<T, StageFailure>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ReceiptError> + Send + 'static,
{
    if expires_at.is_some_and(|at| Instant::now() >= at) {
        return Err(deadline_exceeded(stage));
    }

    let handle: JoinHandle<Result<T, ReceiptError>> = tokio::task::spawn_blocking(work);
    let joined = match expires_at {
        Some(at) => match tokio::time::timeout_at(at, handle).await {
            Ok(joined) => joined,
            Err(_) => return Err(deadline_exceeded(stage)),
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result.map_err(|error| StageFailure::new(stage, error)),
        Err(join_error) => {
            let message = format!("{} task aborted: {}", stage, join_error);
            let error = match stage {
                PipelineStage::Preprocess => ReceiptError::ImageProcessing(message),
                _ => ReceiptError::Extraction(message),
            };
            Err(StageFailure::new(stage, error))
        }
    }
}

fn deadline_exceeded(stage: PipelineStage) -> StageFailure {
    StageFailure::new(
        stage,
        ReceiptError::Timeout(format!("deadline exceeded during {}", stage)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::{ParseStrategy, ReceiptCategory};

    struct FixedRecognizer(&'static str);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ReceiptError> {
            assert!(image_path.exists());
            Ok(OcrOutput {
                text: self.0.to_string(),
                confidence: 90.0,
            })
        }
    }

    fn write_receipt(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::GrayImage::from_fn(60, 40, |x, _| image::Luma([if x % 7 == 0 { 20 } else { 230 }]))
            .save(&path)
            .unwrap();
        path
    }

    fn pipeline(text: &'static str) -> ReceiptPipeline {
        ReceiptPipeline::new(PipelineConfig::default(), Arc::new(FixedRecognizer(text)), None)
            .with_today(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
    }

    #[tokio::test]
    async fn test_fallback_draft_when_primary_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_receipt(dir.path(), "receipt.png");

        let draft = pipeline("CAFE MOCHA\nTotal: Rs. 350.00\n12-10-2024")
            .process(&image, None)
            .await
            .unwrap();

        assert_eq!(draft.parsed_with, ParseStrategy::Fallback);
        assert_eq!(draft.merchant, "CAFE MOCHA");
        assert_eq!(draft.amount, 350.0);
        assert_eq!(draft.category, ReceiptCategory::FoodAndDining);
    }

    #[tokio::test]
    async fn test_zero_deadline_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_receipt(dir.path(), "receipt.png");

        let result = pipeline("anything").process(&image, Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(ReceiptError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_zero_deadline_leaves_no_processed_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_receipt(dir.path(), "receipt.png");

        let result = pipeline("anything").process(&image, Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(ReceiptError::Timeout(_))));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".receipt-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline("anything")
            .process(&dir.path().join("missing.jpg"), None)
            .await;
        assert!(matches!(result, Err(ReceiptError::Validation(_))));
    }
}
