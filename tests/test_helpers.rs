//! # Test Helper Library
//!
//! Shared fixtures for the integration tests: generated receipt images,
//! scripted recognizers and model clients, and an event-collecting observer.
//! Nothing here touches the network or needs Tesseract installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use receipt_ingest::model_parser::{ModelClient, ModelClientError, ModelFuture};
use receipt_ingest::observer::{PipelineEvent, PipelineObserver};
use receipt_ingest::ocr::{OcrOutput, TextRecognizer};
use receipt_ingest::receipt_config::PipelineConfig;
use receipt_ingest::receipt_errors::ReceiptError;
use receipt_ingest::ReceiptPipeline;

/// Fixed processing date used by every pipeline built here
pub fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

/// Write a small striped grayscale image; the extension picks the format
pub fn write_receipt_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let image = GrayImage::from_fn(width, height, |x, y| {
        if (x / 4 + y / 6) % 3 == 0 {
            Luma([30])
        } else {
            Luma([220])
        }
    });
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

/// Preprocessor outputs left in `dir`
pub fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".receipt-"))
        .map(|entry| entry.path())
        .collect()
}

/// Recognizer that returns scripted text and remembers what it was given
pub struct ScriptedRecognizer {
    result: Result<String, ReceiptError>,
    delay: Option<Duration>,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedRecognizer {
    pub fn text(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(ReceiptError::Extraction(message.to_string())),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ReceiptError> {
        assert!(
            image_path.exists(),
            "recognizer was handed a missing file: {}",
            image_path.display()
        );
        self.seen.lock().push(image_path.to_path_buf());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.result.clone().map(|text| OcrOutput {
            text,
            confidence: 87.5,
        })
    }
}

/// Model client with a scripted reply and a call counter
pub struct ScriptedModel {
    reply: Result<String, ModelClientError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ModelClientError) -> Self {
        Self {
            reply: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn generate<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        })
    }
}

/// Observer that keeps every event it receives
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }
}

impl PipelineObserver for CollectingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Pipeline over the given fakes with the default configuration
pub fn build_pipeline(
    recognizer: Arc<ScriptedRecognizer>,
    model: Option<Arc<ScriptedModel>>,
) -> ReceiptPipeline {
    build_pipeline_with_config(PipelineConfig::default(), recognizer, model)
}

pub fn build_pipeline_with_config(
    config: PipelineConfig,
    recognizer: Arc<ScriptedRecognizer>,
    model: Option<Arc<ScriptedModel>>,
) -> ReceiptPipeline {
    let model = model.map(|client| client as Arc<dyn ModelClient>);
    ReceiptPipeline::new(config, recognizer, model).with_today(fixed_today())
}
