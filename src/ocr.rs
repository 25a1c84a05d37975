//! # OCR Processing Module
//!
//! Text recognition over a preprocessed receipt image.
//!
//! The pipeline only depends on the [`TextRecognizer`] trait; the
//! Tesseract-backed [`TesseractRecognizer`] is the production implementation.
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica

use std::path::Path;

use tracing::{debug, info};

use crate::instance_manager::OcrInstanceManager;
use crate::receipt_config::OcrConfig;
use crate::receipt_errors::ReceiptError;

/// Recognized text and the engine's self-reported confidence
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Raw recognized text; may be empty
    pub text: String,
    /// Engine confidence in [0, 100]
    pub confidence: f32,
}

/// Something that turns an image file into text.
///
/// Implementations are called from a blocking thread and may do synchronous
/// work. Recognizing nothing is not an error: return empty text.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in the image at `image_path`
    ///
    /// # Errors
    ///
    /// Returns `ReceiptError::Extraction` when the engine fails.
    fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ReceiptError>;
}

/// Tesseract-backed recognizer reusing engines across calls
pub struct TesseractRecognizer {
    config: OcrConfig,
    instances: OcrInstanceManager,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            instances: OcrInstanceManager::new(),
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ReceiptError> {
        let start_time = std::time::Instant::now();
        let instance = self.instances.get_instance(&self.config)?;

        let (raw_text, mean_conf) = {
            let mut tess = instance.lock();
            tess.set_image(image_path).map_err(|e| {
                ReceiptError::Extraction(format!(
                    "failed to load image {} for OCR: {}",
                    image_path.display(),
                    e
                ))
            })?;

            let text = tess.get_utf8_text().map_err(|e| {
                ReceiptError::Extraction(format!("failed to extract text from image: {}", e))
            })?;
            (text, tess.mean_text_conf())
        };

        let text = clean_ocr_text(&raw_text);
        let confidence = (mean_conf as f32).clamp(0.0, 100.0);

        info!(
            "OCR processing completed in {}ms, extracted {} characters",
            start_time.elapsed().as_millis(),
            text.len()
        );
        debug!(confidence, "Tesseract mean text confidence");

        Ok(OcrOutput { text, confidence })
    }
}

/// Trim every line and drop the blank ones
pub fn clean_ocr_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_ocr_text() {
        let raw = "  CAFE MOCHA  \n\n\t\nTotal: 350.00   \n  \n";
        assert_eq!(clean_ocr_text(raw), "CAFE MOCHA\nTotal: 350.00");
    }

    #[test]
    fn test_clean_ocr_text_empty() {
        assert_eq!(clean_ocr_text(""), "");
        assert_eq!(clean_ocr_text(" \n \n"), "");
    }

    #[test]
    fn test_recognizer_is_object_safe() {
        struct Fixed;
        impl TextRecognizer for Fixed {
            fn recognize(&self, _image_path: &Path) -> Result<OcrOutput, ReceiptError> {
                Ok(OcrOutput {
                    text: "TOTAL 5.00".to_string(),
                    confidence: 88.0,
                })
            }
        }

        let recognizer: Box<dyn TextRecognizer> = Box::new(Fixed);
        let output = recognizer.recognize(Path::new("any.png")).unwrap();
        assert_eq!(output.text, "TOTAL 5.00");
    }
}
