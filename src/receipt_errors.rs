//! # Receipt Pipeline Error Types
//!
//! Fatal errors a pipeline invocation can surface to its caller. A failed or
//! degenerate primary parse is not an error: it is recovered internally by
//! the fallback parser and never appears here.

/// Fatal pipeline errors
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptError {
    /// Input file rejected before any processing
    Validation(String),
    /// Image could not be decoded, transformed or written
    ImageProcessing(String),
    /// OCR engine failed to produce text
    Extraction(String),
    /// Caller-supplied deadline exceeded
    Timeout(String),
}

impl ReceiptError {
    /// Short stable tag used for metrics labels and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ReceiptError::Validation(_) => "validation",
            ReceiptError::ImageProcessing(_) => "image_processing",
            ReceiptError::Extraction(_) => "extraction",
            ReceiptError::Timeout(_) => "timeout",
        }
    }
}

impl std::fmt::Display for ReceiptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiptError::Validation(msg) => {
                write!(f, "[VALIDATION] Receipt image validation failed: {}", msg)
            }
            ReceiptError::ImageProcessing(msg) => {
                write!(f, "[IMAGE_PROCESSING] Receipt image preprocessing failed: {}", msg)
            }
            ReceiptError::Extraction(msg) => {
                write!(f, "[OCR_EXTRACT] Text extraction from receipt failed: {}", msg)
            }
            ReceiptError::Timeout(msg) => {
                write!(f, "[TIMEOUT] Receipt processing timed out: {}", msg)
            }
        }
    }
}

impl std::error::Error for ReceiptError {}
