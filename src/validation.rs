//! # Receipt Image Validation
//!
//! Cheap fail-fast checks run before any image work starts: the path must
//! name an existing, non-empty regular file within the size limit, with one
//! of the accepted extensions.

use std::path::Path;

use tracing::debug;

use crate::receipt_config::PipelineConfig;
use crate::receipt_errors::ReceiptError;

/// Validate a receipt image path and return the file size in bytes.
///
/// # Errors
///
/// Returns `ReceiptError::Validation` when:
/// - the extension is missing or not in `config.allowed_extensions`
/// - the file does not exist or is not a regular file
/// - the file is empty or larger than `config.max_file_size`
///
/// # Examples
///
/// ```rust,no_run
/// use std::path::Path;
/// use receipt_ingest::receipt_config::PipelineConfig;
/// use receipt_ingest::validation::validate_receipt_image;
///
/// let size = validate_receipt_image(Path::new("uploads/receipt.jpg"), &PipelineConfig::default())?;
/// println!("receipt is {} bytes", size);
/// # Ok::<(), receipt_ingest::receipt_errors::ReceiptError>(())
/// ```
pub fn validate_receipt_image(path: &Path, config: &PipelineConfig) -> Result<u64, ReceiptError> {
    validate_extension(path, &config.allowed_extensions)?;

    if !path.exists() {
        return Err(ReceiptError::Validation(format!(
            "file does not exist ({})",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(path).map_err(|e| {
        ReceiptError::Validation(format!(
            "cannot read file metadata ({}) - {}",
            path.display(),
            e
        ))
    })?;

    if !metadata.is_file() {
        return Err(ReceiptError::Validation(format!(
            "path is not a file ({})",
            path.display()
        )));
    }

    let file_size = metadata.len();
    if file_size == 0 {
        return Err(ReceiptError::Validation(format!(
            "file is empty ({})",
            path.display()
        )));
    }
    if file_size > config.max_file_size {
        return Err(ReceiptError::Validation(format!(
            "file too large ({} bytes, maximum allowed: {} bytes)",
            file_size, config.max_file_size
        )));
    }

    debug!(path = %path.display(), file_size, "Receipt image passed validation");
    Ok(file_size)
}

/// Check the extension case-insensitively against the allowed list
pub fn validate_extension(path: &Path, allowed: &[String]) -> Result<(), ReceiptError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| {
            ReceiptError::Validation(format!(
                "file has no extension ({}); expected one of: {}",
                path.display(),
                allowed.join(", ")
            ))
        })?;

    if allowed.iter().any(|candidate| *candidate == extension) {
        Ok(())
    } else {
        Err(ReceiptError::Validation(format!(
            "unsupported file type '.{}'; expected one of: {}",
            extension,
            allowed.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        PipelineConfig::default().allowed_extensions
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert!(validate_extension(Path::new("a/receipt.JPG"), &allowed()).is_ok());
        assert!(validate_extension(Path::new("receipt.jpeg"), &allowed()).is_ok());
        assert!(validate_extension(Path::new("receipt.Png"), &allowed()).is_ok());
    }

    #[test]
    fn test_extension_rejections() {
        assert!(matches!(
            validate_extension(Path::new("receipt.gif"), &allowed()),
            Err(ReceiptError::Validation(_))
        ));
        assert!(matches!(
            validate_extension(Path::new("receipt"), &allowed()),
            Err(ReceiptError::Validation(_))
        ));
        assert!(matches!(
            validate_extension(Path::new("receipt.png.exe"), &allowed()),
            Err(ReceiptError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_receipt_image(
            Path::new("/definitely/not/here/receipt.png"),
            &PipelineConfig::default(),
        );
        match result {
            Err(ReceiptError::Validation(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempfile::Builder::new().suffix(".png").tempdir().unwrap();
        let result = validate_receipt_image(dir.path(), &PipelineConfig::default());
        match result {
            Err(ReceiptError::Validation(msg)) => assert!(msg.contains("not a file")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
