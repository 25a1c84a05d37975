//! # OCR Instance Manager Module
//!
//! Keeps initialized Tesseract engines around so repeated recognitions skip
//! the engine start-up cost.

use std::collections::HashMap;
use std::sync::Arc;

use leptess::LepTess;
use parking_lot::Mutex;
use tracing::info;

use crate::receipt_config::OcrConfig;
use crate::receipt_errors::ReceiptError;

/// Shared, lockable Tesseract engine
pub type SharedEngine = Arc<Mutex<LepTess>>;

/// Thread-safe pool of Tesseract engines
///
/// One engine is kept per distinct (languages, page segmentation mode,
/// tessdata path) combination. Engines are created on first request and
/// reused afterwards. Each engine is behind its own lock, so recognitions
/// sharing a configuration run one at a time while different configurations
/// run in parallel.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, SharedEngine>>,
}

impl OcrInstanceManager {
    /// Create an empty pool
    ///
    /// # Examples
    ///
    /// ```rust
    /// use receipt_ingest::instance_manager::OcrInstanceManager;
    ///
    /// let manager = OcrInstanceManager::new();
    /// assert_eq!(manager.instance_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the engine for `config`
    ///
    /// # Errors
    ///
    /// Returns `ReceiptError::Extraction` when Tesseract cannot be initialized,
    /// usually because the language data is missing.
    pub fn get_instance(&self, config: &OcrConfig) -> Result<SharedEngine, ReceiptError> {
        let key = Self::instance_key(config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            "Creating new OCR instance for languages: {} with psm: {}",
            config.languages,
            config.psm_mode.as_str()
        );

        let mut tess = LepTess::new(config.tessdata_path.as_deref(), &config.languages).map_err(
            |e| ReceiptError::Extraction(format!("failed to initialize Tesseract: {}", e)),
        )?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| ReceiptError::Extraction(format!("failed to set PSM mode: {}", e)))?;

        // Another thread may have raced us here; keep whichever landed first.
        let mut instances = self.instances.lock();
        let instance = instances
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(tess)));
        Ok(Arc::clone(instance))
    }

    /// Drop every cached engine
    pub fn clear(&self) {
        let mut instances = self.instances.lock();
        let count = instances.len();
        instances.clear();
        if count > 0 {
            info!("Cleared {count} OCR instances");
        }
    }

    /// Number of cached engines
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn instance_key(config: &OcrConfig) -> String {
        format!(
            "{}:{}:{}",
            config.languages,
            config.psm_mode.as_str(),
            config.tessdata_path.as_deref().unwrap_or("default")
        )
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
