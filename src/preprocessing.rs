//! # Image Preprocessing Module
//!
//! Normalizes an arbitrary receipt photo into a canonical form for text
//! recognition: grayscale, bounded size, stretched contrast, sharpened.
//!
//! The processed image lives next to the source under a unique name and is
//! guarded by a [`PreprocessedImage`], which deletes the file when it is
//! dropped. Creating the output and rendering into it are separate steps:
//! the caller keeps the guard while the render runs elsewhere on an open
//! handle, so abandoning a render never leaves a file behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, GenericImageView, GrayImage, ImageFormat};
use tempfile::TempPath;
use tracing::debug;

use crate::errors::error_logging;
use crate::receipt_config::PreprocessConfig;
use crate::receipt_errors::ReceiptError;

/// Dimensions and timing of one render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Source image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// Output image dimensions (width, height)
    pub final_dimensions: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// A processed image on disk, removed when this value goes out of scope.
#[derive(Debug)]
pub struct PreprocessedImage {
    path: PathBuf,
    temp: Option<TempPath>,
    /// Source image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// Output image dimensions (width, height)
    pub final_dimensions: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

impl PreprocessedImage {
    /// Location of the processed image
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach the stats of the render that filled this file
    pub fn record(&mut self, stats: RenderStats) {
        self.original_dimensions = stats.original_dimensions;
        self.final_dimensions = stats.final_dimensions;
        self.processing_time_ms = stats.processing_time_ms;
    }
}

impl Drop for PreprocessedImage {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                let path = self.path.to_string_lossy();
                error_logging::log_filesystem_error(
                    &e,
                    "remove_preprocessed_image",
                    Some(path.as_ref()),
                    None,
                );
            }
        }
    }
}

/// Turns receipt photos into OCR-ready grayscale images
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Load, transform and write the image at `source` in one go.
    ///
    /// # Errors
    ///
    /// Returns `ReceiptError::ImageProcessing` when the source cannot be read
    /// or decoded, or when the output cannot be written.
    pub fn preprocess(&self, source: &Path) -> Result<PreprocessedImage, ReceiptError> {
        let (mut output, file) = self.create_output(source)?;
        let stats = self.render(source, file)?;
        output.record(stats);
        Ok(output)
    }

    /// Create the empty output file for `source`.
    ///
    /// The file is a PNG in the same directory as the source, named
    /// `.receipt-<random>.png`, so concurrent runs never collide. The guard
    /// owns the name; the returned handle is what [`render`](Self::render)
    /// writes through.
    pub fn create_output(&self, source: &Path) -> Result<(PreprocessedImage, File), ReceiptError> {
        let dir = source
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let (file, temp) = tempfile::Builder::new()
            .prefix(".receipt-")
            .suffix(".png")
            .tempfile_in(dir)
            .map_err(|e| {
                ReceiptError::ImageProcessing(format!(
                    "cannot create processed image in {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .into_parts();

        let output = PreprocessedImage {
            path: temp.to_path_buf(),
            temp: Some(temp),
            original_dimensions: (0, 0),
            final_dimensions: (0, 0),
            processing_time_ms: 0,
        };
        Ok((output, file))
    }

    /// Decode `source`, transform it and encode the result into `output`.
    ///
    /// Writes go through the handle only, so if the guard has already
    /// removed the name the bytes land in an unlinked file.
    pub fn render(&self, source: &Path, output: File) -> Result<RenderStats, ReceiptError> {
        let start_time = std::time::Instant::now();

        let image = image::open(source).map_err(|e| {
            ReceiptError::ImageProcessing(format!("cannot decode {}: {}", source.display(), e))
        })?;
        let original_dimensions = image.dimensions();

        let processed = self.transform(&image.to_luma8());
        let final_dimensions = processed.dimensions();

        let mut writer = BufWriter::new(output);
        processed
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|e| {
                ReceiptError::ImageProcessing(format!("cannot encode processed image: {}", e))
            })?;
        writer.flush().map_err(|e| {
            ReceiptError::ImageProcessing(format!("cannot write processed image: {}", e))
        })?;

        let processing_time = start_time.elapsed();
        debug!(
            target: "receipt_preprocessing",
            "Preprocessing completed in {}ms: {}x{} -> {}x{}",
            processing_time.as_millis(),
            original_dimensions.0,
            original_dimensions.1,
            final_dimensions.0,
            final_dimensions.1
        );

        Ok(RenderStats {
            original_dimensions,
            final_dimensions,
            processing_time_ms: processing_time.as_millis() as u32,
        })
    }

    /// Resize, normalize and (optionally) sharpen a grayscale image.
    ///
    /// Downscaling happens first so the per-pixel passes run on at most
    /// `max_width * max_height` pixels.
    pub fn transform(&self, gray: &GrayImage) -> GrayImage {
        let bounded = match fit_within(
            gray.dimensions(),
            (self.config.max_width, self.config.max_height),
        ) {
            Some((width, height)) => image::imageops::resize(gray, width, height, FilterType::Lanczos3),
            None => gray.clone(),
        };

        let normalized = normalize_intensity(&bounded, self.config.normalize_clip_percent);

        if self.config.sharpen {
            imageproc::filter::sharpen3x3(&normalized)
        } else {
            normalized
        }
    }
}

/// Target size that fits `dimensions` inside `bounds` keeping the aspect
/// ratio. `None` when the image already fits; images are never upscaled.
pub fn fit_within(dimensions: (u32, u32), bounds: (u32, u32)) -> Option<(u32, u32)> {
    let (width, height) = dimensions;
    let (max_width, max_height) = bounds;
    if width <= max_width && height <= max_height {
        return None;
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    Some((new_width, new_height))
}

/// Linear contrast stretch. The darkest and brightest `clip_percent` of
/// pixels are ignored when picking the input range, which is then mapped onto
/// the full 0-255 range. Flat images are returned unchanged.
pub fn normalize_intensity(image: &GrayImage, clip_percent: f32) -> GrayImage {
    let total = (image.width() as u64) * (image.height() as u64);
    if total == 0 {
        return image.clone();
    }

    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let clip = ((total as f64) * (clip_percent.max(0.0) as f64) / 100.0) as u64;

    let mut cumulative = 0u64;
    let mut low = 0u8;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative > clip {
            low = value as u8;
            break;
        }
    }

    cumulative = 0;
    let mut high = 255u8;
    for (value, count) in histogram.iter().enumerate().rev() {
        cumulative += count;
        if cumulative > clip {
            high = value as u8;
            break;
        }
    }

    if high <= low {
        return image.clone();
    }

    let range = (high - low) as f32;
    let mut lookup = [0u8; 256];
    for (value, slot) in lookup.iter_mut().enumerate() {
        let stretched = ((value as f32 - low as f32) * 255.0 / range).round();
        *slot = stretched.clamp(0.0, 255.0) as u8;
    }

    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = lookup[pixel[0] as usize];
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let shade = if (x / 10 + y / 10) % 2 == 0 { 90 } else { 170 };
            *pixel = Rgb([shade, shade, shade]);
        }
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_fit_within_never_upscales() {
        assert_eq!(fit_within((400, 300), (2000, 2000)), None);
        assert_eq!(fit_within((2000, 2000), (2000, 2000)), None);
    }

    #[test]
    fn test_fit_within_keeps_aspect_ratio() {
        assert_eq!(fit_within((4000, 2000), (2000, 2000)), Some((2000, 1000)));
        assert_eq!(fit_within((1000, 3000), (2000, 2000)), Some((667, 2000)));
    }

    #[test]
    fn test_normalize_stretches_to_full_range() {
        let mut img = GrayImage::new(10, 1);
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([100 + (x as u8) * 5]));
        }
        let normalized = normalize_intensity(&img, 0.0);
        assert_eq!(normalized.get_pixel(0, 0)[0], 0);
        assert_eq!(normalized.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn test_normalize_leaves_flat_image_alone() {
        let img = GrayImage::from_pixel(4, 4, Luma([128]));
        assert_eq!(normalize_intensity(&img, 1.0), img);
    }

    #[test]
    fn test_preprocess_writes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_image(dir.path(), "receipt.png", 120, 80);

        let preprocessor = ImagePreprocessor::default();
        let processed = preprocessor.preprocess(&source).unwrap();
        let processed_path = processed.path().to_path_buf();

        assert!(processed_path.exists());
        assert_eq!(processed_path.parent(), source.parent());
        assert_ne!(processed_path, source);
        assert_eq!(processed.original_dimensions, (120, 80));
        assert_eq!(processed.final_dimensions, (120, 80));

        let reloaded = image::open(&processed_path).unwrap();
        assert_eq!(reloaded.color(), image::ColorType::L8);

        drop(processed);
        assert!(!processed_path.exists());
        assert!(source.exists());
    }

    #[test]
    fn test_preprocess_bounds_large_images() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_image(dir.path(), "wide.jpg", 300, 150);

        let preprocessor = ImagePreprocessor::new(PreprocessConfig {
            max_width: 100,
            max_height: 100,
            ..Default::default()
        });
        let processed = preprocessor.preprocess(&source).unwrap();
        assert_eq!(processed.final_dimensions, (100, 50));
    }

    #[test]
    fn test_preprocess_rejects_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fake.png");
        std::fs::write(&source, b"definitely not a png").unwrap();

        let result = ImagePreprocessor::default().preprocess(&source);
        assert!(matches!(result, Err(ReceiptError::ImageProcessing(_))));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".receipt-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_render_after_guard_dropped_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_image(dir.path(), "late.png", 50, 50);
        let preprocessor = ImagePreprocessor::default();

        let (guard, file) = preprocessor.create_output(&source).unwrap();
        let output_path = guard.path().to_path_buf();
        assert!(output_path.exists());
        drop(guard);
        assert!(!output_path.exists());

        let stats = preprocessor.render(&source, file).unwrap();
        assert_eq!(stats.final_dimensions, (50, 50));
        assert!(!output_path.exists());
    }

    #[test]
    fn test_concurrent_outputs_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_image(dir.path(), "same.png", 40, 40);
        let preprocessor = ImagePreprocessor::default();

        let first = preprocessor.preprocess(&source).unwrap();
        let second = preprocessor.preprocess(&source).unwrap();
        assert_ne!(first.path(), second.path());
    }
}
