//! Input resolution policy for the text detector
//!
//! The detector resizes every input so its long side fits its own fixed
//! target, so pixels beyond that target are discarded anyway. Oversized
//! inputs also fragment text regions below the detection thresholds.
//! Images whose long side exceeds the limit are downscaled with a Lanczos
//! filter; everything else is passed through untouched.

use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

use crate::error::OcrError;

/// Long side the detection model operates at
pub const DEFAULT_MAX_LONG_SIDE: u32 = 960;

/// Outcome of the resize decision for a given size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizePlan {
    /// Image is already within range
    Keep,
    /// Image must be resampled to these dimensions
    Resize { width: u32, height: u32, scale: f64 },
}

/// Decide whether (and to what size) an image must be resized.
/// Pure over dimensions so the threshold logic needs no pixel data.
pub fn plan_resize(width: u32, height: u32, max_long_side: u32) -> ResizePlan {
    let long_side = width.max(height);
    if long_side <= max_long_side {
        return ResizePlan::Keep;
    }

    let scale = max_long_side as f64 / long_side as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);

    ResizePlan::Resize {
        width: scaled(width),
        height: scaled(height),
        scale,
    }
}

/// Normalizes images to the detector's efficient operating resolution
#[derive(Debug, Clone, Copy)]
pub struct PreprocessingPolicy {
    max_long_side: u32,
}

impl Default for PreprocessingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LONG_SIDE)
    }
}

impl PreprocessingPolicy {
    pub fn new(max_long_side: u32) -> Self {
        Self {
            max_long_side: max_long_side.max(1),
        }
    }

    pub fn max_long_side(&self) -> u32 {
        self.max_long_side
    }

    /// Prepare an image for inference. Qualifying images are returned as-is
    /// (the same buffer, no copy).
    pub fn prepare(&self, image: DynamicImage) -> DynamicImage {
        match plan_resize(image.width(), image.height(), self.max_long_side) {
            ResizePlan::Keep => image,
            ResizePlan::Resize { width, height, scale } => {
                debug!(
                    "Downscaling {}x{} -> {}x{} (scale {:.4})",
                    image.width(),
                    image.height(),
                    width,
                    height,
                    scale
                );
                image.resize_exact(width, height, FilterType::Lanczos3)
            }
        }
    }
}

/// Decode image bytes
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, OcrError> {
    image::load_from_memory(data).map_err(|e| OcrError::InvalidImage(e.to_string()))
}

/// Read and decode an image file, rejecting files above `max_bytes`
pub fn load_image(path: &Path, max_bytes: u64) -> Result<DynamicImage, OcrError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(OcrError::InvalidImage(format!(
            "File size ({:.1}MB) exceeds {}MB limit",
            size as f64 / (1024.0 * 1024.0),
            max_bytes / (1024 * 1024)
        )));
    }

    let data = std::fs::read(path)?;
    decode_image(&data)
}
