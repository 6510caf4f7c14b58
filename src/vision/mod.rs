//! Vision/OCR Layer
//!
//! Text recognition types and the pieces that turn an image into regions:
//! - `PreprocessingPolicy` adapts input resolution to the detector's range
//! - `ModelInstancePool` owns one recognizer per language
//! - `paddle` runs PaddleOCR models via ONNX Runtime
//! - `visualize` draws region polygons for annotated output

pub mod models;
pub mod paddle;
pub mod pool;
pub mod preprocess;
pub mod visualize;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::LanguageBinding;
use crate::error::OcrError;

pub use models::{ModelAsset, ModelManager, OnnxSession};
pub use paddle::{PaddleModelLoader, PaddleOcrEngine};
pub use pool::{ModelInstance, ModelInstancePool};
pub use preprocess::{decode_image, load_image, plan_resize, PreprocessingPolicy, ResizePlan};

/// Region as reported by a recognizer, in detection order
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    /// Recognized text
    pub text: String,
    /// Recognition confidence
    pub confidence: f32,
    /// Bounding polygon points
    pub polygon: Vec<(f32, f32)>,
}

/// A detected text region with its recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionRegion {
    /// Recognized text
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Clockwise polygon vertices (x, y)
    #[serde(rename = "bounding_box")]
    pub polygon: Vec<(f32, f32)>,
}

/// Result of recognizing one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Regions in reading order
    #[serde(rename = "results")]
    pub regions: Vec<RecognitionRegion>,
    /// Region texts joined by newlines
    pub full_text: String,
    /// Wall-clock inference time
    pub processing_time_seconds: f64,
}

impl RecognitionResult {
    /// Order raw regions for reading and assemble the full text
    pub fn from_raw(raw: Vec<RawRegion>, processing_time_seconds: f64) -> Self {
        let regions: Vec<RecognitionRegion> = sort_reading_order(raw)
            .into_iter()
            .filter(|r| !r.text.trim().is_empty())
            .map(|r| RecognitionRegion {
                text: r.text,
                confidence: r.confidence.clamp(0.0, 1.0),
                polygon: r.polygon,
            })
            .collect();

        let full_text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            regions,
            full_text,
            processing_time_seconds,
        }
    }

    /// Mean region confidence, `None` when nothing was detected
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.regions.is_empty() {
            return None;
        }
        let sum: f64 = self.regions.iter().map(|r| r.confidence as f64).sum();
        Some(sum / self.regions.len() as f64)
    }
}

/// Opaque recognition capability: image in, regions out
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, OcrError>;
}

/// Builds a recognizer for one language binding (expensive)
pub trait ModelLoader: Send + Sync {
    fn load(&self, code: &str, binding: &LanguageBinding) -> Result<Box<dyn TextRecognizer>, OcrError>;
}

/// Sort regions top-to-bottom by top edge, then left-to-right by left edge.
/// The sort is stable, so exact ties keep detection order.
pub fn sort_reading_order(mut regions: Vec<RawRegion>) -> Vec<RawRegion> {
    regions.sort_by(|a, b| {
        let (ax, ay) = top_left(&a.polygon);
        let (bx, by) = top_left(&b.polygon);
        ay.total_cmp(&by).then_with(|| ax.total_cmp(&bx))
    });
    regions
}

/// (left edge, top edge) of a polygon
fn top_left(polygon: &[(f32, f32)]) -> (f32, f32) {
    if polygon.is_empty() {
        return (f32::INFINITY, f32::INFINITY);
    }
    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    (min_x, min_y)
}

/// Convert polygon points to bounding box (x, y, width, height)
pub fn polygon_to_bounds(polygon: &[(f32, f32)]) -> (u32, u32, u32, u32) {
    if polygon.is_empty() {
        return (0, 0, 0, 0);
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    (
        min_x.max(0.0) as u32,
        min_y.max(0.0) as u32,
        (max_x - min_x).max(0.0) as u32,
        (max_y - min_y).max(0.0) as u32,
    )
}
