//! PaddleOCR backend on ONNX Runtime
//!
//! Two-stage pipeline: a DB detector finds text lines, then a per-language
//! CRNN recognizer reads each cropped line.

pub mod det;
pub mod rec;
pub mod tensor;

use image::DynamicImage;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{LanguageBinding, ModelsConfig};
use crate::error::OcrError;
use crate::vision::models::{ModelAsset, ModelManager};
use crate::vision::preprocess::DEFAULT_MAX_LONG_SIDE;
use crate::vision::{ModelLoader, RawRegion, TextRecognizer};

pub use det::{DetectedBox, TextDetector};
pub use rec::{CtcDecoder, LineRecognizer};

/// Detection + recognition sessions for one language.
///
/// ONNX sessions need exclusive access to run, so each stage sits behind its
/// own lock; detection of the next image can overlap recognition of the
/// previous one.
pub struct PaddleOcrEngine {
    detector: Mutex<TextDetector>,
    recognizer: Mutex<LineRecognizer>,
}

impl PaddleOcrEngine {
    pub fn new(detector: TextDetector, recognizer: LineRecognizer) -> Self {
        Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        }
    }

    /// Load the sessions from local model files
    pub fn from_files(
        det_model: &Path,
        rec_model: &Path,
        dictionary: &Path,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        let detector = TextDetector::new(det_model, intra_threads, DEFAULT_MAX_LONG_SIDE)?;
        let recognizer = LineRecognizer::new(rec_model, dictionary, intra_threads)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl TextRecognizer for PaddleOcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, OcrError> {
        let rgb = image.to_rgb8();
        let boxes = self.detector.lock().detect(&rgb)?;
        debug!("Detected {} text boxes", boxes.len());

        let mut recognizer = self.recognizer.lock();
        let mut regions = Vec::with_capacity(boxes.len());
        for detected in boxes {
            let Some((x, y, w, h)) = detected.crop_rect(rgb.width(), rgb.height()) else {
                continue;
            };
            let crop = image::imageops::crop_imm(&rgb, x, y, w, h).to_image();
            let (text, confidence) = recognizer.recognize(&crop)?;

            regions.push(RawRegion {
                text,
                confidence,
                polygon: detected.points.to_vec(),
            });
        }

        Ok(regions)
    }
}

/// Builds `PaddleOcrEngine`s, fetching model assets on demand
pub struct PaddleModelLoader {
    manager: ModelManager,
    models: ModelsConfig,
    intra_threads: usize,
}

impl PaddleModelLoader {
    pub fn new(manager: ModelManager, models: ModelsConfig, intra_threads: usize) -> Self {
        Self {
            manager,
            models,
            intra_threads,
        }
    }

    fn load_engine(&self, binding: &LanguageBinding) -> anyhow::Result<PaddleOcrEngine> {
        let det = self.manager.ensure_asset(&ModelAsset::detection(&self.models))?;
        let rec = self
            .manager
            .ensure_asset(&ModelAsset::recognition(&self.models, &binding.model_family))?;
        let dict = self
            .manager
            .ensure_asset(&ModelAsset::dictionary(&self.models, &binding.model_family))?;

        PaddleOcrEngine::from_files(&det, &rec, &dict, self.intra_threads)
    }
}

impl ModelLoader for PaddleModelLoader {
    fn load(&self, code: &str, binding: &LanguageBinding) -> Result<Box<dyn TextRecognizer>, OcrError> {
        info!(
            "Building PaddleOCR engine for '{}' (model family '{}')",
            code, binding.model_family
        );
        let engine = self
            .load_engine(binding)
            .map_err(|e| OcrError::ModelLoad(format!("{}: {:#}", code, e)))?;
        Ok(Box::new(engine))
    }
}
