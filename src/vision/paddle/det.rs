//! DB (Differentiable Binarization) text detection

use image::RgbImage;
use ndarray::{Array2, ArrayView2};
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

use super::tensor::detection_input;
use crate::error::OcrError;
use crate::vision::OnnxSession;

/// Probability above which a pixel counts as text
const THRESH: f32 = 0.3;
/// Minimum mean probability for a component to be kept
const BOX_THRESH: f32 = 0.5;
/// Components thinner than this (in map pixels) are noise
const MIN_SIZE: f32 = 5.0;
/// DB shrinks text kernels during training; boxes are grown back by this ratio
const UNCLIP_RATIO: f32 = 1.6;

/// A detected text box in original image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBox {
    /// Clockwise from top-left
    pub points: [(f32, f32); 4],
    pub score: f32,
}

impl DetectedBox {
    /// Integer crop rectangle (x, y, width, height) clamped to the image
    pub fn crop_rect(&self, image_w: u32, image_h: u32) -> Option<(u32, u32, u32, u32)> {
        let min_x = self.points.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let min_y = self.points.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_x = self.points.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let max_y = self.points.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().max(0.0) as u32).min(image_w);
        let y1 = (max_y.ceil().max(0.0) as u32).min(image_h);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Text detector backed by an ONNX DB model
pub struct TextDetector {
    session: OnnxSession,
    limit_side: u32,
}

impl TextDetector {
    pub fn new(model_path: &Path, intra_threads: usize, limit_side: u32) -> anyhow::Result<Self> {
        Ok(Self {
            session: OnnxSession::new(model_path, intra_threads)?,
            limit_side,
        })
    }

    /// Detect text boxes in an image
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedBox>, OcrError> {
        let (input, input_w, input_h) = detection_input(image, self.limit_side);

        let tensor =
            Tensor::from_array(input).map_err(|e| OcrError::InferenceFailure(e.to_string()))?;
        let outputs = self
            .session
            .session_mut()
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::InferenceFailure(format!("detection: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OcrError::InferenceFailure(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        // Output is [N, 1, H, W] or [N, H, W]; the map is the trailing two axes
        let (map_h, map_w) = match dims.as_slice() {
            [.., h, w] if dims.len() >= 3 => (*h, *w),
            _ => {
                return Err(OcrError::InferenceFailure(format!(
                    "unexpected detection output shape {:?}",
                    dims
                )))
            }
        };
        let first_map = data
            .get(..map_h * map_w)
            .ok_or_else(|| OcrError::InferenceFailure("empty detection output".to_string()))?;
        let prob = ArrayView2::from_shape((map_h, map_w), first_map)
            .map_err(|e| OcrError::InferenceFailure(e.to_string()))?;

        debug!(
            "Detection map {}x{} for input {}x{}",
            map_w, map_h, input_w, input_h
        );
        Ok(boxes_from_probability_map(prob, image.dimensions()))
    }
}

/// Turn a probability map into boxes in original image coordinates.
///
/// Thresholds the map, flood-fills 4-connected components, drops small or
/// low-confidence components, expands the survivors and rescales them.
pub fn boxes_from_probability_map(
    prob: ArrayView2<f32>,
    original_size: (u32, u32),
) -> Vec<DetectedBox> {
    let (h, w) = prob.dim();
    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut boxes = Vec::new();

    let scale_x = original_size.0 as f32 / w.max(1) as f32;
    let scale_y = original_size.1 as f32 / h.max(1) as f32;

    for start_y in 0..h {
        for start_x in 0..w {
            if prob[[start_y, start_x]] <= THRESH || visited[[start_y, start_x]] {
                continue;
            }

            let (mut min_x, mut max_x, mut min_y, mut max_y) = (start_x, start_x, start_y, start_y);
            let mut score_sum = 0.0f32;
            let mut count = 0usize;
            let mut stack = vec![(start_x, start_y)];
            visited[[start_y, start_x]] = true;

            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                score_sum += prob[[y, x]];
                count += 1;

                let neighbors = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < w && ny < h && !visited[[ny, nx]] && prob[[ny, nx]] > THRESH {
                        visited[[ny, nx]] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            let box_w = (max_x - min_x) as f32;
            let box_h = (max_y - min_y) as f32;
            if box_w < MIN_SIZE || box_h < MIN_SIZE {
                continue;
            }
            let score = score_sum / count as f32;
            if score < BOX_THRESH {
                continue;
            }

            let expand_w = box_w * (UNCLIP_RATIO - 1.0) / 2.0;
            let expand_h = box_h * (UNCLIP_RATIO - 1.0) / 2.0;
            let x1 = (min_x as f32 - expand_w).max(0.0) * scale_x;
            let y1 = (min_y as f32 - expand_h).max(0.0) * scale_y;
            let x2 = (max_x as f32 + expand_w).min(w as f32 - 1.0) * scale_x;
            let y2 = (max_y as f32 + expand_h).min(h as f32 - 1.0) * scale_y;

            boxes.push(DetectedBox {
                points: [(x1, y1), (x2, y1), (x2, y2), (x1, y2)],
                score,
            });
        }
    }

    boxes
}
