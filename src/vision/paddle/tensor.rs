//! Image to tensor conversion for PaddleOCR models

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use ndarray::Array4;

/// Detection inputs must have sides divisible by this
const DET_STRIDE: u32 = 32;

/// Recognition input height
pub const REC_HEIGHT: u32 = 48;
/// Recognition crops narrower than this are padded
pub const REC_MIN_WIDTH: u32 = 320;
/// Recognition crops wider than this are squeezed
pub const REC_MAX_WIDTH: u32 = 3200;

/// Per-channel normalization applied after scaling pixels to 0-1
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Normalization {
    /// ImageNet statistics used by the DB detector
    pub const DETECTION: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    /// Maps [0, 255] to [-1, 1] for the CRNN recognizer
    pub const RECOGNITION: Self = Self {
        mean: [0.5, 0.5, 0.5],
        std: [0.5, 0.5, 0.5],
    };
}

/// Convert an RGB image to a normalized NCHW tensor (batch size 1)
pub fn to_nchw(image: &RgbImage, norm: &Normalization) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - norm.mean[c]) / norm.std[c];
        }
    }

    tensor
}

/// Detector input size: long side capped at `limit_side`, both sides rounded
/// to the stride
pub fn detection_size(width: u32, height: u32, limit_side: u32) -> (u32, u32) {
    let long_side = width.max(height).max(1);
    let ratio = if long_side > limit_side {
        limit_side as f32 / long_side as f32
    } else {
        1.0
    };

    let round = |v: u32| {
        let scaled = (v as f32 * ratio).round() as u32;
        (((scaled + DET_STRIDE / 2) / DET_STRIDE) * DET_STRIDE).max(DET_STRIDE)
    };

    (round(width), round(height))
}

/// Prepare the detector input; returns the tensor and its width and height
pub fn detection_input(image: &RgbImage, limit_side: u32) -> (Array4<f32>, u32, u32) {
    let (w, h) = detection_size(image.width(), image.height(), limit_side);
    let resized = image::imageops::resize(image, w, h, FilterType::Triangle);
    (to_nchw(&resized, &Normalization::DETECTION), w, h)
}

/// Prepare a text-line crop for the recognizer: fixed height, proportional
/// width, gray padding on the right up to the minimum width
pub fn recognition_input(crop: &RgbImage) -> Array4<f32> {
    let (w, h) = crop.dimensions();
    let ratio = REC_HEIGHT as f32 / h.max(1) as f32;
    let new_w = ((w as f32 * ratio).ceil() as u32).clamp(1, REC_MAX_WIDTH);

    let resized = image::imageops::resize(crop, new_w, REC_HEIGHT, FilterType::Triangle);

    let padded = if new_w < REC_MIN_WIDTH {
        let mut canvas = RgbImage::from_pixel(REC_MIN_WIDTH, REC_HEIGHT, Rgb([127, 127, 127]));
        image::imageops::overlay(&mut canvas, &resized, 0, 0);
        canvas
    } else {
        resized
    };

    to_nchw(&padded, &Normalization::RECOGNITION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_size_rounds_to_stride() {
        assert_eq!(detection_size(640, 480, 960), (640, 480));
        assert_eq!(detection_size(1920, 1080, 960), (960, 544));
        assert_eq!(detection_size(10, 10, 960), (32, 32));
    }

    #[test]
    fn test_to_nchw_normalizes_channels() {
        let image = RgbImage::from_pixel(2, 3, Rgb([255, 0, 127]));
        let tensor = to_nchw(&image, &Normalization::RECOGNITION);

        assert_eq!(tensor.shape(), &[1, 3, 3, 2]);
        assert!((tensor[[0, 0, 1, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 2, 0]] + 1.0).abs() < 1e-6);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn test_recognition_input_pads_short_crops() {
        let crop = RgbImage::from_pixel(40, 24, Rgb([0, 0, 0]));
        let tensor = recognition_input(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 48, 320]);

        // Padding is mid-gray, which normalizes to ~0
        assert!(tensor[[0, 0, 10, 300]].abs() < 0.01);
        assert!((tensor[[0, 0, 10, 10]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_recognition_input_keeps_wide_crops() {
        let crop = RgbImage::from_pixel(800, 48, Rgb([255, 255, 255]));
        let tensor = recognition_input(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 48, 800]);
    }
}
