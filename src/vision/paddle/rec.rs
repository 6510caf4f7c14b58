//! CRNN text-line recognition with greedy CTC decoding

use image::RgbImage;
use ndarray::ArrayView2;
use ort::value::Tensor;
use std::path::Path;

use super::tensor::recognition_input;
use crate::error::OcrError;
use crate::vision::OnnxSession;

/// Index of the CTC blank symbol in the model output
const BLANK: usize = 0;

/// Maps CTC output indices to characters
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    charset: Vec<String>,
}

impl CtcDecoder {
    /// Build from a PaddleOCR dictionary: one character per line, with the
    /// space character appended after the last entry
    pub fn from_dictionary(content: &str) -> Result<Self, OcrError> {
        let mut charset: Vec<String> = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect();
        if charset.is_empty() {
            return Err(OcrError::ModelLoad("character dictionary is empty".to_string()));
        }
        charset.push(" ".to_string());
        Ok(Self { charset })
    }

    pub fn load(path: &Path) -> Result<Self, OcrError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OcrError::ModelLoad(format!("dictionary {:?}: {}", path, e)))?;
        Self::from_dictionary(&content)
    }

    pub fn len(&self) -> usize {
        self.charset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charset.is_empty()
    }

    /// Greedy decode of a [time, classes] probability matrix. Repeated
    /// indices collapse and blanks separate; confidence is the mean
    /// probability of the emitted characters.
    pub fn decode(&self, probs: ArrayView2<f32>) -> (String, f32) {
        let mut text = String::new();
        let mut confidence_sum = 0.0f32;
        let mut emitted = 0usize;
        let mut last: Option<usize> = None;

        for row in probs.rows() {
            let (best, best_prob) = row
                .iter()
                .enumerate()
                .fold((BLANK, f32::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });

            if best != BLANK && Some(best) != last {
                if let Some(ch) = self.charset.get(best - 1) {
                    text.push_str(ch);
                    confidence_sum += best_prob;
                    emitted += 1;
                }
            }
            last = Some(best);
        }

        let confidence = if emitted > 0 {
            (confidence_sum / emitted as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (text.trim().to_string(), confidence)
    }
}

/// Text-line recognizer backed by an ONNX CRNN model
pub struct LineRecognizer {
    session: OnnxSession,
    decoder: CtcDecoder,
}

impl LineRecognizer {
    pub fn new(model_path: &Path, dict_path: &Path, intra_threads: usize) -> anyhow::Result<Self> {
        let decoder = CtcDecoder::load(dict_path)?;
        let session = OnnxSession::new(model_path, intra_threads)?;
        tracing::debug!("Loaded dictionary with {} characters", decoder.len());
        Ok(Self { session, decoder })
    }

    /// Recognize the text of one cropped line
    pub fn recognize(&mut self, crop: &RgbImage) -> Result<(String, f32), OcrError> {
        let tensor = Tensor::from_array(recognition_input(crop))
            .map_err(|e| OcrError::InferenceFailure(e.to_string()))?;
        let outputs = self
            .session
            .session_mut()
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::InferenceFailure(format!("recognition: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OcrError::InferenceFailure(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let (steps, classes) = match dims.as_slice() {
            [_, steps, classes] => (*steps, *classes),
            _ => {
                return Err(OcrError::InferenceFailure(format!(
                    "unexpected recognition output shape {:?}",
                    dims
                )))
            }
        };
        let first = data
            .get(..steps * classes)
            .ok_or_else(|| OcrError::InferenceFailure("empty recognition output".to_string()))?;
        let probs = ArrayView2::from_shape((steps, classes), first)
            .map_err(|e| OcrError::InferenceFailure(e.to_string()))?;

        Ok(self.decoder.decode(probs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// One-hot rows with the given probability at each chosen index
    fn probs(indices: &[usize], classes: usize, p: f32) -> Array2<f32> {
        let mut m = Array2::<f32>::from_elem((indices.len(), classes), (1.0 - p) / classes as f32);
        for (t, &i) in indices.iter().enumerate() {
            m[[t, i]] = p;
        }
        m
    }

    #[test]
    fn test_dictionary_appends_space() {
        let decoder = CtcDecoder::from_dictionary("क\nख\r\nग\n").unwrap();
        assert_eq!(decoder.len(), 4);
        assert!(CtcDecoder::from_dictionary("\n\n").is_err());
    }

    #[test]
    fn test_decode_collapses_repeats_and_blanks() {
        let decoder = CtcDecoder::from_dictionary("क\nख\nग").unwrap();
        // क क _ क ख ख _ ग
        let m = probs(&[1, 1, 0, 1, 2, 2, 0, 3], 5, 0.9);

        let (text, confidence) = decoder.decode(m.view());
        assert_eq!(text, "ककखग");
        assert!((confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_space_and_trim() {
        let decoder = CtcDecoder::from_dictionary("a\nb").unwrap();
        // space is index 3 (after a=1, b=2)
        let m = probs(&[3, 1, 3, 2, 3], 4, 0.8);
        assert_eq!(decoder.decode(m.view()).0, "a b");
    }

    #[test]
    fn test_decode_all_blank() {
        let decoder = CtcDecoder::from_dictionary("a").unwrap();
        let m = probs(&[0, 0, 0], 3, 0.99);
        assert_eq!(decoder.decode(m.view()), (String::new(), 0.0));
    }
}
