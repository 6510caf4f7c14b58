//! Accuracy scoring and summary statistics

/// How OCR output and ground truth are reduced before they are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextNormalization {
    /// Every run of whitespace (newlines included) becomes one space and
    /// leading/trailing whitespace is dropped; characters are kept as-is
    SingleLine,
    /// No change
    Raw,
}

impl TextNormalization {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::SingleLine => text.split_whitespace().collect::<Vec<_>>().join(" "),
            Self::Raw => text.to_string(),
        }
    }
}

/// Rule behind every CER and recorded text length
pub const SCORING_NORMALIZATION: TextNormalization = TextNormalization::SingleLine;

/// Apply [`SCORING_NORMALIZATION`]
pub fn normalize_text(text: &str) -> String {
    SCORING_NORMALIZATION.apply(text)
}

/// Length in characters (not bytes)
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Length in characters of the text as it is scored
pub fn scored_len(text: &str) -> usize {
    char_len(&normalize_text(text))
}

/// Character error rate of `ocr` against `ground_truth` after normalizing
/// both: `edit_distance / max(1, len(ground_truth))`, capped at 1
pub fn character_error_rate(ocr: &str, ground_truth: &str) -> f64 {
    let ocr = normalize_text(ocr);
    let truth = normalize_text(ground_truth);

    let distance = strsim::levenshtein(&ocr, &truth);
    let cer = distance as f64 / char_len(&truth).max(1) as f64;
    cer.min(1.0)
}

/// `1 - CER`, always within [0, 1]
pub fn accuracy(ocr: &str, ground_truth: &str) -> f64 {
    (1.0 - character_error_rate(ocr, ground_truth)).clamp(0.0, 1.0)
}

/// Percentile by linear interpolation between closest ranks over sorted
/// values: `k = (n - 1) * p / 100`, interpolate between `x[floor k]` and
/// `x[ceil k]`
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let k = (sorted.len() - 1) as f64 * p.clamp(0.0, 100.0) / 100.0;
    let lo = k.floor() as usize;
    let hi = k.ceil() as usize;
    Some(sorted[lo] + (k - lo as f64) * (sorted[hi] - sorted[lo]))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Descriptive statistics over a set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p95: f64,
}

impl Stats {
    /// `None` for an empty set
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            mean: mean(&sorted)?,
            min: *sorted.first()?,
            max: *sorted.last()?,
            median: percentile(&sorted, 50.0)?,
            p95: percentile(&sorted, 95.0)?,
        })
    }
}
