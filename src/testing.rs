//! In-memory recognizer doubles for unit tests

use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LanguageBinding;
use crate::error::OcrError;
use crate::vision::{ModelLoader, RawRegion, TextRecognizer};

/// Observations shared between a loader and every recognizer it builds
#[derive(Default)]
pub struct Tracker {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    seen_sizes: Mutex<Vec<(u32, u32)>>,
}

impl Tracker {
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_sizes(&self) -> Vec<(u32, u32)> {
        self.seen_sizes.lock().clone()
    }
}

/// Returns two regions per image: the language on top, the size below
pub struct FakeRecognizer {
    code: String,
    delay: Duration,
    fail_width: Option<u32>,
    tracker: Arc<Tracker>,
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, OcrError> {
        let now = self.tracker.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.tracker.calls.fetch_add(1, Ordering::SeqCst);
        self.tracker.seen_sizes.lock().push((image.width(), image.height()));

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Some(image.width()) == self.fail_width {
            return Err(OcrError::InferenceFailure("simulated failure".to_string()));
        }

        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![
            RawRegion {
                text: format!("{}x{}", image.width(), image.height()),
                confidence: 0.75,
                polygon: vec![(0.0, h / 2.0), (w, h / 2.0), (w, h), (0.0, h)],
            },
            RawRegion {
                text: format!("lang {}", self.code),
                confidence: 0.95,
                polygon: vec![(0.0, 0.0), (w, 0.0), (w, h / 2.0), (0.0, h / 2.0)],
            },
        ])
    }
}

/// Counts loads per language and hands out `FakeRecognizer`s
#[derive(Default)]
pub struct FakeLoader {
    load_delay: Duration,
    recognize_delay: Duration,
    fail_width: Option<u32>,
    loads: Mutex<HashMap<String, usize>>,
    fail_next: Mutex<HashSet<String>>,
    pub tracker: Arc<Tracker>,
}

impl FakeLoader {
    pub fn with_delay(load_delay: Duration) -> Self {
        Self {
            load_delay,
            ..Self::default()
        }
    }

    /// Recognizers sleep this long per call
    pub fn recognize_delay(mut self, delay: Duration) -> Self {
        self.recognize_delay = delay;
        self
    }

    /// Recognizers fail on images of this width
    pub fn fail_on_width(mut self, width: u32) -> Self {
        self.fail_width = Some(width);
        self
    }

    pub fn fail_next_load(&self, code: &str) {
        self.fail_next.lock().insert(code.to_string());
    }

    pub fn load_count(&self, code: &str) -> usize {
        self.loads.lock().get(code).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self, code: &str, _binding: &LanguageBinding) -> Result<Box<dyn TextRecognizer>, OcrError> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self.fail_next.lock().remove(code) {
            return Err(OcrError::ModelLoad(format!("{}: simulated load failure", code)));
        }

        *self.loads.lock().entry(code.to_string()).or_default() += 1;
        Ok(Box::new(FakeRecognizer {
            code: code.to_string(),
            delay: self.recognize_delay,
            fail_width: self.fail_width,
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

/// Encode a solid image as PNG bytes
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([250, 250, 250]));
    let mut buffer = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}
