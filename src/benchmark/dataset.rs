//! Labeled dataset discovery and reproducible sampling

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Image file extension of dataset pages
const IMAGE_EXTENSION: &str = "jpg";
/// Ground-truth file extension
const TRUTH_EXTENSION: &str = "txt";

/// An image paired with its ground-truth text file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSample {
    pub image_path: PathBuf,
    pub ground_truth_path: PathBuf,
    pub language: String,
}

impl LabeledSample {
    pub fn image_file(&self) -> String {
        file_name(&self.image_path)
    }

    pub fn ground_truth_file(&self) -> String {
        file_name(&self.ground_truth_path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Find every image with a same-stem `.txt` file in the given directories.
/// Missing directories are skipped with a warning. Each directory's pairs
/// are sorted by file name and directories keep their configured order.
pub fn discover_samples(language: &str, dirs: &[PathBuf]) -> Vec<LabeledSample> {
    let mut samples = Vec::new();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Dataset directory {:?} unavailable: {}", dir, e);
                continue;
            }
        };

        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(IMAGE_EXTENSION))
            })
            .collect();
        images.sort();

        samples.extend(images.into_iter().filter_map(|image_path| {
            let ground_truth_path = image_path.with_extension(TRUTH_EXTENSION);
            ground_truth_path.is_file().then(|| LabeledSample {
                image_path,
                ground_truth_path,
                language: language.to_string(),
            })
        }));
    }

    info!("[{}] Found {} image/ground-truth pairs", language, samples.len());
    samples
}

/// Deterministically pick `min(sample_size, available)` samples. The same
/// seed over the same available set always yields the same selection.
pub fn sample(available: &[LabeledSample], sample_size: usize, seed: u64) -> Vec<LabeledSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = sample_size.min(available.len());
    available.choose_multiple(&mut rng, n).cloned().collect()
}
