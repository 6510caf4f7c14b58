//! Recognition artifact persistence
//!
//! Layout:
//! - `{output_base}/single/{lang}/{timestamp}_{stem}_{content}/`
//! - `{output_base}/batch/{lang}/{timestamp}_{folder}/{stem}/`
//!
//! Each recognition directory holds `result.json`, `extracted_text.txt` and
//! optionally `annotated.png`; a batch directory also holds `batch_summary.json`.

use image::RgbImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::OcrError;
use crate::vision::RecognitionRegion;

pub const RESULT_FILE: &str = "result.json";
pub const TEXT_FILE: &str = "extracted_text.txt";
pub const ANNOTATED_FILE: &str = "annotated.png";
pub const MANIFEST_FILE: &str = "batch_summary.json";

/// Leaf creation attempts before giving up on a unique name
const MAX_DIR_ATTEMPTS: usize = 16;

/// Structured result document written per recognition
#[derive(Debug, Serialize)]
pub struct ResultDocument<'a> {
    pub filename: &'a str,
    pub language: &'a str,
    pub processing_time_seconds: f64,
    pub results: &'a [RecognitionRegion],
    pub full_text: &'a str,
}

/// Timestamp used as the leading part of output directory names
fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// File stem of a name, or `image` when there is none
fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}

/// First 8 hex digits of the SHA-256 of `data`
pub fn short_content_id(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{:x}", digest)[..8].to_string()
}

/// Create `parent/base` exclusively; on collision retry with a random suffix
fn create_unique_dir(parent: &Path, base: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(parent)?;

    let mut candidate = parent.join(base);
    for _ in 0..MAX_DIR_ATTEMPTS {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                candidate = parent.join(format!("{}_{}", base, &suffix[..8]));
            }
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("could not allocate a unique directory under {}", parent.display()),
    ))
}

/// Create a fresh directory for one single-image recognition
pub fn create_single_output_dir(
    single_root: &Path,
    language: &str,
    filename: &str,
    content_id: &str,
) -> std::io::Result<PathBuf> {
    let name = format!("{}_{}_{}", timestamp(), file_stem(filename), content_id);
    let dir = create_unique_dir(&single_root.join(language), &name)?;
    debug!("Created output directory {:?}", dir);
    Ok(dir)
}

/// Create the output directory for one batch run
pub fn create_batch_output_dir(
    batch_root: &Path,
    language: &str,
    folder: &Path,
) -> std::io::Result<PathBuf> {
    let folder_name = folder
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("folder");
    let name = format!("{}_{}", timestamp(), folder_name);
    let dir = create_unique_dir(&batch_root.join(language), &name)?;
    debug!("Created batch output directory {:?}", dir);
    Ok(dir)
}

/// Create a per-item directory inside a batch directory, numbering stem collisions
pub fn create_item_output_dir(batch_dir: &Path, filename: &str) -> std::io::Result<PathBuf> {
    let stem = file_stem(filename);
    let mut candidate = batch_dir.join(&stem);
    let mut n = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                n += 1;
                candidate = batch_dir.join(format!("{}_{}", stem, n));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `write` against a freshly created output directory. On failure the
/// directory is removed so only complete recognitions leave one behind.
pub fn fill_output_dir<F>(dir: PathBuf, write: F) -> Result<PathBuf, OcrError>
where
    F: FnOnce(&Path) -> Result<(), OcrError>,
{
    match write(&dir) {
        Ok(()) => Ok(dir),
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                debug!("Could not remove incomplete output {:?}: {}", dir, cleanup);
            }
            Err(e)
        }
    }
}

/// Save the structured result document
pub fn save_result_json(output_dir: &Path, document: &ResultDocument<'_>) -> Result<PathBuf, OcrError> {
    let path = output_dir.join(RESULT_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
    debug!("Saved result JSON: {:?}", path);
    Ok(path)
}

/// Save the recognized text as a plain-text document
pub fn save_extracted_text(output_dir: &Path, text: &str) -> Result<PathBuf, OcrError> {
    let path = output_dir.join(TEXT_FILE);
    std::fs::write(&path, text)?;
    debug!("Saved extracted text: {:?}", path);
    Ok(path)
}

/// Save the region visualization
pub fn save_annotated_image(output_dir: &Path, image: &RgbImage) -> Result<PathBuf, OcrError> {
    let path = output_dir.join(ANNOTATED_FILE);
    image
        .save(&path)
        .map_err(|e| OcrError::Io(std::io::Error::other(e)))?;
    debug!("Saved annotated image: {:?}", path);
    Ok(path)
}

/// Save the aggregated batch manifest
pub fn save_batch_manifest<T: Serialize>(output_dir: &Path, manifest: &T) -> Result<PathBuf, OcrError> {
    let path = output_dir.join(MANIFEST_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
    debug!("Saved batch summary: {:?}", path);
    Ok(path)
}
