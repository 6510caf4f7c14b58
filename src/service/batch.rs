//! Folder-level batch recognition
//!
//! Items are processed strictly one after another. A failure on one item is
//! recorded in the manifest and the run moves on; only precondition
//! failures (unknown language, missing folder, nothing to process) abort.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{ArtifactMode, OutputTarget, RecognitionService};
use crate::error::OcrError;
use crate::storage::{create_batch_output_dir, save_batch_manifest};
use crate::vision::{load_image, RecognitionResult};

/// Outcome of one batch item; exactly one of `result`/`error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemOutcome {
    /// Path relative to the batch folder
    pub filename: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RecognitionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemOutcome {
    fn succeeded(filename: String, result: RecognitionResult) -> Self {
        Self {
            filename,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn failed(filename: String, error: String) -> Self {
        Self {
            filename,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Aggregated record of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub folder_path: PathBuf,
    pub language: String,
    /// Batch output directory, when artifacts were persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub total_images: usize,
    pub processed_count: usize,
    pub failed_count: usize,
    /// From enumeration start to the last item's completion
    pub elapsed_seconds: f64,
    pub items: Vec<BatchItemOutcome>,
}

/// Drives the recognition service over every image in a folder
pub struct BatchOrchestrator {
    service: Arc<RecognitionService>,
}

impl BatchOrchestrator {
    pub fn new(service: Arc<RecognitionService>) -> Self {
        Self { service }
    }

    /// Image files under `folder` matching the extension allow-list, ordered
    /// by lower-cased file name then path
    pub fn enumerate(&self, folder: &Path, recursive: bool) -> Result<Vec<PathBuf>, OcrError> {
        if !folder.exists() {
            return Err(OcrError::FolderNotFound(folder.to_path_buf()));
        }
        if !folder.is_dir() {
            return Err(OcrError::NotADirectory(folder.to_path_buf()));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let settings = self.service.settings();

        let mut files: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| settings.is_supported_extension(path))
            .collect();

        files.sort_by_cached_key(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            (name, path.clone())
        });

        if files.is_empty() {
            return Err(OcrError::NoImagesFound(folder.to_path_buf()));
        }
        Ok(files)
    }

    /// Process every image in `folder` and write the manifest
    pub async fn run(
        &self,
        folder: &Path,
        language: &str,
        recursive: bool,
        artifacts: ArtifactMode,
    ) -> Result<BatchManifest, OcrError> {
        let start = Instant::now();
        self.service.pool().ensure_supported(language)?;

        let files = self.enumerate(folder, recursive)?;
        info!(
            "Batch processing {} images from {:?} (language: {})",
            files.len(),
            folder,
            language
        );

        let batch_dir = if artifacts.persists() {
            Some(create_batch_output_dir(
                &self.service.paths().batch_output_dir(),
                language,
                folder,
            )?)
        } else {
            None
        };

        let mut items = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            let filename = relative_name(folder, path);
            let outcome = match self
                .process_item(path, &filename, language, artifacts, batch_dir.as_deref())
                .await
            {
                Ok(result) => {
                    info!("Processed {}/{}: {}", index + 1, files.len(), filename);
                    BatchItemOutcome::succeeded(filename, result)
                }
                Err(e) => {
                    warn!("Failed {}/{}: {}: {}", index + 1, files.len(), filename, e);
                    BatchItemOutcome::failed(filename, e.to_string())
                }
            };
            items.push(outcome);
        }

        let processed_count = items.iter().filter(|item| item.success).count();
        let manifest = BatchManifest {
            folder_path: folder.to_path_buf(),
            language: language.to_string(),
            output_dir: batch_dir.clone(),
            total_images: items.len(),
            processed_count,
            failed_count: items.len() - processed_count,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            items,
        };

        if let Some(dir) = &batch_dir {
            save_batch_manifest(dir, &manifest)?;
        }

        info!(
            "Batch complete: {} processed, {} failed in {:.2}s",
            manifest.processed_count, manifest.failed_count, manifest.elapsed_seconds
        );
        Ok(manifest)
    }

    async fn process_item(
        &self,
        path: &Path,
        filename: &str,
        language: &str,
        artifacts: ArtifactMode,
        batch_dir: Option<&Path>,
    ) -> Result<RecognitionResult, OcrError> {
        let image = load_image(path, self.service.settings().max_image_size_bytes())?;
        let target = match batch_dir {
            Some(dir) => OutputTarget::BatchItem(dir),
            None => OutputTarget::Single,
        };
        // Without a batch directory nothing is persisted, so the target is unused
        let artifacts = if batch_dir.is_some() { artifacts } else { ArtifactMode::None };

        let outcome = self
            .service
            .recognize_to(image, language, filename, artifacts, target)
            .await?;
        Ok(outcome.result)
    }
}

/// Forward-slash path of `path` relative to `folder`
fn relative_name(folder: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_languages, AppConfig};
    use crate::storage::artifacts::MANIFEST_FILE;
    use crate::testing::{png_bytes, FakeLoader};
    use crate::vision::ModelInstancePool;
    use tempfile::TempDir;

    fn orchestrator(loader: Arc<FakeLoader>, output: &Path) -> BatchOrchestrator {
        let mut config = AppConfig::default();
        config.paths.output_base = output.to_path_buf();
        let pool = Arc::new(ModelInstancePool::new(default_languages(), loader));
        BatchOrchestrator::new(Arc::new(RecognitionService::new(pool, &config)))
    }

    fn write(dir: &Path, name: &str, data: &[u8]) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn test_enumerate_filters_and_orders() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(input.path(), "b.PNG", &png_bytes(4, 4));
        write(input.path(), "A.jpg", b"x");
        write(input.path(), "notes.txt", b"x");
        write(input.path(), "nested/c.png", b"x");

        let batch = orchestrator(Arc::new(FakeLoader::default()), out.path());

        let flat = batch.enumerate(input.path(), false).unwrap();
        let names: Vec<_> = flat.iter().map(|p| relative_name(input.path(), p)).collect();
        assert_eq!(names, vec!["A.jpg", "b.PNG"]);

        let deep = batch.enumerate(input.path(), true).unwrap();
        let names: Vec<_> = deep.iter().map(|p| relative_name(input.path(), p)).collect();
        assert_eq!(names, vec!["A.jpg", "b.PNG", "nested/c.png"]);
    }

    #[test]
    fn test_enumerate_preconditions() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let batch = orchestrator(Arc::new(FakeLoader::default()), out.path());

        let missing = input.path().join("missing");
        assert!(matches!(batch.enumerate(&missing, false), Err(OcrError::FolderNotFound(_))));

        write(input.path(), "file.png", b"x");
        let file = input.path().join("file.png");
        assert!(matches!(batch.enumerate(&file, false), Err(OcrError::NotADirectory(_))));

        let empty = input.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        write(&empty, "readme.md", b"x");
        assert!(matches!(batch.enumerate(&empty, true), Err(OcrError::NoImagesFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_item_is_isolated() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(input.path(), "1.png", &png_bytes(30, 10));
        write(input.path(), "2.png", b"corrupt");
        write(input.path(), "3.png", &png_bytes(17, 9));
        write(input.path(), "4.png", &png_bytes(50, 10));

        let loader = Arc::new(FakeLoader::default().fail_on_width(17));
        let batch = orchestrator(loader.clone(), out.path());

        let manifest = batch
            .run(input.path(), "hi", false, ArtifactMode::None)
            .await
            .unwrap();

        assert_eq!(manifest.total_images, 4);
        assert_eq!(manifest.processed_count, 2);
        assert_eq!(manifest.failed_count, 2);
        assert_eq!(manifest.items.len(), 4);
        assert!(manifest.output_dir.is_none());

        let second = &manifest.items[1];
        assert!(!second.success && second.result.is_none());
        assert!(second.error.as_deref().unwrap().contains("Invalid or corrupt image"));
        assert!(manifest.items[2].error.as_deref().unwrap().contains("simulated"));
        assert_eq!(manifest.items[3].result.as_ref().unwrap().full_text, "lang hi\n50x10");

        assert_eq!(loader.load_count("hi"), 1);
        assert!(!out.path().join("batch").exists());
    }

    #[tokio::test]
    async fn test_manifest_and_item_dirs_written() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(input.path(), "page.png", &png_bytes(30, 10));
        write(input.path(), "page.jpg", &png_bytes(30, 10));

        let batch = orchestrator(Arc::new(FakeLoader::default()), out.path());
        let manifest = batch
            .run(input.path(), "te", false, ArtifactMode::Documents)
            .await
            .unwrap();

        let dir = manifest.output_dir.clone().unwrap();
        assert!(dir.starts_with(out.path().join("batch").join("te")));
        assert!(dir.join("page").is_dir());
        assert!(dir.join("page_2").is_dir());

        let saved: BatchManifest =
            serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(saved.processed_count, 2);
        let names: Vec<_> = saved.items.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["page.jpg", "page.png"]);
        assert_eq!(saved.items[0].result.as_ref().unwrap().full_text, "lang te\n30x10");
    }

    #[tokio::test]
    async fn test_unsupported_language_aborts_before_enumeration() {
        let out = TempDir::new().unwrap();
        let batch = orchestrator(Arc::new(FakeLoader::default()), out.path());

        let err = batch
            .run(Path::new("/definitely/missing"), "xx", false, ArtifactMode::Documents)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedLanguage { .. }));
    }
}
