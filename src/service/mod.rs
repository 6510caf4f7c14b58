//! Recognition Service
//!
//! Turns one image into a `RecognitionResult`: resolves the language's model
//! instance, applies the preprocessing policy, runs inference on a blocking
//! worker and optionally persists artifacts. Concurrent inference calls are
//! bounded by a semaphore sized from `service.inference_workers`.

pub mod batch;

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::{AppConfig, PathsConfig, ServiceConfig};
use crate::error::OcrError;
use crate::storage::artifacts::short_content_id;
use crate::storage::{
    create_item_output_dir, create_single_output_dir, fill_output_dir, save_annotated_image, save_extracted_text,
    save_result_json, ResultDocument,
};
use crate::vision::visualize::draw_regions;
use crate::vision::{decode_image, load_image, ModelInstancePool, PreprocessingPolicy, RecognitionResult};

pub use batch::{BatchItemOutcome, BatchManifest, BatchOrchestrator};

/// Which artifacts to write for a recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMode {
    /// Return the result only
    None,
    /// `result.json` and `extracted_text.txt`
    Documents,
    /// Documents plus `annotated.png`
    Annotated,
}

impl ArtifactMode {
    pub fn from_flags(save: bool, annotate: bool) -> Self {
        match (save, annotate) {
            (false, _) => ArtifactMode::None,
            (true, false) => ArtifactMode::Documents,
            (true, true) => ArtifactMode::Annotated,
        }
    }

    pub fn persists(&self) -> bool {
        !matches!(self, ArtifactMode::None)
    }
}

/// Where a recognition's artifacts go
#[derive(Debug, Clone, Copy)]
pub(crate) enum OutputTarget<'a> {
    /// Fresh timestamped directory under `single/{lang}`
    Single,
    /// Per-item directory inside a batch directory
    BatchItem(&'a Path),
}

/// A recognition result and where its artifacts were written
#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub result: RecognitionResult,
    pub output_dir: Option<PathBuf>,
}

/// Recognition service over a shared model instance pool
pub struct RecognitionService {
    pool: Arc<ModelInstancePool>,
    policy: PreprocessingPolicy,
    permits: Arc<Semaphore>,
    paths: PathsConfig,
    settings: ServiceConfig,
}

impl RecognitionService {
    pub fn new(pool: Arc<ModelInstancePool>, config: &AppConfig) -> Self {
        let workers = config.service.inference_workers.max(1);
        debug!("Recognition service with {} inference workers", workers);

        Self {
            pool,
            policy: PreprocessingPolicy::new(config.service.max_long_side),
            permits: Arc::new(Semaphore::new(workers)),
            paths: config.paths.clone(),
            settings: config.service.clone(),
        }
    }

    pub fn pool(&self) -> &Arc<ModelInstancePool> {
        &self.pool
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    pub fn settings(&self) -> &ServiceConfig {
        &self.settings
    }

    /// Recognize a decoded image
    pub async fn recognize(
        &self,
        image: DynamicImage,
        language: &str,
        filename: &str,
        artifacts: ArtifactMode,
    ) -> Result<RecognitionOutcome, OcrError> {
        self.recognize_to(image, language, filename, artifacts, OutputTarget::Single)
            .await
    }

    /// Decode and recognize uploaded image bytes
    pub async fn recognize_bytes(
        &self,
        data: &[u8],
        language: &str,
        filename: &str,
        artifacts: ArtifactMode,
    ) -> Result<RecognitionOutcome, OcrError> {
        self.pool.ensure_supported(language)?;
        let max_bytes = self.settings.max_image_size_bytes();
        if data.len() as u64 > max_bytes {
            return Err(OcrError::InvalidImage(format!(
                "File size ({:.1}MB) exceeds {}MB limit",
                data.len() as f64 / (1024.0 * 1024.0),
                self.settings.max_image_size_mb
            )));
        }

        let image = decode_image(data)?;
        self.recognize(image, language, filename, artifacts).await
    }

    /// Load and recognize an image file
    pub async fn recognize_path(
        &self,
        path: &Path,
        language: &str,
        artifacts: ArtifactMode,
    ) -> Result<RecognitionOutcome, OcrError> {
        self.pool.ensure_supported(language)?;
        let image = load_image(path, self.settings.max_image_size_bytes())?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.recognize(image, language, &filename, artifacts).await
    }

    pub(crate) async fn recognize_to(
        &self,
        image: DynamicImage,
        language: &str,
        filename: &str,
        artifacts: ArtifactMode,
        target: OutputTarget<'_>,
    ) -> Result<RecognitionOutcome, OcrError> {
        self.pool.ensure_supported(language)?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| OcrError::WorkerJoin(e.to_string()))?;

        let pool = Arc::clone(&self.pool);
        let policy = self.policy;
        let code = language.to_string();
        let wants_content_id = artifacts.persists() && matches!(target, OutputTarget::Single);

        let (prepared, raw, elapsed, content_id) = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let instance = pool.get(&code)?;
            let content_id = wants_content_id.then(|| short_content_id(image.as_bytes()));
            let prepared = policy.prepare(image);

            let start = Instant::now();
            let raw = instance.recognize(&prepared)?;
            let elapsed = start.elapsed().as_secs_f64();

            Ok::<_, OcrError>((prepared, raw, elapsed, content_id))
        })
        .await
        .map_err(|e| OcrError::WorkerJoin(e.to_string()))??;

        let result = RecognitionResult::from_raw(raw, elapsed);
        debug!(
            "Recognized {} regions in {:.3}s ({})",
            result.regions.len(),
            elapsed,
            filename
        );

        let output_dir = if artifacts.persists() {
            let dir = match target {
                OutputTarget::Single => create_single_output_dir(
                    &self.paths.single_output_dir(),
                    language,
                    filename,
                    content_id.as_deref().unwrap_or("00000000"),
                )?,
                OutputTarget::BatchItem(batch_dir) => create_item_output_dir(batch_dir, filename)?,
            };
            let dir = fill_output_dir(dir, |dir| {
                self.persist(dir, &prepared, &result, language, filename, artifacts)
            })?;
            info!("Saved OCR results to {:?}", dir);
            Some(dir)
        } else {
            None
        };

        Ok(RecognitionOutcome { result, output_dir })
    }

    fn persist(
        &self,
        dir: &Path,
        prepared: &DynamicImage,
        result: &RecognitionResult,
        language: &str,
        filename: &str,
        artifacts: ArtifactMode,
    ) -> Result<(), OcrError> {
        let document = ResultDocument {
            filename,
            language,
            processing_time_seconds: result.processing_time_seconds,
            results: &result.regions,
            full_text: &result.full_text,
        };
        save_result_json(dir, &document)?;
        save_extracted_text(dir, &result.full_text)?;

        if artifacts == ArtifactMode::Annotated {
            save_annotated_image(dir, &draw_regions(prepared, &result.regions))?;
        }
        Ok(())
    }
}
