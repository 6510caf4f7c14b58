//! Model management for ONNX Runtime
//!
//! Downloads, caches, and loads PaddleOCR detection/recognition models and
//! their character dictionaries. Assets live under the models directory at
//! the same relative path they have in the model repository, so each
//! recognition family gets its own files.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use crate::config::ModelsConfig;

/// Environment variable that disables downloads
pub const OFFLINE_ENV: &str = "OCR_OFFLINE";

const MANIFEST_FILE: &str = "manifest.json";

/// What a model asset is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (CRNN + CTC)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl AssetKind {
    /// Smallest plausible file size; anything below is a truncated download
    pub fn min_size_bytes(&self) -> u64 {
        match self {
            AssetKind::Detection => 100_000,
            AssetKind::Recognition => 100_000,
            AssetKind::Dictionary => 2,
        }
    }

    /// Display name for progress reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            AssetKind::Detection => "Text Detection",
            AssetKind::Recognition => "Text Recognition",
            AssetKind::Dictionary => "Character Dictionary",
        }
    }
}

/// A downloadable model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub kind: AssetKind,
    pub url: String,
    /// Path relative to the models directory
    pub relative_path: PathBuf,
}

impl ModelAsset {
    /// Shared detection model
    pub fn detection(config: &ModelsConfig) -> Self {
        Self::from_template(AssetKind::Detection, config, &config.detection_path, "")
    }

    /// Recognition model for a model family
    pub fn recognition(config: &ModelsConfig, family: &str) -> Self {
        Self::from_template(AssetKind::Recognition, config, &config.recognition_path, family)
    }

    /// Character dictionary for a model family
    pub fn dictionary(config: &ModelsConfig, family: &str) -> Self {
        Self::from_template(AssetKind::Dictionary, config, &config.dictionary_path, family)
    }

    fn from_template(kind: AssetKind, config: &ModelsConfig, template: &str, family: &str) -> Self {
        let relative = template.replace("{family}", family);
        let relative = relative.trim_start_matches('/');
        Self {
            kind,
            url: format!("{}/{}", config.base_url.trim_end_matches('/'), relative),
            relative_path: PathBuf::from(relative),
        }
    }
}

/// Model manifest tracking downloaded assets
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub path: String,
    pub url: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub downloaded_at: String,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

impl ModelManifest {
    fn entry(&self, asset: &ModelAsset) -> Option<&ModelInfo> {
        let key = manifest_key(asset);
        self.models.iter().find(|m| m.path == key)
    }
}

fn manifest_key(asset: &ModelAsset) -> String {
    asset.relative_path.to_string_lossy().replace('\\', "/")
}

/// Model manager for downloading and caching ONNX models
pub struct ModelManager {
    models_dir: PathBuf,
    offline: bool,
    /// Serializes check-then-download and manifest updates; languages
    /// loading in parallel share the detection model
    download_lock: Mutex<()>,
}

impl ModelManager {
    /// Create a model manager in the platform data directory
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Create model manager with custom directory. Offline mode follows
    /// `OCR_OFFLINE`.
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self {
            models_dir,
            offline: std::env::var_os(OFFLINE_ENV).is_some(),
            download_lock: Mutex::new(()),
        })
    }

    /// Override offline mode
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Local path of an asset
    pub fn asset_path(&self, asset: &ModelAsset) -> PathBuf {
        self.models_dir.join(&asset.relative_path)
    }

    /// Check if an asset is present and looks complete
    pub fn is_available(&self, asset: &ModelAsset) -> bool {
        let Ok(metadata) = std::fs::metadata(self.asset_path(asset)) else {
            return false;
        };
        let size = metadata.len();
        if size < asset.kind.min_size_bytes() {
            return false;
        }

        // A recorded size that no longer matches means the file was replaced or truncated
        match self.load_manifest().ok().as_ref().and_then(|m| m.entry(asset)) {
            Some(info) => info.size_bytes == size,
            None => true,
        }
    }

    /// Return the local path of an asset, downloading it first if needed
    pub fn ensure_asset(&self, asset: &ModelAsset) -> Result<PathBuf> {
        let path = self.asset_path(asset);
        let _guard = self.download_lock.lock();

        if self.is_available(asset) {
            debug!("{} available at {:?}", asset.kind.display_name(), path);
            return Ok(path);
        }

        if self.offline {
            anyhow::bail!(
                "Offline mode: cannot download {}. Download it from {} and place it at {:?}",
                asset.kind.display_name(),
                asset.url,
                path
            );
        }

        self.download(asset)?;
        Ok(path)
    }

    /// Download an asset (blocking)
    fn download(&self, asset: &ModelAsset) -> Result<()> {
        let path = self.asset_path(asset);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Downloading {} from {}", asset.kind.display_name(), asset.url);

        let (size_bytes, sha256) = match Handle::try_current() {
            Ok(handle) => handle.block_on(download_file(&asset.url, &path))?,
            Err(_) => {
                let rt = Runtime::new().context("Failed to create tokio runtime")?;
                rt.block_on(download_file(&asset.url, &path))?
            }
        };

        if size_bytes < asset.kind.min_size_bytes() {
            std::fs::remove_file(&path).ok();
            anyhow::bail!(
                "Downloaded {} is only {} bytes: {}",
                asset.kind.display_name(),
                size_bytes,
                asset.url
            );
        }

        self.record_download(asset, size_bytes, sha256)?;
        info!(
            "Downloaded {} ({} bytes)",
            asset.kind.display_name(),
            size_bytes
        );
        Ok(())
    }

    /// Update manifest after successful download
    fn record_download(&self, asset: &ModelAsset, size_bytes: u64, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_else(|e| {
            warn!("Ignoring unreadable model manifest: {}", e);
            ModelManifest::default()
        });

        let info = ModelInfo {
            path: manifest_key(asset),
            url: asset.url.clone(),
            size_bytes,
            sha256,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.path == info.path) {
            *existing = info;
        } else {
            manifest.models.push(info);
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream a URL to `path` through a temp file; returns size and SHA-256
async fn download_file(url: &str, path: &Path) -> Result<(u64, String)> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Invalid model path {:?}", path))?;
    let mut file = tempfile::NamedTempFile::new_in(parent).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
    }

    file.flush().context("Failed to flush temp file")?;
    file.persist(path)
        .context("Failed to move downloaded file to final location")?;

    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        Ok(Self { session })
    }

    /// Get the underlying session mutably for running inference
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
