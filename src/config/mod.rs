//! Application Configuration
//!
//! Service, model binding and benchmark settings stored in TOML format.
//! Every field has a default, so an empty file is a valid configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Input/output locations
    pub paths: PathsConfig,
    /// Recognition service settings
    pub service: ServiceConfig,
    /// Model download locations
    pub models: ModelsConfig,
    /// Supported languages keyed by language code
    pub languages: BTreeMap<String, LanguageBinding>,
    /// Benchmark harness settings
    pub benchmark: BenchmarkConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Filesystem roots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which `single/` and `batch/` artifacts are written
    pub output_base: PathBuf,
    /// Root of the labeled benchmark datasets
    pub input_base: PathBuf,
    /// Model cache directory (platform data dir when unset)
    pub models_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_base: PathBuf::from("outputs/ocr"),
            input_base: PathBuf::from("resources/ocr_inputs"),
            models_dir: None,
        }
    }
}

impl PathsConfig {
    pub fn single_output_dir(&self) -> PathBuf {
        self.output_base.join("single")
    }

    pub fn batch_output_dir(&self) -> PathBuf {
        self.output_base.join("batch")
    }
}

/// Recognition service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Images whose long side exceeds this are downscaled before inference
    pub max_long_side: u32,
    /// Largest accepted image file in megabytes
    pub max_image_size_mb: u64,
    /// Allow-listed image extensions (lower case, with leading dot)
    pub supported_extensions: Vec<String>,
    /// Languages loaded eagerly at startup
    pub preload_languages: Vec<String>,
    /// Maximum number of inference calls running at once
    pub inference_workers: usize,
    /// ONNX Runtime intra-op threads per session
    pub intra_threads: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_long_side: 960,
            max_image_size_mb: 50,
            supported_extensions: [".png", ".jpg", ".jpeg", ".tiff", ".tif", ".bmp", ".webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            preload_languages: Vec::new(),
            inference_workers: 2,
            intra_threads: 4,
        }
    }
}

impl ServiceConfig {
    pub fn max_image_size_bytes(&self) -> u64 {
        self.max_image_size_mb * 1024 * 1024
    }

    /// Check a path's extension against the allow-list (case-insensitive)
    pub fn is_supported_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = format!(".{}", ext.to_lowercase());
        self.supported_extensions
            .iter()
            .any(|allowed| allowed.to_lowercase() == ext)
    }
}

/// Where PaddleOCR ONNX models are fetched from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base URL of the model repository
    pub base_url: String,
    /// Detection model path relative to `base_url` (shared by all languages)
    pub detection_path: String,
    /// Recognition model path template; `{family}` is substituted
    pub recognition_path: String,
    /// Character dictionary path template; `{family}` is substituted
    pub dictionary_path: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co/monkt/paddleocr-onnx/resolve/main".to_string(),
            detection_path: "detection/v5/det.onnx".to_string(),
            recognition_path: "languages/{family}/rec.onnx".to_string(),
            dictionary_path: "languages/{family}/dict.txt".to_string(),
        }
    }
}

/// A supported language and the recognition model it is bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageBinding {
    /// Display name
    pub name: String,
    /// Writing system
    pub script: String,
    /// Recognition model family in the model repository
    pub model_family: String,
}

impl LanguageBinding {
    fn new(name: &str, script: &str, model_family: &str) -> Self {
        Self {
            name: name.to_string(),
            script: script.to_string(),
            model_family: model_family.to_string(),
        }
    }
}

/// Built-in language table
pub fn default_languages() -> BTreeMap<String, LanguageBinding> {
    BTreeMap::from([
        ("hi".to_string(), LanguageBinding::new("Hindi", "Devanagari", "devanagari")),
        ("mr".to_string(), LanguageBinding::new("Marathi", "Devanagari", "devanagari")),
        ("te".to_string(), LanguageBinding::new("Telugu", "Telugu", "telugu")),
        ("ta".to_string(), LanguageBinding::new("Tamil", "Tamil", "tamil")),
    ])
}

/// Benchmark harness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Base URL of the running OCR service
    pub api_url: String,
    /// Images sampled per language
    pub sample_size: usize,
    /// Seed for reproducible sampling
    pub seed: u64,
    /// Languages benchmarked when none are given on the command line
    pub languages: Vec<String>,
    /// Where CSV reports go (`{output_base}/benchmarks` when unset)
    pub output_dir: Option<PathBuf>,
    /// Round-trip bound for a single request
    pub request_timeout_secs: u64,
    /// User tag embedded in the run id
    pub user: String,
    /// Dataset directories per language, relative to `paths.input_base`
    pub datasets: BTreeMap<String, Vec<PathBuf>>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8111".to_string(),
            sample_size: 100,
            seed: 42,
            languages: vec!["hi".to_string(), "te".to_string()],
            output_dir: None,
            request_timeout_secs: 120,
            user: "default".to_string(),
            datasets: BTreeMap::from([
                (
                    "hi".to_string(),
                    vec![PathBuf::from("hindi/Page_Level_Training_Set")],
                ),
                (
                    "te".to_string(),
                    vec![
                        PathBuf::from("telugu/Page_Level_Training_Set/Page_Level_Training_Set1"),
                        PathBuf::from("telugu/Page_Level_Training_Set/Page_Level_Training_Set2"),
                    ],
                ),
            ]),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Language table, falling back to the built-in one when none is configured
    pub fn language_table(&self) -> BTreeMap<String, LanguageBinding> {
        if self.languages.is_empty() {
            default_languages()
        } else {
            self.languages.clone()
        }
    }

    /// Apply `OCR_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("OCR_OUTPUT_BASE").filter(|v| !v.trim().is_empty()) {
            self.paths.output_base = PathBuf::from(base);
        }
        if let Some(base) = lookup("OCR_INPUT_BASE").filter(|v| !v.trim().is_empty()) {
            self.paths.input_base = PathBuf::from(base);
        }
        if let Some(list) = lookup("OCR_PRELOAD_LANGUAGES") {
            self.service.preload_languages = parse_language_list(&list);
        }
        if let Some(level) = lookup("OCR_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(mb) = lookup("OCR_MAX_IMAGE_SIZE_MB").and_then(|v| v.trim().parse().ok()) {
            self.service.max_image_size_mb = mb;
        }
    }
}

/// Split a comma-separated language list, dropping empty entries
pub fn parse_language_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.service.max_long_side, 960);
        assert_eq!(config.service.max_image_size_mb, 50);
        assert!(config.service.preload_languages.is_empty());
        assert_eq!(config.service.supported_extensions.len(), 7);

        assert_eq!(config.benchmark.seed, 42);
        assert_eq!(config.benchmark.sample_size, 100);
        assert_eq!(config.benchmark.api_url, "http://localhost:8111");

        let languages = config.language_table();
        assert_eq!(
            languages.keys().cloned().collect::<Vec<_>>(),
            vec!["hi", "mr", "ta", "te"]
        );
        assert_eq!(languages["mr"].model_family, "devanagari");
    }

    #[test]
    fn test_empty_file_is_valid() {
        let parsed: AppConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.service.max_long_side, 960);
        assert_eq!(parsed.paths.output_base, PathBuf::from("outputs/ocr"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [service]
            max_long_side = 1280
            preload_languages = ["hi"]
            "#,
        )
        .unwrap();

        assert_eq!(parsed.service.max_long_side, 1280);
        assert_eq!(parsed.service.preload_languages, vec!["hi"]);
        assert_eq!(parsed.service.max_image_size_mb, 50);
        assert_eq!(parsed.benchmark.seed, 42);
    }

    #[test]
    fn test_configured_languages_replace_builtin_table() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [languages.en]
            name = "English"
            script = "Latin"
            model_family = "english"
            "#,
        )
        .unwrap();

        let table = parsed.language_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table["en"].script, "Latin");
    }

    #[test]
    fn test_extension_allow_list_is_case_insensitive() {
        let service = ServiceConfig::default();
        assert!(service.is_supported_extension(Path::new("scan.PNG")));
        assert!(service.is_supported_extension(Path::new("dir/page.jpeg")));
        assert!(!service.is_supported_extension(Path::new("notes.txt")));
        assert!(!service.is_supported_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OCR_OUTPUT_BASE", "/srv/ocr"),
            ("OCR_PRELOAD_LANGUAGES", "hi, mr,,"),
            ("OCR_LOG_LEVEL", "DEBUG"),
            ("OCR_MAX_IMAGE_SIZE_MB", "10"),
        ]);

        let mut config = AppConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.paths.output_base, PathBuf::from("/srv/ocr"));
        assert_eq!(config.service.preload_languages, vec!["hi", "mr"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.service.max_image_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.paths.input_base, PathBuf::from("resources/ocr_inputs"));
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.service.preload_languages = vec!["te".to_string()];
        config.languages = default_languages();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.service.preload_languages, vec!["te"]);
        assert_eq!(loaded.languages, config.languages);
        assert_eq!(loaded.benchmark.datasets, config.benchmark.datasets);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
