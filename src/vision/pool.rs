//! Per-language model instance registry
//!
//! One recognizer per language code, created on first use and kept for the
//! life of the process. Check-then-create runs under a per-code lock, so
//! concurrent first requests for the same language trigger a single load
//! while different languages can load in parallel. Failed loads are never
//! cached.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::LanguageBinding;
use crate::error::OcrError;
use crate::vision::{ModelLoader, RawRegion, TextRecognizer};

use image::DynamicImage;

/// A loaded recognizer bound to one language
pub struct ModelInstance {
    code: String,
    binding: LanguageBinding,
    recognizer: Box<dyn TextRecognizer>,
    load_time: Duration,
}

impl ModelInstance {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn binding(&self) -> &LanguageBinding {
        &self.binding
    }

    /// How long the initial load took
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    /// Run the recognizer on an already preprocessed image
    pub fn recognize(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, OcrError> {
        self.recognizer.recognize(image)
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("code", &self.code)
            .field("binding", &self.binding)
            .field("load_time", &self.load_time)
            .finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<Arc<ModelInstance>>>>;

/// Registry of model instances keyed by language code
pub struct ModelInstancePool {
    languages: BTreeMap<String, LanguageBinding>,
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, Slot>>,
    loaded: Mutex<BTreeSet<String>>,
}

impl ModelInstancePool {
    pub fn new(languages: BTreeMap<String, LanguageBinding>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            languages,
            loader,
            slots: Mutex::new(HashMap::new()),
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    /// Supported language codes in sorted order
    pub fn supported_languages(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }

    /// Language table this pool serves
    pub fn languages(&self) -> &BTreeMap<String, LanguageBinding> {
        &self.languages
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.languages.contains_key(code)
    }

    /// Look up the binding for a code, failing with `UnsupportedLanguage`
    pub fn ensure_supported(&self, code: &str) -> Result<&LanguageBinding, OcrError> {
        self.languages
            .get(code)
            .ok_or_else(|| OcrError::UnsupportedLanguage {
                code: code.to_string(),
                supported: self.supported_languages(),
            })
    }

    /// Get the instance for a language, loading it on first use
    pub fn get(&self, code: &str) -> Result<Arc<ModelInstance>, OcrError> {
        let binding = self.ensure_supported(code)?;

        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(code.to_string()).or_default().clone()
        };

        let mut guard = slot.lock();
        if let Some(instance) = guard.as_ref() {
            return Ok(Arc::clone(instance));
        }

        info!(
            "Loading recognition model for language: {} ({})",
            code, binding.name
        );
        let start = Instant::now();
        let recognizer = self.loader.load(code, binding)?;
        let load_time = start.elapsed();

        let instance = Arc::new(ModelInstance {
            code: code.to_string(),
            binding: binding.clone(),
            recognizer,
            load_time,
        });
        *guard = Some(Arc::clone(&instance));
        self.loaded.lock().insert(code.to_string());

        info!(
            "Recognition model for '{}' loaded in {:.2}s",
            code,
            load_time.as_secs_f64()
        );
        Ok(instance)
    }

    /// Codes whose instances are fully loaded
    pub fn loaded_languages(&self) -> Vec<String> {
        self.loaded.lock().iter().cloned().collect()
    }

    /// Eagerly load the given languages. Unsupported codes are skipped with
    /// a warning; every outcome is reported.
    pub fn preload(&self, codes: &[String]) -> Vec<(String, Result<(), OcrError>)> {
        codes
            .iter()
            .map(|code| {
                let outcome = self.get(code).map(|_| ());
                if let Err(e) = &outcome {
                    warn!("Skipping preload for '{}': {}", code, e);
                }
                (code.clone(), outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_languages;
    use crate::testing::FakeLoader;
    use std::thread;

    fn pool_with(loader: Arc<FakeLoader>) -> ModelInstancePool {
        ModelInstancePool::new(default_languages(), loader)
    }

    #[test]
    fn test_get_returns_same_instance() {
        let loader = Arc::new(FakeLoader::default());
        let pool = pool_with(loader.clone());

        let first = pool.get("hi").unwrap();
        let second = pool.get("hi").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count("hi"), 1);
        assert_eq!(first.code(), "hi");
        assert_eq!(first.binding().name, "Hindi");
    }

    #[test]
    fn test_concurrent_first_requests_load_once() {
        let loader = Arc::new(FakeLoader::with_delay(Duration::from_millis(50)));
        let pool = pool_with(loader.clone());

        let instances: Vec<Arc<ModelInstance>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| pool.get("te").unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loader.load_count("te"), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[test]
    fn test_unknown_code_always_fails() {
        let loader = Arc::new(FakeLoader::default());
        let pool = pool_with(loader.clone());

        for _ in 0..3 {
            let err = pool.get("xx").unwrap_err();
            assert!(matches!(err, OcrError::UnsupportedLanguage { ref code, .. } if code == "xx"));
        }

        assert!(pool.get("ta").is_ok());
        assert_eq!(loader.total_loads(), 1);
        assert_eq!(pool.loaded_languages(), vec!["ta"]);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let loader = Arc::new(FakeLoader::default());
        loader.fail_next_load("mr");
        let pool = pool_with(loader.clone());

        assert!(matches!(pool.get("mr"), Err(OcrError::ModelLoad(_))));
        assert!(pool.loaded_languages().is_empty());

        assert!(pool.get("mr").is_ok());
        assert_eq!(pool.loaded_languages(), vec!["mr"]);
    }

    #[test]
    fn test_preload_reports_outcomes() {
        let loader = Arc::new(FakeLoader::default());
        let pool = pool_with(loader.clone());

        let report = pool.preload(&["hi".to_string(), "zz".to_string(), "te".to_string()]);

        assert_eq!(report.len(), 3);
        assert!(report[0].1.is_ok());
        assert!(matches!(report[1].1, Err(OcrError::UnsupportedLanguage { .. })));
        assert!(report[2].1.is_ok());
        assert_eq!(pool.loaded_languages(), vec!["hi", "te"]);

        pool.get("hi").unwrap();
        assert_eq!(loader.load_count("hi"), 1);
    }

    #[test]
    fn test_loaded_languages_ignores_busy_slots() {
        let loader = Arc::new(FakeLoader::default());
        let pool = pool_with(loader);
        pool.get("hi").unwrap();

        // A cache hit holds the slot lock briefly; the language stays listed
        let slot = pool.slots.lock().get("hi").cloned().unwrap();
        let _held = slot.lock();
        assert_eq!(pool.loaded_languages(), vec!["hi"]);
    }
}
