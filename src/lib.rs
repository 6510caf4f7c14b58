//! IndicOCR - Text recognition for Indic-script document images
//!
//! Recognizes single images and whole folders in Hindi, Marathi, Telugu and
//! Tamil with per-language model instances loaded on demand, and benchmarks a
//! running service against a labeled corpus.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod vision;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use error::OcrError;
pub use service::{ArtifactMode, BatchManifest, BatchOrchestrator, RecognitionOutcome, RecognitionService};
pub use vision::{
    ModelInstancePool, ModelLoader, RawRegion, RecognitionRegion, RecognitionResult, TextRecognizer,
};
