//! Error taxonomy for the recognition pipeline
//!
//! Per-item failures (`InvalidImage`, `InferenceFailure`) are caught by the
//! batch and benchmark layers; precondition failures (`FolderNotFound`,
//! `NoImagesFound`) abort a run before any item is processed.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the recognition core
#[derive(Error, Debug)]
pub enum OcrError {
    /// The input bytes could not be decoded into a raster image
    #[error("Invalid or corrupt image: {0}")]
    InvalidImage(String),

    /// No model binding exists for the requested language code
    #[error("Unsupported language '{code}'. Supported: {}", supported.join(", "))]
    UnsupportedLanguage { code: String, supported: Vec<String> },

    /// The recognition capability itself failed
    #[error("OCR inference failed: {0}")]
    InferenceFailure(String),

    /// A supported language's model instance could not be constructed
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No supported image files found in folder: {}", .0.display())]
    NoImagesFound(PathBuf),

    /// A blocking worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    WorkerJoin(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_language_message_lists_codes() {
        let err = OcrError::UnsupportedLanguage {
            code: "xx".to_string(),
            supported: vec!["hi".to_string(), "te".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Unsupported language 'xx'"));
        assert!(msg.contains("hi, te"));
    }
}
