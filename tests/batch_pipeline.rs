//! End-to-end batch run over a folder with one corrupt image

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use indic_ocr::config::{default_languages, AppConfig, LanguageBinding};
use indic_ocr::{
    ArtifactMode, BatchOrchestrator, ModelInstancePool, ModelLoader, OcrError, RawRegion,
    RecognitionService, TextRecognizer,
};

struct EchoRecognizer {
    code: String,
}

impl TextRecognizer for EchoRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<RawRegion>, OcrError> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![RawRegion {
            text: format!("{} {}x{}", self.code, image.width(), image.height()),
            confidence: 0.9,
            polygon: vec![(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
        }])
    }
}

struct EchoLoader;

impl ModelLoader for EchoLoader {
    fn load(&self, code: &str, _binding: &LanguageBinding) -> Result<Box<dyn TextRecognizer>, OcrError> {
        Ok(Box::new(EchoRecognizer {
            code: code.to_string(),
        }))
    }
}

fn write_png(path: &Path, width: u32, height: u32) {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    std::fs::write(path, bytes).unwrap();
}

#[tokio::test]
async fn test_batch_with_corrupt_image() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    write_png(&input.path().join("a.png"), 64, 32);
    write_png(&input.path().join("b.png"), 40, 80);
    std::fs::write(input.path().join("c.png"), b"not an image").unwrap();

    let mut config = AppConfig::default();
    config.paths.output_base = output.path().to_path_buf();

    let pool = Arc::new(ModelInstancePool::new(default_languages(), Arc::new(EchoLoader)));
    let service = Arc::new(RecognitionService::new(pool, &config));
    let orchestrator = BatchOrchestrator::new(service);

    let manifest = orchestrator
        .run(input.path(), "hi", false, ArtifactMode::Documents)
        .await
        .unwrap();

    assert_eq!(manifest.total_images, 3);
    assert_eq!(manifest.processed_count, 2);
    assert_eq!(manifest.failed_count, 1);

    let names: Vec<&str> = manifest.items.iter().map(|i| i.filename.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    let corrupt = &manifest.items[2];
    assert!(!corrupt.success);
    assert!(corrupt.error.is_some());
    assert_eq!(
        manifest.items[0].result.as_ref().unwrap().full_text,
        "hi 64x32"
    );

    let batch_dir = manifest.output_dir.clone().unwrap();
    assert!(batch_dir.starts_with(output.path().join("batch").join("hi")));

    let mut entries: Vec<String> = std::fs::read_dir(&batch_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["a", "b", "batch_summary.json"]);

    for item in ["a", "b"] {
        let dir = batch_dir.join(item);
        assert!(dir.join("result.json").is_file());
        assert!(dir.join("extracted_text.txt").is_file());
        assert!(!dir.join("annotated.png").exists());
    }

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(batch_dir.join("batch_summary.json")).unwrap()).unwrap();
    assert_eq!(saved["processed_count"], 2);
    assert_eq!(saved["failed_count"], 1);
}

#[tokio::test]
async fn test_batch_rejects_unknown_language_before_reading_folder() {
    let output = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.paths.output_base = output.path().to_path_buf();

    let pool = Arc::new(ModelInstancePool::new(default_languages(), Arc::new(EchoLoader)));
    let orchestrator = BatchOrchestrator::new(Arc::new(RecognitionService::new(pool, &config)));

    let err = orchestrator
        .run(Path::new("/definitely/not/here"), "xx", false, ArtifactMode::Documents)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::UnsupportedLanguage { .. }));
    assert!(!output.path().join("batch").exists());
}
