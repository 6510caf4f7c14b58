//! Storage Layer
//!
//! Platform directories and persisted recognition artifacts.

pub mod artifacts;

use anyhow::Result;
use std::path::PathBuf;

pub use artifacts::{
    create_batch_output_dir, create_item_output_dir, create_single_output_dir, fill_output_dir,
    save_annotated_image, save_batch_manifest, save_extracted_text, save_result_json,
    ResultDocument,
};

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("org", "indicocr", "IndicOCR")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("org", "indicocr", "IndicOCR")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
