//! Client for the service's network-facing single-image endpoint

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Region as reported by the endpoint; only confidence is scored
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseRegion {
    #[serde(default)]
    pub confidence: f64,
}

/// Recognition response from the single-image endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OcrResponse {
    #[serde(default, alias = "extracted_text")]
    pub full_text: String,
    #[serde(default, alias = "text_regions")]
    pub results: Vec<ResponseRegion>,
}

impl OcrResponse {
    /// Mean region confidence; `None` when no regions came back
    pub fn mean_confidence(&self) -> Option<f64> {
        let confidences: Vec<f64> = self.results.iter().map(|r| r.confidence).collect();
        super::metrics::mean(&confidences)
    }
}

/// Submits one image for recognition
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn recognize(&self, filename: &str, image: Vec<u8>, language: &str) -> Result<OcrResponse>;
}

/// HTTP client for `POST {api_url}/ocr/single`
pub struct HttpOcrClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOcrClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/ocr/single", api_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn recognize(&self, filename: &str, image: Vec<u8>, language: &str) -> Result<OcrResponse> {
        let part = Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("lang", language), ("save_annotated", "false")])
            .multipart(form)
            .send()
            .await
            .context("API request failed")?
            .error_for_status()
            .context("API returned an error status")?;

        response
            .json::<OcrResponse>()
            .await
            .context("Invalid API response body")
    }
}
