//! Benchmark Harness
//!
//! Samples a labeled corpus per language, sends each image to the running
//! service's single-image endpoint, scores the output against ground truth
//! and aggregates per-language statistics. Items run strictly in sequence.

pub mod client;
pub mod dataset;
pub mod metrics;
pub mod report;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

pub use client::{HttpOcrClient, OcrClient, OcrResponse};
pub use dataset::{discover_samples, sample, LabeledSample};
pub use metrics::{accuracy, normalize_text, percentile, Stats, TextNormalization, SCORING_NORMALIZATION};

use metrics::scored_len;

/// Run identifier: `{YYYYmmdd_HHMMSS}_{user}`
pub fn make_run_id(user: &str) -> String {
    format!("{}_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"), user)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

/// Outcome for one sampled image. Numeric fields that could not be
/// measured are absent rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRecord {
    pub run_id: String,
    pub language: String,
    pub image_file: String,
    pub ground_truth_file: String,
    pub latency_seconds: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub accuracy: Option<f64>,
    pub ocr_text_length: Option<usize>,
    pub ground_truth_length: Option<usize>,
    pub status: RecordStatus,
    pub error_message: Option<String>,
}

impl BenchmarkRecord {
    fn new(run_id: &str, sample: &LabeledSample) -> Self {
        Self {
            run_id: run_id.to_string(),
            language: sample.language.clone(),
            image_file: sample.image_file(),
            ground_truth_file: sample.ground_truth_file(),
            latency_seconds: None,
            avg_confidence: None,
            accuracy: None,
            ocr_text_length: None,
            ground_truth_length: None,
            status: RecordStatus::Success,
            error_message: None,
        }
    }

    fn fail(mut self, message: String) -> Self {
        self.status = RecordStatus::Error;
        self.error_message = Some(message);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Per-language aggregate. Statistics cover successful records only and
/// are absent when there is nothing to aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageSummary {
    pub run_id: String,
    pub language: String,
    pub images_requested: usize,
    pub images_available: usize,
    pub images_processed: usize,
    pub images_succeeded: usize,
    pub images_failed: usize,
    pub seed: u64,
    pub avg_latency_seconds: Option<f64>,
    pub min_latency_seconds: Option<f64>,
    pub max_latency_seconds: Option<f64>,
    pub median_latency_seconds: Option<f64>,
    pub p95_latency_seconds: Option<f64>,
    pub avg_accuracy: Option<f64>,
    pub min_accuracy: Option<f64>,
    pub max_accuracy: Option<f64>,
    pub median_accuracy: Option<f64>,
    pub p95_accuracy: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub avg_ocr_text_length: Option<f64>,
    pub min_ocr_text_length: Option<f64>,
    pub max_ocr_text_length: Option<f64>,
    pub avg_ground_truth_length: Option<f64>,
    pub min_ground_truth_length: Option<f64>,
    pub max_ground_truth_length: Option<f64>,
    pub total_run_time_seconds: f64,
}

impl LanguageSummary {
    pub fn from_records(
        run_id: &str,
        language: &str,
        requested: usize,
        available: usize,
        seed: u64,
        records: &[BenchmarkRecord],
        wall_time_seconds: f64,
    ) -> Self {
        let ok: Vec<&BenchmarkRecord> = records.iter().filter(|r| r.is_success()).collect();
        let collect = |f: fn(&BenchmarkRecord) -> Option<f64>| -> Vec<f64> {
            ok.iter().filter_map(|r| f(r)).collect()
        };

        let latency = Stats::from_values(&collect(|r| r.latency_seconds));
        let accuracy = Stats::from_values(&collect(|r| r.accuracy));
        let confidence = Stats::from_values(&collect(|r| r.avg_confidence));
        let ocr_len = Stats::from_values(&collect(|r| r.ocr_text_length.map(|n| n as f64)));
        let truth_len = Stats::from_values(&collect(|r| r.ground_truth_length.map(|n| n as f64)));

        Self {
            run_id: run_id.to_string(),
            language: language.to_string(),
            images_requested: requested,
            images_available: available,
            images_processed: records.len(),
            images_succeeded: ok.len(),
            images_failed: records.len() - ok.len(),
            seed,
            avg_latency_seconds: latency.map(|s| s.mean),
            min_latency_seconds: latency.map(|s| s.min),
            max_latency_seconds: latency.map(|s| s.max),
            median_latency_seconds: latency.map(|s| s.median),
            p95_latency_seconds: latency.map(|s| s.p95),
            avg_accuracy: accuracy.map(|s| s.mean),
            min_accuracy: accuracy.map(|s| s.min),
            max_accuracy: accuracy.map(|s| s.max),
            median_accuracy: accuracy.map(|s| s.median),
            p95_accuracy: accuracy.map(|s| s.p95),
            avg_confidence: confidence.map(|s| s.mean),
            min_confidence: confidence.map(|s| s.min),
            max_confidence: confidence.map(|s| s.max),
            avg_ocr_text_length: ocr_len.map(|s| s.mean),
            min_ocr_text_length: ocr_len.map(|s| s.min),
            max_ocr_text_length: ocr_len.map(|s| s.max),
            avg_ground_truth_length: truth_len.map(|s| s.mean),
            min_ground_truth_length: truth_len.map(|s| s.min),
            max_ground_truth_length: truth_len.map(|s| s.max),
            total_run_time_seconds: wall_time_seconds,
        }
    }
}

/// Everything a benchmark run produced
#[derive(Debug, Clone, Default)]
pub struct BenchmarkReport {
    pub records: Vec<BenchmarkRecord>,
    pub summaries: Vec<LanguageSummary>,
}

/// Drives an `OcrClient` over sampled dataset images
pub struct BenchmarkHarness<C: OcrClient> {
    client: C,
    run_id: String,
    /// Absolute dataset directories per language
    datasets: BTreeMap<String, Vec<PathBuf>>,
}

impl<C: OcrClient> BenchmarkHarness<C> {
    pub fn new(client: C, run_id: String, datasets: BTreeMap<String, Vec<PathBuf>>) -> Self {
        Self {
            client,
            run_id,
            datasets,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Benchmark each language independently. Languages without a dataset
    /// or without any labeled pairs are skipped with a warning.
    pub async fn run(&self, languages: &[String], sample_size: usize, seed: u64) -> BenchmarkReport {
        info!(
            "Starting benchmark run {} | languages: {:?} | sample size: {} | seed: {}",
            self.run_id, languages, sample_size, seed
        );

        let mut report = BenchmarkReport::default();
        for language in languages {
            let Some(dirs) = self.datasets.get(language) else {
                warn!("No dataset configured for language '{}', skipping", language);
                continue;
            };

            let available = discover_samples(language, dirs);
            if available.is_empty() {
                warn!("No samples found for language '{}', skipping", language);
                continue;
            }

            let selected = sample(&available, sample_size, seed);
            info!("[{}] Selected {} images", language, selected.len());

            let start = Instant::now();
            let mut records = Vec::with_capacity(selected.len());
            for (index, item) in selected.iter().enumerate() {
                let record = self.benchmark_one(item).await;
                match &record.error_message {
                    Some(message) => warn!(
                        "[{}] {}/{} {} failed: {}",
                        language,
                        index + 1,
                        selected.len(),
                        record.image_file,
                        message
                    ),
                    None => info!(
                        "[{}] {}/{} {} | latency={:.3}s | accuracy={:.4}",
                        language,
                        index + 1,
                        selected.len(),
                        record.image_file,
                        record.latency_seconds.unwrap_or_default(),
                        record.accuracy.unwrap_or_default()
                    ),
                }
                records.push(record);
            }

            report.summaries.push(LanguageSummary::from_records(
                &self.run_id,
                language,
                sample_size,
                available.len(),
                seed,
                &records,
                start.elapsed().as_secs_f64(),
            ));
            report.records.extend(records);
        }

        report
    }

    async fn benchmark_one(&self, item: &LabeledSample) -> BenchmarkRecord {
        let mut record = BenchmarkRecord::new(&self.run_id, item);

        let ground_truth = match std::fs::read_to_string(&item.ground_truth_path) {
            Ok(text) => text,
            Err(e) => return record.fail(format!("Failed to read ground truth: {}", e)),
        };
        record.ground_truth_length = Some(scored_len(&ground_truth));

        let image = match std::fs::read(&item.image_path) {
            Ok(bytes) => bytes,
            Err(e) => return record.fail(format!("Failed to read image: {}", e)),
        };

        let start = Instant::now();
        let response = match self
            .client
            .recognize(&record.image_file, image, &item.language)
            .await
        {
            Ok(response) => response,
            Err(e) => return record.fail(format!("{:#}", e)),
        };
        record.latency_seconds = Some(start.elapsed().as_secs_f64());

        record.ocr_text_length = Some(scored_len(&response.full_text));
        record.avg_confidence = response.mean_confidence();
        record.accuracy = Some(accuracy(&response.full_text, &ground_truth));
        record
    }
}
