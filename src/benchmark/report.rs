//! Benchmark report output: CSV files and the console summary table

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{BenchmarkRecord, LanguageSummary};

/// Paths of the details and summary CSVs for a run
pub fn report_paths(output_dir: &Path, run_id: &str) -> (PathBuf, PathBuf) {
    (
        output_dir.join(format!("benchmark_{}_details.csv", run_id)),
        output_dir.join(format!("benchmark_{}_summary.csv", run_id)),
    )
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per sampled image
pub fn write_details_csv(path: &Path, records: &[BenchmarkRecord]) -> Result<()> {
    write_csv(path, records)
}

/// One row per language
pub fn write_summary_csv(path: &Path, summaries: &[LanguageSummary]) -> Result<()> {
    write_csv(path, summaries)
}

/// Fixed-width per-language table for the console
pub fn format_summary_table(summaries: &[LanguageSummary]) -> String {
    let rule = "=".repeat(84);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "BENCHMARK SUMMARY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "{:<10} {:>6} {:>6} {:>6} {:>12} {:>12} {:>13} {:>15}",
        "Language", "Total", "OK", "Fail", "Avg Latency", "P95 Latency", "Avg Accuracy", "Avg Confidence"
    );
    let _ = writeln!(out, "{}", "-".repeat(84));

    let seconds = |v: Option<f64>| v.map(|v| format!("{:.3}s", v)).unwrap_or_else(|| "N/A".to_string());
    let ratio = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "N/A".to_string());

    for s in summaries {
        let _ = writeln!(
            out,
            "{:<10} {:>6} {:>6} {:>6} {:>12} {:>12} {:>13} {:>15}",
            s.language,
            s.images_processed,
            s.images_succeeded,
            s.images_failed,
            seconds(s.avg_latency_seconds),
            seconds(s.p95_latency_seconds),
            ratio(s.avg_accuracy),
            ratio(s.avg_confidence),
        );
    }
    let _ = writeln!(out, "{}", rule);
    out
}
