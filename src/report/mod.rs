//! Report generation.
//!
//! This module contains:
//! - Condensed JSON views of a results file (`format`)
//! - Markdown summary and insights reports
//! - Excel workbooks and SVG charts (`analyze`)

pub mod charts;
pub mod generator;
pub mod json;
pub mod spreadsheet;

pub use generator::{generate_insights_report, generate_summary_markdown};

use crate::analysis::metric_averages;
use crate::models::EvaluationRun;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix of the raw results file written by `evaluate`.
pub const RESULTS_SUFFIX: &str = "_results.json";

/// Read a `*_results.json` file.
pub fn load_run(path: &Path) -> Result<EvaluationRun> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse results file: {}", path.display()))
}

/// Write a value as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Base name of a results file: `support_results.json` becomes `support`.
pub fn output_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(stem) = name.strip_suffix(RESULTS_SUFFIX) {
        return stem.to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name)
}

/// Write the metrics-only JSON, test-case-flow JSON and summary markdown for
/// one results file. Outputs go next to it unless `output_dir` is given.
pub fn format_results(results_path: &Path, output_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let run = load_run(results_path)?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => results_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let stem = output_stem(results_path);

    let metrics_path = dir.join(format!("{}_metrics_only.json", stem));
    write_json(&json::metrics_only(&run), &metrics_path)?;

    let flow_path = dir.join(format!("{}_test_case_flow.json", stem));
    write_json(&json::test_case_flow(&run), &flow_path)?;

    let summary_path = dir.join(format!("{}_summary.md", stem));
    std::fs::write(&summary_path, generate_summary_markdown(&run))
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!("Formatted {}", results_path.display());
    Ok(vec![metrics_path, flow_path, summary_path])
}

/// Raw results files in a directory, sorted by name.
pub fn find_results(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(RESULTS_SUFFIX))
                    .unwrap_or(false)
        })
        .collect();
    found.sort();
    Ok(found)
}

/// Format every results file in `dir`. A file that fails is warned about
/// and skipped.
pub fn format_all(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = find_results(dir)?;
    if files.is_empty() {
        warn!("No *{} files found in {}", RESULTS_SUFFIX, dir.display());
    }

    let mut written = Vec::new();
    for file in files {
        match format_results(&file, None) {
            Ok(paths) => written.extend(paths),
            Err(e) => warn!("Failed to format {}: {:#}", file.display(), e),
        }
    }
    Ok(written)
}

/// Write the detailed and executive workbooks, charts and insights report for
/// one results file into `analysis_dir`.
pub fn analyze_results(results_path: &Path, analysis_dir: &Path) -> Result<Vec<PathBuf>> {
    let run = load_run(results_path)?;
    let stem = output_stem(results_path);
    let charts_dir = analysis_dir.join("charts");
    std::fs::create_dir_all(&charts_dir)
        .with_context(|| format!("Failed to create {}", charts_dir.display()))?;

    let averages = metric_averages(&run);
    let mut written = Vec::new();

    let detailed = analysis_dir.join(format!("{}_detailed_analysis.xlsx", stem));
    spreadsheet::write_workbook(&[spreadsheet::detailed_analysis(&run)], &detailed)?;
    written.push(detailed);

    let executive = analysis_dir.join(format!("{}_executive_summary.xlsx", stem));
    spreadsheet::write_workbook(&spreadsheet::executive_summary(&run, &averages), &executive)?;
    written.push(executive);

    written.extend(charts::write_charts(&run, &averages, &charts_dir));

    let insights = analysis_dir.join(format!("{}_insights_report.md", stem));
    let source = results_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    std::fs::write(&insights, generate_insights_report(&source, &averages))
        .with_context(|| format!("Failed to write {}", insights.display()))?;
    written.push(insights);

    info!("Analyzed {}", results_path.display());
    Ok(written)
}
