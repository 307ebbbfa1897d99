//! Reading and writing benchmark results
//!
//! Layout under the output directory:
//! `raw/<scenario>_<timestamp>.json`, `benchmark_results_<timestamp>.json`
//! and `summary.md`.

use crate::benchmarks::BenchmarkResult;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default output directory for benchmark results
pub const OUTPUT_DIR: &str = "benchmarks/output";

/// Subdirectory holding one file per scenario run
pub const RAW_SUBDIR: &str = "raw";

fn result_file_name(result: &BenchmarkResult) -> String {
    format!(
        "{}_{}.json",
        result.target_id.replace(['/', ':', ' '], "_"),
        result.timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Write one result into `dir`, creating it if needed
pub fn write_result_to_dir(result: &BenchmarkResult, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join(result_file_name(result));
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.flush()?;

    Ok(path)
}

/// Write each result under `<output_dir>/raw`
pub fn write_results(results: &[BenchmarkResult], output_dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let raw_dir = output_dir.as_ref().join(RAW_SUBDIR);
    results
        .iter()
        .map(|result| write_result_to_dir(result, &raw_dir))
        .collect()
}

/// Write all results to one timestamped JSON array
pub fn write_combined_results(
    results: &[BenchmarkResult],
    output_dir: impl AsRef<Path>,
) -> std::io::Result<PathBuf> {
    let dir = output_dir.as_ref();
    fs::create_dir_all(dir)?;

    let filename = format!("benchmark_results_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
    let path = dir.join(filename);

    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.flush()?;

    Ok(path)
}

pub fn read_result(path: impl AsRef<Path>) -> std::io::Result<BenchmarkResult> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Every readable result in `dir`, newest first; a missing directory is empty
pub fn read_all_results_from_dir(dir: impl AsRef<Path>) -> std::io::Result<Vec<BenchmarkResult>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            match read_result(&path) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable benchmark result"),
            }
        }
    }

    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(results)
}

/// Most recent stored run of one scenario
pub fn latest_result(target_id: &str, output_dir: impl AsRef<Path>) -> std::io::Result<Option<BenchmarkResult>> {
    let results = read_all_results_from_dir(output_dir.as_ref().join(RAW_SUBDIR))?;
    Ok(results.into_iter().find(|r| r.target_id == target_id))
}
