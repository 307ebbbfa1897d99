//! Markdown summary of a benchmark run

use crate::benchmarks::BenchmarkResult;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "summary.md";

pub fn render_summary(results: &[BenchmarkResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Code Mode token savings\n");

    let ok: Vec<&BenchmarkResult> = results.iter().filter(|r| r.is_success()).collect();
    let baseline: u64 = ok.iter().filter_map(|r| r.baseline_tokens()).sum();
    let code_mode: u64 = ok.iter().filter_map(|r| r.code_mode_tokens()).sum();

    let _ = writeln!(
        out,
        "{} scenarios ({} failed). Estimated tokens: {} loading every schema, {} with progressive discovery.\n",
        results.len(),
        results.len() - ok.len(),
        baseline,
        code_mode
    );

    let _ = writeln!(out, "| Scenario | Baseline | Code Mode | Saved | Savings |");
    let _ = writeln!(out, "|---|---:|---:|---:|---:|");
    for result in results {
        if !result.is_success() {
            let error = result
                .get_metric("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            let _ = writeln!(out, "| {} | - | - | - | failed: {} |", result.target_id, error);
            continue;
        }
        let saved = result
            .get_metric("tokens_saved")
            .and_then(|v| v.as_i64())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {:.1}% |",
            result.target_id,
            result.baseline_tokens().unwrap_or_default(),
            result.code_mode_tokens().unwrap_or_default(),
            saved,
            result.savings_percent().unwrap_or_default()
        );
    }

    if baseline > 0 {
        let overall = (baseline as f64 - code_mode as f64) / baseline as f64 * 100.0;
        let _ = writeln!(out, "\nOverall savings: {:.1}%", overall);
    }
    out
}

pub fn write_summary(results: &[BenchmarkResult], output_dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let dir = output_dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(SUMMARY_FILE);
    std::fs::write(&path, render_summary(results))?;
    Ok(path)
}
