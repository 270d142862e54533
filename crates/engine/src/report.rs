//! Final scan reports.
//!
//! Two artifacts per scan: a human-readable text summary and a JSON dump
//! of every record for downstream tooling.

use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::record::{FileRecord, HealthStatus, ResultStore, StatusCounts};

/// Error type for report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths of the written report files.
#[derive(Debug)]
pub struct ReportPaths {
    pub text: PathBuf,
    pub json: PathBuf,
}

#[derive(Debug, Serialize)]
struct JsonReport {
    generated_at_ms: u64,
    totals: StatusCounts,
    files: Vec<FileRecord>,
}

/// Writes both report files into `output_dir` and returns their paths.
pub fn write_reports(store: &ResultStore, output_dir: &Path) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(output_dir)?;

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let records = store.snapshot();
    let totals = store.counts();

    let text_path = output_dir.join(format!("damage_report_{stamp}.txt"));
    fs::write(&text_path, render_text_report(&records, &totals))?;

    let json_path = output_dir.join(format!("damage_report_{stamp}.json"));
    let report = JsonReport {
        generated_at_ms: stamp * 1000,
        totals,
        files: records,
    };
    fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;

    Ok(ReportPaths {
        text: text_path,
        json: json_path,
    })
}

/// Renders the text summary: totals first, then the files that need
/// attention with their details.
pub fn render_text_report(records: &[FileRecord], totals: &StatusCounts) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "MEDIA DAMAGE REPORT");
    let _ = writeln!(out, "===================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total files checked: {}", totals.total);
    let _ = writeln!(out, "  Healthy:    {}", totals.healthy);
    let _ = writeln!(out, "  Corrupt:    {}", totals.corrupt);
    let _ = writeln!(out, "  Suspicious: {}", totals.suspicious);
    let _ = writeln!(out, "  Skipped:    {}", totals.skipped);
    let _ = writeln!(out, "  Error:      {}", totals.error);

    for (header, status) in [
        ("CORRUPT FILES", HealthStatus::Corrupt),
        ("SUSPICIOUS FILES", HealthStatus::Suspicious),
        ("FAILED CHECKS", HealthStatus::Error),
    ] {
        let matching: Vec<_> = records.iter().filter(|r| r.status == status).collect();
        if matching.is_empty() {
            continue;
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{header}");
        let _ = writeln!(out, "{}", "-".repeat(header.len()));
        for record in matching {
            let _ = writeln!(out, "{}", record.path.display());
            let _ = writeln!(out, "    {}", record.details);
            if let Some(message) = &record.error_message {
                let _ = writeln!(out, "    {message}");
            }
        }
    }

    out
}
