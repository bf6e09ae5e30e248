//! Replay summary → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): one line per segment, then a totals line
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use std::path::Path;
use walplayer_engine::{ReplaySummary, SegmentReport};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Format a finished run.
pub fn format_summary(summary: &ReplaySummary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => format_json(summary),
        OutputMode::Human => format_human(summary),
    }
}

/// Format an error.
pub fn format_error(err: &anyhow::Error, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&serde_json::json!({
            "error": format!("{:#}", err)
        }))
        .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", err)),
        OutputMode::Human => format!("(error) {:#}", err),
    }
}

fn format_human(summary: &ReplaySummary) -> String {
    let mut lines = Vec::with_capacity(summary.reports.len() + 2);

    for path in &summary.already_complete {
        lines.push(format!("{:<24} {:<9}", display_name(path), "done"));
    }
    for report in &summary.reports {
        lines.push(format_report_human(report));
    }
    for err in &summary.progress_errors {
        lines.push(format!("(error) {}", err));
    }

    let totals = summary.totals();
    let failed = summary.failed().count();
    lines.push(format!(
        "(run {}) {} segment(s), {} failed, {} entries, {} replayed, {} filtered, {} skipped, {} mutations in {} ms",
        summary.run_id,
        summary.reports.len(),
        failed,
        totals.entries_read,
        totals.replayed,
        totals.filtered(),
        totals.skipped_malformed,
        totals.mutations_applied,
        summary.elapsed.as_millis()
    ));
    lines.join("\n")
}

fn format_report_human(report: &SegmentReport) -> String {
    let counts = &report.counts;
    let mut line = format!(
        "{:<24} {:<9} entries={} replayed={} filtered={} skipped={} mutations={}",
        display_name(&report.path),
        state_name(report),
        counts.entries_read,
        counts.replayed,
        counts.filtered(),
        counts.skipped_malformed,
        counts.mutations_applied
    );
    if let Some(err) = &report.error {
        line.push_str(&format!(" (error) {}", err));
    }
    line
}

fn format_json(summary: &ReplaySummary) -> String {
    let segments: Vec<serde_json::Value> = summary
        .reports
        .iter()
        .map(|report| {
            serde_json::json!({
                "path": report.path.display().to_string(),
                "state": report.state,
                "sealed": report.sealed,
                "start_offset": report.start_offset,
                "resume_offset": report.resume_offset,
                "counts": report.counts,
                "error": report.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    let already_complete: Vec<String> = summary
        .already_complete
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let progress_errors: Vec<String> = summary
        .progress_errors
        .iter()
        .map(|e| e.to_string())
        .collect();

    let value = serde_json::json!({
        "run_id": summary.run_id.to_string(),
        "success": summary.is_success(),
        "cancelled": summary.was_cancelled(),
        "elapsed_ms": summary.elapsed.as_millis() as u64,
        "totals": summary.totals(),
        "segments": segments,
        "already_complete": already_complete,
        "progress_errors": progress_errors,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| format!("{}", value))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn state_name(report: &SegmentReport) -> String {
    serde_json::to_value(report.state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", report.state))
}
