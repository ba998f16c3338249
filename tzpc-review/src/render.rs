//! Plain-text rendering of analyses and review rows
//!
//! Presentation only: every function here is pure and takes data already
//! produced by the view model or the store.

use std::fmt::Write;
use tzpc_common::model::{AnalysisStatus, AnalysisSummary, AutoStatus, ComparisonVerdict, ManualVerification};

use crate::view_model::{DefaultsOutcome, LoadReport, ReviewRow};

const NOT_AVAILABLE: &str = "N/A";
const MAX_CELL_WIDTH: usize = 32;

pub fn status_label(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Pending => "pending",
        AnalysisStatus::Processing => "processing",
        AnalysisStatus::Completed => "completed",
        AnalysisStatus::Failed => "failed",
    }
}

pub fn auto_status_label(status: AutoStatus) -> &'static str {
    match status {
        AutoStatus::Matched => "match",
        AutoStatus::Mismatched => "mismatch",
        AutoStatus::Missing => "missing",
    }
}

pub fn verification_mark(value: ManualVerification) -> &'static str {
    match value {
        ManualVerification::Agree => "✓",
        ManualVerification::Disagree => "✗",
        ManualVerification::Unset => "—",
    }
}

/// `N/A` for absent or blank values
pub fn format_value(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn format_seconds(value: Option<f64>) -> String {
    match value {
        Some(secs) => format!("{} sec.", secs),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= width {
        flat
    } else {
        let mut cut: String = flat.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

/// Left-aligned table with capped column widths
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.iter().map(|c| truncate(c, MAX_CELL_WIDTH)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| pad(v, *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(headers.iter().map(|h| h.to_string()).collect()));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  ")
    );
    for row in cells {
        let _ = writeln!(out, "{}", line(row));
    }
    out
}

/// Dashboard listing
pub fn render_analysis_list(analyses: &[AnalysisSummary]) -> String {
    if analyses.is_empty() {
        return "No analyses yet\n".to_string();
    }

    let rows: Vec<Vec<String>> = analyses
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.tz_filename.clone(),
                a.passport_filename.clone(),
                status_label(a.status).to_string(),
            ]
        })
        .collect();

    table(&["ID", "TZ", "PASSPORT", "STATUS"], &rows)
}

/// Analysis header block
pub fn render_summary(summary: &AnalysisSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analysis #{}", summary.id);
    let _ = writeln!(out, "  TZ:              {}", summary.tz_filename);
    let _ = writeln!(out, "  Passport:        {}", summary.passport_filename);
    let _ = writeln!(out, "  Status:          {}", status_label(summary.status));
    let _ = writeln!(out, "  Processing time: {}", format_seconds(summary.processing_time));
    if let Some(error) = &summary.error_message {
        let _ = writeln!(out, "  Error:           {}", error);
    }
    let _ = writeln!(
        out,
        "  Overall review:  {} {}",
        verification_mark(summary.overall_manual_verification),
        format_value(summary.overall_comment.as_deref())
    );
    out
}

/// Model's overall verdict with the criteria lists
pub fn render_verdict(verdict: &ComparisonVerdict) -> String {
    let mut out = String::new();
    if verdict.matched {
        let _ = writeln!(out, "Product meets the requirements");
    } else {
        let _ = writeln!(out, "Product does NOT meet the requirements");
        if !verdict.criteria_error.is_empty() {
            let _ = writeln!(out, "Not met:");
            for c in &verdict.criteria_error {
                let _ = writeln!(out, "  - {}", c);
            }
        }
    }
    if !verdict.criteria_success.is_empty() {
        let _ = writeln!(out, "Met:");
        for c in &verdict.criteria_success {
            let _ = writeln!(out, "  - {}", c);
        }
    }
    out
}

fn row_state(row: &ReviewRow) -> &'static str {
    if row.saving {
        "saving"
    } else if row.dirty {
        "unsaved"
    } else {
        ""
    }
}

/// Results table, one line per field
pub fn render_rows(rows: &[ReviewRow]) -> String {
    if rows.is_empty() {
        return "No comparison results\n".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.key.clone(),
                format_value(r.expected_value.as_deref()),
                format_value(r.actual_value.as_deref()),
                format_value(Some(r.supporting_quote.as_str())),
                auto_status_label(r.auto_status).to_string(),
                verification_mark(r.manual_verification).to_string(),
                format_value(r.specialist_comment.as_deref()),
                row_state(r).to_string(),
            ]
        })
        .collect();

    table(
        &["FIELD", "TZ", "PASSPORT", "QUOTE", "AUTO", "REVIEW", "COMMENT", ""],
        &cells,
    )
}

/// Full, untruncated view of one row
pub fn render_row_detail(row: &ReviewRow) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", row.key);
    let _ = writeln!(out, "  TZ:       {}", format_value(row.expected_value.as_deref()));
    let _ = writeln!(out, "  Passport: {}", format_value(row.actual_value.as_deref()));
    let _ = writeln!(out, "  Quote:    {}", format_value(Some(row.supporting_quote.as_str())));
    let _ = writeln!(out, "  Auto:     {}", auto_status_label(row.auto_status));
    let _ = writeln!(out, "  Review:   {} ({})", verification_mark(row.manual_verification), row.manual_verification);
    let _ = writeln!(out, "  Comment:  {}", format_value(row.specialist_comment.as_deref()));
    let state = row_state(row);
    if !state.is_empty() {
        let _ = writeln!(out, "  State:    {}", state);
    }
    out
}

/// Notices the reviewer should see after a load, if any
pub fn render_load_notices(report: &LoadReport) -> Option<String> {
    let mut out = String::new();
    if let DefaultsOutcome::Ephemeral { reason } = &report.defaults {
        let _ = writeln!(
            out,
            "Warning: default review records could not be stored ({}); unsaved rows are local only",
            reason
        );
    }
    if !report.dropped_keys.is_empty() {
        let _ = writeln!(
            out,
            "Warning: ignored review records for fields no longer in the result: {}",
            report.dropped_keys.join(", ")
        );
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
