// Report generation: the spreadsheet that goes into the archive, and the
// run summary shown on screen

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

pub const REPORT_FILE_NAME: &str = "Laporan_Klasifikasi.xlsx";
pub const ARCHIVE_FILE_NAME: &str = "hasil_klasifikasi.zip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Building,
    NotBuilding,
    /// Server answered with a non-200 status.
    ErrorDownload { status: u16 },
    /// Network, timeout, decode or model failure for this row.
    ErrorOther(String),
}

impl Label {
    pub fn is_error(&self) -> bool {
        matches!(self, Label::ErrorDownload { .. } | Label::ErrorOther(_))
    }
}

/// The text written to the `klasifikasi` column.
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Building => write!(f, "Building"),
            Label::NotBuilding => write!(f, "Not Building"),
            Label::ErrorDownload { .. } => write!(f, "Error Download"),
            Label::ErrorOther(message) => write!(f, "Error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub url: String,
    pub label: Label,
}

/// Write `results` as a two-column sheet (`URL`, `klasifikasi`), one row per
/// result in the order given.
pub fn write_report(path: &Path, results: &[ClassificationResult]) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    sheet.write_string_with_format(0, 0, "URL", &header)?;
    sheet.write_string_with_format(0, 1, "klasifikasi", &header)?;

    for (i, result) in results.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &result.url)?;
        sheet.write_string(row, 1, result.label.to_string())?;
    }

    workbook.save(path)?;
    info!(path = %path.display(), rows = results.len(), "Report written");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub building: usize,
    pub not_building: usize,
    pub download_errors: usize,
    pub other_errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_results(
        results: &[ClassificationResult],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let count = |pred: fn(&Label) -> bool| results.iter().filter(|r| pred(&r.label)).count();

        Self {
            total: results.len(),
            building: count(|l| matches!(l, Label::Building)),
            not_building: count(|l| matches!(l, Label::NotBuilding)),
            download_errors: count(|l| matches!(l, Label::ErrorDownload { .. })),
            other_errors: count(|l| matches!(l, Label::ErrorOther(_))),
            started_at,
            finished_at,
        }
    }

    pub fn errors(&self) -> usize {
        self.download_errors + self.other_errors
    }

    pub fn completion_message(&self) -> String {
        format!("✅ Done! {} Building detected.", self.building)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    summary: &'a RunSummary,
    results: &'a [ClassificationResult],
}

/// Render the end-of-run summary for a terminal.
pub fn render_summary(
    summary: &RunSummary,
    results: &[ClassificationResult],
    format: ReportFormat,
) -> String {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&JsonSummary { summary, results })
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        ReportFormat::Text => render_text_summary(summary, results),
    }
}

fn render_text_summary(summary: &RunSummary, results: &[ClassificationResult]) -> String {
    let elapsed = summary.finished_at - summary.started_at;

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Rows processed: {}\n", summary.total));
    report.push_str(&format!("  Building: {}\n", summary.building));
    report.push_str(&format!("  Not Building: {}\n", summary.not_building));
    report.push_str(&format!("  Download errors: {}\n", summary.download_errors));
    report.push_str(&format!("  Other errors: {}\n", summary.other_errors));
    report.push_str(&format!(
        "  Duration: {:.1}s\n",
        elapsed.num_milliseconds() as f64 / 1000.0
    ));

    let failed: Vec<(usize, &ClassificationResult)> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.label.is_error())
        .collect();

    if !failed.is_empty() {
        report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
        report.push_str("## Failed rows\n");
        for (index, result) in failed {
            let status = match &result.label {
                Label::ErrorDownload { status } => format!("\x1b[33m{}\x1b[0m", status),
                _ => "\x1b[31mERR\x1b[0m".to_string(),
            };
            report.push_str(&format!(
                "  {:>4} {} {}\n       {}\n",
                index + 1,
                status,
                result.url,
                result.label
            ));
        }
    }

    report.push('\n');
    report.push_str(&summary.completion_message());
    report.push('\n');
    report
}
