// Reading the uploaded URL spreadsheet

use crate::error::{Result, RunError};
use calamine::{Reader, open_workbook_auto};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const URL_COLUMN: &str = "URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    pub url: String,
}

impl InputRow {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Reads the `URL` column of the first worksheet. The first row of the used
/// range is the header; every row below it becomes one `InputRow`, blank
/// cells included, so the report lines up with the input.
pub fn read_input_rows(path: &Path) -> Result<Vec<InputRow>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RunError::EmptyWorkbook)??;

    let mut rows = range.rows();
    let header = rows.next().ok_or(RunError::MissingUrlColumn)?;
    let column = header
        .iter()
        .position(|cell| cell.to_string().trim() == URL_COLUMN)
        .ok_or(RunError::MissingUrlColumn)?;

    let input: Vec<InputRow> = rows
        .map(|row| {
            let url = row
                .get(column)
                .map(|cell| cell.to_string())
                .unwrap_or_default();
            InputRow::new(url.trim())
        })
        .collect();

    info!(path = %path.display(), rows = input.len(), "Loaded input spreadsheet");
    Ok(input)
}

/// First `n` rows, for a quick look before starting a run.
pub fn preview(rows: &[InputRow], n: usize) -> &[InputRow] {
    &rows[..rows.len().min(n)]
}
