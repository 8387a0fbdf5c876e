//! Report encoders: CSV, JSON backup and, with the `xlsx` feature, spreadsheets.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::report::{Report, ReportRow};
use crate::task::ISO_DATE_FORMAT;

/// Column headers shared by the CSV and spreadsheet exports.
pub const CSV_HEADERS: [&str; 3] = ["Day Number", "Date", "Task"];

const FILE_PREFIX: &str = "internship_report";

/// Error type for exports.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Export produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
    /// The binary was built without the `xlsx` feature.
    #[error("Spreadsheet export is not available in this build")]
    SpreadsheetUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// `internship_report_YYYY-MM-DD.<ext>`
pub fn default_file_name(format: ExportFormat, today: NaiveDate) -> String {
    format!(
        "{}_{}.{}",
        FILE_PREFIX,
        today.format(ISO_DATE_FORMAT),
        format.extension()
    )
}

/// Whether this build can write spreadsheets.
pub fn spreadsheet_supported() -> bool {
    cfg!(feature = "xlsx")
}

fn day_cell(row: &ReportRow) -> String {
    row.day_number.map(|day| day.to_string()).unwrap_or_default()
}

/// Encodes the report as CSV with a `Day Number,Date,Task` header.
///
/// Rows without a day number get an empty first column.
pub fn to_csv(report: &Report) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for row in report.rows() {
        let date = row.date.format(ISO_DATE_FORMAT).to_string();
        writer.write_record([day_cell(row).as_str(), date.as_str(), row.task.as_str()])?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Serialize)]
struct Backup<'a> {
    export_date: DateTime<Utc>,
    total_tasks: usize,
    tasks: &'a [ReportRow],
}

/// Encodes the report as a pretty-printed JSON backup document.
pub fn to_json(report: &Report, exported_at: DateTime<Utc>) -> Result<String, ExportError> {
    let backup = Backup {
        export_date: exported_at,
        total_tasks: report.len(),
        tasks: report.rows(),
    };
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// Encodes the report as an `.xlsx` workbook with one sheet.
#[cfg(feature = "xlsx")]
pub fn to_spreadsheet(report: &Report) -> Result<Vec<u8>, ExportError> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Internship Tasks")?;
    for (col, title) in CSV_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    for (index, row) in report.rows().iter().enumerate() {
        let line = index as u32 + 1;
        if let Some(day) = row.day_number {
            worksheet.write_number(line, 0, f64::from(day))?;
        }
        worksheet.write_string(line, 1, row.date.format(ISO_DATE_FORMAT).to_string())?;
        worksheet.write_string(line, 2, row.task.as_str())?;
    }
    worksheet.autofit();
    Ok(workbook.save_to_buffer()?)
}

#[cfg(not(feature = "xlsx"))]
pub fn to_spreadsheet(_report: &Report) -> Result<Vec<u8>, ExportError> {
    Err(ExportError::SpreadsheetUnavailable)
}

pub async fn write_spreadsheet(report: &Report, path: &Path) -> Result<(), ExportError> {
    let bytes = to_spreadsheet(report)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Encodes the report in `format` and writes it to `path`.
#[tracing::instrument(skip(report, exported_at), fields(rows = report.len()))]
pub async fn write_report(
    report: &Report,
    format: ExportFormat,
    path: &Path,
    exported_at: DateTime<Utc>,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Csv => tokio::fs::write(path, to_csv(report)?).await?,
        ExportFormat::Json => tokio::fs::write(path, to_json(report, exported_at)?).await?,
        ExportFormat::Xlsx => write_spreadsheet(report, path).await?,
    }
    tracing::info!("Exported {} rows to {}", report.len(), path.display());
    Ok(())
}
