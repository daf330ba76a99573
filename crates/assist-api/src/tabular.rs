//! Reading uploaded CSV and XLSX sheets into rows of trimmed text cells, and writing header-only
//! templates in either format.

use crate::error::ApiError;
use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Dispatches on the upload's file name extension.
    pub fn from_file_name(file_name: &str) -> Result<Self, ApiError> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(FileFormat::Xlsx)
        } else {
            Err(ApiError::InvalidFile(
                "Only CSV and Excel (.csv, .xlsx) files are allowed".into(),
            ))
        }
    }

    /// Parses a `format` query value: `csv`, `excel` or `xlsx`.
    pub fn from_query(format: &str) -> Option<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "excel" | "xlsx" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FileFormat::Csv => "text/csv",
            FileFormat::Xlsx => XLSX_CONTENT_TYPE,
        }
    }
}

/// A data row and its 1-based line (CSV) or row (XLSX) number in the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub number: usize,
    pub cells: Vec<String>,
}

impl Row {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or_default()
    }

    /// The cell, or `None` when it is blank.
    pub fn optional(&self, index: usize) -> Option<String> {
        Some(self.cell(index))
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
    }

    pub fn invalid(&self, message: impl std::fmt::Display) -> ApiError {
        ApiError::InvalidFile(format!("Row {}: {message}", self.number))
    }

    pub fn required(&self, index: usize, column: &str) -> Result<String, ApiError> {
        self.optional(index)
            .ok_or_else(|| self.invalid(format!("{column} is required")))
    }

    /// A required cell of at most `max` characters.
    pub fn text(&self, index: usize, column: &str, max: usize) -> Result<String, ApiError> {
        let text = self.required(index, column)?;
        if text.chars().count() > max {
            return Err(self.invalid(format!("{column} must not exceed {max} characters")));
        }
        Ok(text)
    }

    pub fn integer(&self, index: usize, column: &str) -> Result<i32, ApiError> {
        let text = self.cell(index);
        text.parse()
            .map_err(|_| self.invalid(format!("{column} {text:?} is not a whole number")))
    }

    pub fn date(&self, index: usize, column: &str) -> Result<jiff::civil::Date, ApiError> {
        let text = self.cell(index);
        text.parse()
            .map_err(|_| self.invalid(format!("{column} {text:?} is not a YYYY-MM-DD date")))
    }
}

/// Reads the sheet, checks that the header row has at least `width` columns and returns the
/// data rows that are at least `width` cells wide. Shorter and blank rows are skipped.
pub fn read(format: FileFormat, bytes: &[u8], width: usize) -> Result<Vec<Row>, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::InvalidFile("File cannot be empty".into()));
    }
    let mut rows = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Xlsx => read_xlsx(bytes)?,
    }
    .into_iter();
    match rows.next() {
        Some(header) if header.cells.len() >= width => {}
        _ => {
            return Err(ApiError::InvalidFile(format!(
                "Header row must have at least {width} columns"
            )))
        }
    }
    Ok(rows
        .filter(|row| row.cells.len() >= width && row.cells.iter().any(|c| !c.is_empty()))
        .collect())
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Row>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| ApiError::InvalidFile(format!("Unreadable CSV: {err}")))?;
        let number = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        rows.push(Row {
            number,
            cells: record.iter().map(str::to_owned).collect(),
        });
    }
    Ok(rows)
}

fn read_xlsx(bytes: &[u8]) -> Result<Vec<Row>, ApiError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|err| ApiError::InvalidFile(format!("Unreadable Excel file: {err}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::InvalidFile("Excel file has no worksheets".into()))?
        .map_err(|err| ApiError::InvalidFile(format!("Unreadable Excel file: {err}")))?;
    // The range starts at the first used cell, not at A1.
    let (first_row, first_column) = range.start().unwrap_or((0, 0));
    Ok(range
        .rows()
        .enumerate()
        .map(|(index, cells)| Row {
            number: first_row as usize + index + 1,
            cells: std::iter::repeat_n(String::new(), first_column as usize)
                .chain(cells.iter().map(cell_text))
                .collect(),
        })
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            text.trim().to_owned()
        }
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => excel_date(value.as_f64())
            .map(|date| date.to_string())
            .unwrap_or_else(|| value.as_f64().to_string()),
    }
}

/// Converts an Excel serial day number (1900 date system) to a calendar date.
fn excel_date(serial: f64) -> Option<jiff::civil::Date> {
    let days = serial.floor() as i64;
    jiff::civil::date(1899, 12, 30)
        .checked_add(jiff::Span::new().try_days(days).ok()?)
        .ok()
}

/// A file holding only the header row.
pub fn template(format: FileFormat, headers: &[&str]) -> Result<Vec<u8>, ApiError> {
    match format {
        FileFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(headers).map_err(ApiError::internal)?;
            writer.into_inner().map_err(ApiError::internal)
        }
        FileFormat::Xlsx => {
            let mut workbook = rust_xlsxwriter::Workbook::new();
            let sheet = workbook.add_worksheet();
            sheet.set_name("Template").map_err(ApiError::internal)?;
            for (column, header) in headers.iter().enumerate() {
                sheet
                    .write_string(0, column as u16, *header)
                    .map_err(ApiError::internal)?;
            }
            workbook.save_to_buffer().map_err(ApiError::internal)
        }
    }
}
