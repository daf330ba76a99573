//! Filtered application exports as CSV, XLSX or PDF attachments.

use crate::{
    applications::{parse_application_status, today},
    caller::Caller,
    error::{ApiError, ApiQuery},
    pdf::{self, Letterhead, Table},
    tabular::XLSX_CONTENT_TYPE,
    AppState,
};
use assist_db::{
    query::{ApplicationRow, ExportFilter, LocationScope},
    status::Role,
    Store,
};
use axum::{extract::State, http::header, response::IntoResponse};
use std::path::PathBuf;

const HEADERS: [&str; 5] = ["ID", "Applicant Name", "Programme", "Status", "Application Date"];
const PDF_COLUMN_WIDTHS: [f32; 5] = [0.1, 0.3, 0.28, 0.14, 0.18];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
    Pdf,
}

impl ExportFormat {
    pub fn parse(format: &str) -> Result<Self, ApiError> {
        match format.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "pdf" => Ok(ExportFormat::Pdf),
            _ => Err(ApiError::InvalidArgument(format!(
                "Unsupported format: {format}"
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Excel => XLSX_CONTENT_TYPE,
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub format: String,
    pub status: Option<String>,
    pub start_date: Option<jiff::civil::Date>,
    pub end_date: Option<jiff::civil::Date>,
    pub age: Option<i32>,
    pub sex_id: Option<i32>,
    pub marital_status_id: Option<i32>,
    pub physical_location_level: Option<String>,
    pub physical_location_id: Option<i32>,
    pub org_name: Option<String>,
    pub logo_path: Option<String>,
    pub org_address: Option<String>,
}

/// `All` or a hierarchy level together with the id of a node at that level.
pub fn parse_location(level: Option<&str>, id: Option<i32>) -> Result<LocationScope, ApiError> {
    let level = level.map(str::trim).unwrap_or("All").to_ascii_lowercase();
    if level == "all" || level.is_empty() {
        return Ok(LocationScope::All);
    }
    let scope: fn(i32) -> LocationScope = match level.as_str() {
        "village" => LocationScope::Village,
        "sublocation" => LocationScope::SubLocation,
        "location" => LocationScope::Location,
        "subcounty" => LocationScope::SubCounty,
        "county" => LocationScope::County,
        _ => {
            return Err(ApiError::InvalidArgument(format!(
                "Unknown physical location level: {level}"
            )))
        }
    };
    id.map(scope).ok_or_else(|| {
        ApiError::InvalidArgument("physicalLocationId is required for this location level".into())
    })
}

impl ExportParams {
    /// Parses the filter, defaulting to the three months ending today.
    pub fn filter(&self, today: jiff::civil::Date) -> Result<ExportFilter, ApiError> {
        let end = self.end_date.unwrap_or(today);
        let start = match self.start_date {
            Some(start) => start,
            None => end
                .checked_sub(jiff::Span::new().months(3))
                .map_err(ApiError::internal)?,
        };
        if start > end {
            return Err(ApiError::InvalidArgument(
                "startDate must not be after endDate".into(),
            ));
        }
        Ok(ExportFilter {
            status: parse_application_status(self.status.clone())?,
            start,
            end,
            age: self.age,
            sex_id: self.sex_id,
            marital_status_id: self.marital_status_id,
            location: parse_location(
                self.physical_location_level.as_deref(),
                self.physical_location_id,
            )?,
        })
    }

    fn letterhead(&self) -> Letterhead {
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        Letterhead {
            org_name: non_blank(&self.org_name),
            logo_path: non_blank(&self.logo_path).map(PathBuf::from),
            address: non_blank(&self.org_address),
        }
    }
}

/// The exported file and the format it was written in.
pub struct Export {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

#[tracing::instrument(skip(store, params), fields(caller = %caller.username, format = %params.format))]
pub async fn export(
    store: &dyn Store,
    caller: &Caller,
    params: &ExportParams,
) -> Result<Export, ApiError> {
    caller.require(&[Role::Admin])?;
    let format = ExportFormat::parse(&params.format)?;
    let filter = params.filter(today())?;
    let rows = store.export_applications(&filter).await?;
    tracing::info!(rows = rows.len(), "applications exported");
    let bytes = match format {
        ExportFormat::Csv => to_csv(&rows)?,
        ExportFormat::Excel => to_xlsx(&rows)?,
        ExportFormat::Pdf => {
            let letterhead = params.letterhead();
            tokio::task::spawn_blocking(move || to_pdf(&letterhead, &rows))
                .await
                .map_err(ApiError::internal)??
        }
    };
    Ok(Export { format, bytes })
}

fn cells(row: &ApplicationRow) -> [String; 5] {
    [
        row.id.to_string(),
        row.applicant_name(),
        row.programme_name.clone(),
        row.status.to_string(),
        row.application_date.to_string(),
    ]
}

fn to_csv(rows: &[ApplicationRow]) -> Result<Vec<u8>, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS).map_err(ApiError::internal)?;
    for row in rows {
        writer.write_record(cells(row)).map_err(ApiError::internal)?;
    }
    writer.into_inner().map_err(ApiError::internal)
}

fn to_xlsx(rows: &[ApplicationRow]) -> Result<Vec<u8>, ApiError> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let bold = rust_xlsxwriter::Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Applications").map_err(ApiError::internal)?;
    for (column, header) in HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, column as u16, *header, &bold)
            .map_err(ApiError::internal)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let line = index as u32 + 1;
        sheet
            .write_number(line, 0, f64::from(row.id))
            .map_err(ApiError::internal)?;
        for (column, cell) in cells(row).iter().enumerate().skip(1) {
            sheet
                .write_string(line, column as u16, cell)
                .map_err(ApiError::internal)?;
        }
    }
    sheet.autofit();
    workbook.save_to_buffer().map_err(ApiError::internal)
}

fn to_pdf(letterhead: &Letterhead, rows: &[ApplicationRow]) -> Result<Vec<u8>, ApiError> {
    let rows: Vec<Vec<String>> = rows.iter().map(|row| cells(row).to_vec()).collect();
    pdf::render(
        letterhead,
        &Table {
            headers: &HEADERS,
            widths: &PDF_COLUMN_WIDTHS,
            rows: &rows,
        },
    )
    .map_err(ApiError::internal)
}

pub async fn export_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<ExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let exported = export(app_state.store.as_ref(), &caller, &params).await?;
    Ok((
        [
            (header::CONTENT_TYPE, exported.format.content_type().to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=applications_export.{}",
                    exported.format.extension()
                ),
            ),
        ],
        exported.bytes,
    ))
}
