//! Bulk CSV/XLSX uploads, their header-only templates, and applicant photographs.

use crate::{
    applicants::ApplicantRequest,
    caller::Caller,
    error::{ApiError, ApiPath, ApiQuery},
    login::{self, RegistrationRequest, UserView},
    tabular::{self, FileFormat, Row},
    views::{ApplicantView, ApplicationView, ParameterView, VillageView},
    AppState,
};
use assist_db::{
    models::{LocationPath, NewApplication, NewParameter},
    status::Role,
    Store,
};
use axum::{
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
    Json,
};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadKind {
    Applicants,
    Applications,
    Parameters,
    Locations,
    Users,
}

impl UploadKind {
    pub fn from_path(kind: &str) -> Result<Self, ApiError> {
        match kind {
            "applicants" => Ok(UploadKind::Applicants),
            "applications" => Ok(UploadKind::Applications),
            "parameters" => Ok(UploadKind::Parameters),
            "locations" => Ok(UploadKind::Locations),
            "users" => Ok(UploadKind::Users),
            other => Err(ApiError::NotFound(format!("No upload named {other:?}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UploadKind::Applicants => "applicants",
            UploadKind::Applications => "applications",
            UploadKind::Parameters => "parameters",
            UploadKind::Locations => "locations",
            UploadKind::Users => "users",
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            UploadKind::Applicants => &[
                "firstName",
                "middleName",
                "lastName",
                "sexId",
                "age",
                "maritalStatusId",
                "idNumber",
                "villageId",
                "postalAddress",
                "physicalAddress",
                "telephone",
            ],
            UploadKind::Applications => &[
                "firstName",
                "middleName",
                "lastName",
                "programmeName",
                "applicationDate",
            ],
            UploadKind::Parameters => &["category", "value"],
            UploadKind::Locations => &[
                "countyName",
                "subCountyName",
                "locationName",
                "subLocationName",
                "villageName",
            ],
            UploadKind::Users => &["username", "password", "name", "role", "email", "phone"],
        }
    }

    fn roles(self) -> &'static [Role] {
        match self {
            UploadKind::Applicants | UploadKind::Applications => &[Role::DataCollector],
            UploadKind::Parameters | UploadKind::Locations | UploadKind::Users => &[Role::Admin],
        }
    }
}

/// What an upload created, as JSON.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(untagged)]
pub enum Uploaded {
    Applicants(Vec<ApplicantView>),
    Applications(Vec<ApplicationView>),
    Parameters(Vec<ParameterView>),
    Villages(Vec<VillageView>),
    Users(Vec<UserView>),
}

impl Uploaded {
    pub fn len(&self) -> usize {
        match self {
            Uploaded::Applicants(v) => v.len(),
            Uploaded::Applications(v) => v.len(),
            Uploaded::Parameters(v) => v.len(),
            Uploaded::Villages(v) => v.len(),
            Uploaded::Users(v) => v.len(),
        }
    }
}

/// Parses the whole file, then stores every row in a single batch. Any bad row fails the batch.
#[tracing::instrument(skip(store, bytes), fields(caller = %caller.username, size = bytes.len()))]
pub async fn upload(
    store: &dyn Store,
    caller: &Caller,
    kind: UploadKind,
    file_name: &str,
    bytes: &[u8],
) -> Result<Uploaded, ApiError> {
    caller.require(kind.roles())?;
    let format = FileFormat::from_file_name(file_name)?;
    let rows = tabular::read(format, bytes, kind.headers().len())?;
    if rows.is_empty() {
        return Err(ApiError::InvalidFile(format!(
            "No valid {} rows found in file",
            kind.name()
        )));
    }
    let uploaded = match kind {
        UploadKind::Applicants => {
            let applicants = rows.iter().map(applicant_row).collect::<Result<Vec<_>, _>>()?;
            Uploaded::Applicants(
                store
                    .create_applicants(applicants)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        }
        UploadKind::Applications => {
            let mut applications = Vec::with_capacity(rows.len());
            for row in &rows {
                applications.push(application_row(store, row).await?);
            }
            Uploaded::Applications(
                store
                    .create_applications(applications)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        }
        UploadKind::Parameters => {
            let parameters = rows
                .iter()
                .map(|row| {
                    Ok(NewParameter {
                        category: row.text(0, "category", 50)?,
                        value: row.text(1, "value", 50)?,
                    })
                })
                .collect::<Result<Vec<_>, ApiError>>()?;
            Uploaded::Parameters(
                store
                    .create_parameters(parameters)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        }
        UploadKind::Locations => {
            let paths = rows
                .iter()
                .map(|row| {
                    Ok(LocationPath {
                        county: row.text(0, "countyName", 100)?,
                        sub_county: row.text(1, "subCountyName", 100)?,
                        location: row.text(2, "locationName", 100)?,
                        sub_location: row.text(3, "subLocationName", 100)?,
                        village: row.text(4, "villageName", 100)?,
                    })
                })
                .collect::<Result<Vec<_>, ApiError>>()?;
            Uploaded::Villages(
                store
                    .upsert_location_paths(paths)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        }
        UploadKind::Users => {
            let users = rows.iter().map(user_row).collect::<Result<Vec<_>, _>>()?;
            Uploaded::Users(
                store
                    .create_users(users)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        }
    };
    tracing::info!(kind = kind.name(), rows = uploaded.len(), "upload stored");
    Ok(uploaded)
}

fn applicant_row(row: &Row) -> Result<assist_db::models::NewApplicant, ApiError> {
    ApplicantRequest {
        first_name: row.optional(0),
        middle_name: row.optional(1),
        last_name: row.optional(2),
        sex_id: Some(row.integer(3, "sexId")?),
        age: Some(row.integer(4, "age")?),
        marital_status_id: Some(row.integer(5, "maritalStatusId")?),
        id_number: row.optional(6),
        village_id: Some(row.integer(7, "villageId")?),
        postal_address: row.optional(8),
        physical_address: row.optional(9),
        telephone: row.optional(10),
        programme_id: None,
    }
    .validate()
    .map_err(|err| row.invalid(err))
}

async fn application_row(store: &dyn Store, row: &Row) -> Result<NewApplication, ApiError> {
    let first_name = row.required(0, "firstName")?;
    let middle_name = row.optional(1);
    let last_name = row.required(2, "lastName")?;
    let programme_name = row.required(3, "programmeName")?;
    let application_date = row.date(4, "applicationDate")?;
    let applicant = store
        .find_applicant_by_name(&first_name, middle_name.as_deref(), &last_name)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Applicant not found: {}",
                [Some(first_name.as_str()), middle_name.as_deref(), Some(last_name.as_str())]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ")
            ))
        })?;
    let programme = store
        .load_programme_by_name(&programme_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Programme not found: {programme_name}")))?;
    Ok(NewApplication {
        applicant_id: applicant.id,
        programme_id: programme.id,
        application_date,
    })
}

fn user_row(row: &Row) -> Result<assist_db::models::NewUser, ApiError> {
    let request = RegistrationRequest {
        username: row.cell(0).to_owned(),
        password: row.cell(1).to_owned(),
        name: row.cell(2).to_owned(),
        role: Some(row.cell(3).to_owned()),
        email: row.optional(4),
        phone: row.optional(5),
    };
    login::new_user(request, None).map_err(|messages| row.invalid(messages.join("; ")))
}

const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Stores a photograph under `<directory>/images/<applicant id>/` and records its path.
#[tracing::instrument(skip(store, directory, bytes), fields(caller = %caller.username, size = bytes.len()))]
pub async fn store_image(
    store: &dyn Store,
    caller: &Caller,
    directory: &Path,
    applicant_id: i32,
    file_name: &str,
    bytes: &[u8],
) -> Result<ApplicantView, ApiError> {
    caller.require(&[Role::DataCollector])?;
    if bytes.is_empty() {
        return Err(ApiError::InvalidFile("Image cannot be empty".into()));
    }
    let lower = file_name.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(ApiError::InvalidFile(
            "Only JPG, JPEG, and PNG images are allowed".into(),
        ));
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png | image::ImageFormat::Jpeg) => {}
        _ => {
            return Err(ApiError::InvalidFile(
                "File content is not a JPEG or PNG image".into(),
            ))
        }
    }
    if store.load_applicant(applicant_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Applicant not found with ID: {applicant_id}"
        )));
    }
    let folder = directory.join("images").join(applicant_id.to_string());
    tokio::fs::create_dir_all(&folder)
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))?;
    let path = folder.join(format!("{}_{}", uuid::Uuid::new_v4(), safe_file_name(file_name)));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))?;
    let applicant = store
        .set_applicant_image(applicant_id, path.to_string_lossy().into_owned())
        .await?;
    tracing::info!(path = %path.display(), "applicant image stored");
    Ok(applicant.into())
}

/// At most the last 64 characters of the final path component, with anything outside
/// `[A-Za-z0-9._-]` replaced by `_`.
fn safe_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let skip = base.chars().count().saturating_sub(64);
    base.chars()
        .skip(skip)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The named multipart field's file name and contents.
async fn take_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field.bytes().await?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Err(ApiError::InvalidFile(format!(
        "Multipart field {name:?} is missing"
    )))
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct TemplateParams {
    pub format: String,
}

pub async fn upload_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(kind): ApiPath<String>,
    mut multipart: Multipart,
) -> Result<Json<Uploaded>, ApiError> {
    let kind = UploadKind::from_path(&kind)?;
    caller.require(kind.roles())?;
    let (file_name, bytes) = take_field(&mut multipart, "file").await?;
    upload(app_state.store.as_ref(), &caller, kind, &file_name, &bytes)
        .await
        .map(Json)
}

pub async fn image_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
    mut multipart: Multipart,
) -> Result<Json<ApplicantView>, ApiError> {
    caller.require(&[Role::DataCollector])?;
    let (file_name, bytes) = take_field(&mut multipart, "image").await?;
    let directory: PathBuf = app_state.uploads.directory.clone();
    store_image(
        app_state.store.as_ref(),
        &caller,
        &directory,
        applicant_id,
        &file_name,
        &bytes,
    )
    .await
    .map(Json)
}

pub async fn template_handler(
    caller: Caller,
    ApiPath(kind): ApiPath<String>,
    ApiQuery(params): ApiQuery<TemplateParams>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = UploadKind::from_path(&kind)?;
    caller.require(kind.roles())?;
    let format = FileFormat::from_query(&params.format).ok_or_else(|| {
        ApiError::InvalidArgument("Invalid format. Use 'csv' or 'excel'.".into())
    })?;
    let bytes = tabular::template(format, kind.headers())?;
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename={}_template.{}",
                    kind.name(),
                    format.extension()
                ),
            ),
        ],
        bytes,
    ))
}
