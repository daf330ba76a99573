use crate::{
    caller::Caller,
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    maker_checker,
    views::{ApplicantView, LogView, PageParams},
    AppState,
};
use assist_db::{
    models::NewApplicant,
    paging::{Page, PageRequest},
    query::ApplicantFilter,
    status::{EntityType, Role, VerificationStatus},
    Store,
};
use axum::{extract::State, http::StatusCode, Json};

/// Body of applicant create and update requests. Every field is optional here so that missing
/// fields are reported together with the other validation messages.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantRequest {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub sex_id: Option<i32>,
    pub age: Option<i32>,
    pub marital_status_id: Option<i32>,
    pub id_number: Option<String>,
    pub village_id: Option<i32>,
    pub postal_address: Option<String>,
    pub physical_address: Option<String>,
    pub telephone: Option<String>,
    /// Only read when registering and applying in one step.
    pub programme_id: Option<i32>,
}

impl ApplicantRequest {
    pub fn validate(self) -> Result<NewApplicant, ApiError> {
        let messages = Vec::new();
        let (messages, first_name) = required_text(messages, self.first_name, "First name", 50);
        let (messages, middle_name) = optional_text(messages, self.middle_name, "Middle name", 50);
        let (messages, last_name) = required_text(messages, self.last_name, "Last name", 50);
        let (messages, sex_id) = required_id(messages, self.sex_id, "Sex ID");
        let (messages, age) = validate_age(messages, self.age);
        let (messages, marital_status_id) =
            required_id(messages, self.marital_status_id, "Marital status ID");
        let (messages, id_number) = required_text(messages, self.id_number, "ID number", 20);
        let (messages, village_id) = required_id(messages, self.village_id, "Village ID");
        let (messages, postal_address) =
            optional_text(messages, self.postal_address, "Postal address", 255);
        let (messages, physical_address) =
            optional_text(messages, self.physical_address, "Physical address", 255);
        let (messages, telephone) = optional_text(messages, self.telephone, "Telephone", 20);
        match (
            first_name,
            last_name,
            sex_id,
            age,
            marital_status_id,
            id_number,
            village_id,
        ) {
            (
                Some(first_name),
                Some(last_name),
                Some(sex_id),
                Some(age),
                Some(marital_status_id),
                Some(id_number),
                Some(village_id),
            ) if messages.is_empty() => Ok(NewApplicant {
                first_name,
                middle_name,
                last_name,
                sex_id,
                age,
                marital_status_id,
                id_number,
                village_id,
                postal_address,
                physical_address,
                telephone,
            }),
            _ => Err(ApiError::Validation(messages)),
        }
    }
}

fn required_text(
    mut messages: Vec<String>,
    value: Option<String>,
    label: &str,
    max: usize,
) -> (Vec<String>, Option<String>) {
    match value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
        None => {
            messages.push(format!("{label} is required"));
            (messages, None)
        }
        Some(value) if value.chars().count() > max => {
            messages.push(format!("{label} must not exceed {max} characters"));
            (messages, None)
        }
        Some(value) => (messages, Some(value)),
    }
}

fn optional_text(
    mut messages: Vec<String>,
    value: Option<String>,
    label: &str,
    max: usize,
) -> (Vec<String>, Option<String>) {
    let value = value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
    if value.as_ref().is_some_and(|v| v.chars().count() > max) {
        messages.push(format!("{label} must not exceed {max} characters"));
    }
    (messages, value)
}

fn required_id(
    mut messages: Vec<String>,
    value: Option<i32>,
    label: &str,
) -> (Vec<String>, Option<i32>) {
    if value.is_none() {
        messages.push(format!("{label} is required"));
    }
    (messages, value)
}

fn validate_age(mut messages: Vec<String>, age: Option<i32>) -> (Vec<String>, Option<i32>) {
    match age {
        None => {
            messages.push("Age is required".into());
            (messages, None)
        }
        Some(age) if age < 0 => {
            messages.push("Age must be non-negative".into());
            (messages, None)
        }
        Some(age) => (messages, Some(age)),
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub name: Option<String>,
    pub id_number: Option<String>,
    pub date_applied: Option<jiff::civil::Date>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct StatusParams {
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VillageParams {
    pub village_id: Option<i32>,
}

#[derive(Clone, Copy, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyParams {
    #[serde(default)]
    pub use_maker_checker: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

pub fn parse_verification_status(status: Option<String>) -> Result<Option<VerificationStatus>, ApiError> {
    non_blank(status)
        .map(|s| {
            s.parse()
                .map_err(|err: assist_db::status::UnknownName| ApiError::InvalidArgument(err.to_string()))
        })
        .transpose()
}

#[tracing::instrument(skip(store, request), fields(caller = %caller.username))]
pub async fn create(
    store: &dyn Store,
    caller: &Caller,
    request: ApplicantRequest,
) -> Result<ApplicantView, ApiError> {
    caller.require(&[Role::DataCollector])?;
    let applicant = store.create_applicant(request.validate()?).await?;
    tracing::info!(applicant_id = applicant.id, "applicant registered");
    Ok(applicant.into())
}

pub async fn get(store: &dyn Store, applicant_id: i32) -> Result<ApplicantView, ApiError> {
    store
        .load_applicant(applicant_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ApiError::NotFound(format!("Applicant not found with ID: {applicant_id}")))
}

pub async fn list(
    store: &dyn Store,
    caller: &Caller,
    allowed: &[Role],
    filter: &ApplicantFilter,
    page: &PageRequest,
) -> Result<Page<ApplicantView>, ApiError> {
    caller.require(allowed)?;
    Ok(store.list_applicants(filter, page).await?.map(Into::into))
}

#[tracing::instrument(skip(store, request), fields(caller = %caller.username))]
pub async fn update(
    store: &dyn Store,
    caller: &Caller,
    applicant_id: i32,
    request: ApplicantRequest,
) -> Result<ApplicantView, ApiError> {
    caller.require(&[Role::Admin, Role::DataCollector])?;
    let applicant = store
        .update_applicant(applicant_id, request.validate()?)
        .await?;
    Ok(applicant.into())
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn delete(store: &dyn Store, caller: &Caller, applicant_id: i32) -> Result<(), ApiError> {
    caller.require(&[Role::Admin])?;
    store.delete_applicant(applicant_id).await?;
    tracing::info!("applicant deleted");
    Ok(())
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn verify(
    store: &dyn Store,
    caller: &Caller,
    applicant_id: i32,
    use_maker_checker: bool,
) -> Result<ApplicantView, ApiError> {
    caller.require(&[Role::Verifier])?;
    let acted = store
        .verify_applicant(applicant_id, caller.id, use_maker_checker)
        .await?;
    match &acted.log {
        Some(log) => tracing::info!(log_id = log.id, "verification proposed"),
        None => tracing::info!("applicant verified"),
    }
    Ok(acted.entity.into())
}

pub async fn create_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ApplicantRequest>,
) -> Result<Json<ApplicantView>, ApiError> {
    create(app_state.store.as_ref(), &caller, request).await.map(Json)
}

pub async fn get_handler(
    State(app_state): State<AppState>,
    _caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
) -> Result<Json<ApplicantView>, ApiError> {
    get(app_state.store.as_ref(), applicant_id).await.map(Json)
}

pub async fn list_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicantView>>, ApiError> {
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector],
        &ApplicantFilter::default(),
        &page.to_request()?,
    )
    .await
    .map(Json)
}

pub async fn update_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
    ApiJson(request): ApiJson<ApplicantRequest>,
) -> Result<Json<ApplicantView>, ApiError> {
    update(app_state.store.as_ref(), &caller, applicant_id, request)
        .await
        .map(Json)
}

pub async fn delete_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
) -> Result<StatusCode, ApiError> {
    delete(app_state.store.as_ref(), &caller, applicant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
    ApiQuery(params): ApiQuery<VerifyParams>,
) -> Result<Json<ApplicantView>, ApiError> {
    verify(
        app_state.store.as_ref(),
        &caller,
        applicant_id,
        params.use_maker_checker,
    )
    .await
    .map(Json)
}

pub async fn confirm_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(log_id): ApiPath<i32>,
    ApiQuery(params): ApiQuery<maker_checker::ConfirmParams>,
) -> Result<Json<LogView>, ApiError> {
    maker_checker::confirm(
        app_state.store.as_ref(),
        &caller,
        log_id,
        params.approve,
        Some(EntityType::Applicant),
        app_state.confirm_policy,
    )
    .await
    .map(Json)
}

pub async fn search_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(search): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicantView>>, ApiError> {
    let filter = ApplicantFilter {
        name: non_blank(search.name),
        id_number: non_blank(search.id_number),
        date_applied: search.date_applied,
        ..ApplicantFilter::default()
    };
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector],
        &filter,
        &page.to_request()?,
    )
    .await
    .map(Json)
}

pub async fn filter_status_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<StatusParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicantView>>, ApiError> {
    let filter = ApplicantFilter {
        status: parse_verification_status(params.status)?,
        ..ApplicantFilter::default()
    };
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector, Role::Verifier],
        &filter,
        &page.to_request()?,
    )
    .await
    .map(Json)
}

pub async fn filter_village_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<VillageParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicantView>>, ApiError> {
    let filter = ApplicantFilter {
        village_id: params.village_id,
        ..ApplicantFilter::default()
    };
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector],
        &filter,
        &page.to_request()?,
    )
    .await
    .map(Json)
}
