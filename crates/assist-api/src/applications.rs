use crate::{
    applicants::ApplicantRequest,
    caller::Caller,
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    maker_checker,
    views::{ApplicantView, ApplicationView, LogView, PageParams},
    AppState,
};
use assist_db::{
    models::NewApplication,
    paging::{Page, PageRequest},
    query::{ApplicationFilter, ProgrammeStats},
    status::{ApplicationStatus, EntityType, Role},
    Store,
};
use axum::{extract::State, http::StatusCode, Json};

#[derive(Clone, Copy, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub applicant_id: Option<i32>,
    pub programme_id: Option<i32>,
}

impl ApplicationRequest {
    fn validate(self) -> Result<(i32, i32), ApiError> {
        let mut messages = Vec::new();
        if self.applicant_id.is_none() {
            messages.push("Applicant ID is required".to_owned());
        }
        if self.programme_id.is_none() {
            messages.push("Programme ID is required".to_owned());
        }
        match (self.applicant_id, self.programme_id) {
            (Some(applicant_id), Some(programme_id)) => Ok((applicant_id, programme_id)),
            _ => Err(ApiError::Validation(messages)),
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub applicant_id: Option<i32>,
    pub programme_id: Option<i32>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct Enrolment {
    pub applicant: ApplicantView,
    pub application: ApplicationView,
}

pub fn today() -> jiff::civil::Date {
    jiff::Zoned::now().date()
}

pub fn parse_application_status(
    status: Option<String>,
) -> Result<Option<ApplicationStatus>, ApiError> {
    match status.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if text.eq_ignore_ascii_case("all") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|err: assist_db::status::UnknownName| ApiError::InvalidArgument(err.to_string())),
    }
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn create(
    store: &dyn Store,
    caller: &Caller,
    request: ApplicationRequest,
) -> Result<ApplicationView, ApiError> {
    caller.require(&[Role::DataCollector])?;
    let (applicant_id, programme_id) = request.validate()?;
    let application = store
        .create_application(NewApplication {
            applicant_id,
            programme_id,
            application_date: today(),
        })
        .await?;
    tracing::info!(application_id = application.id, "application submitted");
    Ok(application.into())
}

pub async fn get(store: &dyn Store, application_id: i32) -> Result<ApplicationView, ApiError> {
    store
        .load_application(application_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| {
            ApiError::NotFound(format!("Application not found with ID: {application_id}"))
        })
}

pub async fn list(
    store: &dyn Store,
    caller: &Caller,
    allowed: &[Role],
    filter: &ApplicationFilter,
    page: &PageRequest,
) -> Result<Page<ApplicationView>, ApiError> {
    caller.require(allowed)?;
    Ok(store.list_applications(filter, page).await?.map(Into::into))
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn update(
    store: &dyn Store,
    caller: &Caller,
    application_id: i32,
    request: ApplicationRequest,
) -> Result<ApplicationView, ApiError> {
    caller.require(&[Role::Admin, Role::DataCollector])?;
    let (applicant_id, programme_id) = request.validate()?;
    let application = store
        .update_application(application_id, applicant_id, programme_id)
        .await?;
    Ok(application.into())
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn delete(
    store: &dyn Store,
    caller: &Caller,
    application_id: i32,
) -> Result<(), ApiError> {
    caller.require(&[Role::Admin])?;
    store.delete_application(application_id).await?;
    tracing::info!("application deleted");
    Ok(())
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn approve(
    store: &dyn Store,
    caller: &Caller,
    application_id: i32,
    use_maker_checker: bool,
) -> Result<ApplicationView, ApiError> {
    caller.require(&[Role::Approver])?;
    let acted = store
        .approve_application(application_id, caller.id, use_maker_checker)
        .await?;
    match &acted.log {
        Some(log) => tracing::info!(log_id = log.id, "approval proposed"),
        None => tracing::info!("application approved"),
    }
    Ok(acted.entity.into())
}

pub async fn report(store: &dyn Store, caller: &Caller) -> Result<Vec<ProgrammeStats>, ApiError> {
    caller.require(&[Role::Admin])?;
    Ok(store.application_stats().await?)
}

/// Registers an applicant and applies for `programmeId` in one step.
#[tracing::instrument(skip(store, request), fields(caller = %caller.username))]
pub async fn enrol(
    store: &dyn Store,
    caller: &Caller,
    request: ApplicantRequest,
) -> Result<Enrolment, ApiError> {
    caller.require(&[Role::DataCollector])?;
    let programme_id = request.programme_id;
    let applicant = match request.validate() {
        Err(ApiError::Validation(mut messages)) if programme_id.is_none() => {
            messages.push("Programme ID is required".into());
            return Err(ApiError::Validation(messages));
        }
        validated => validated?,
    };
    let programme_id = programme_id
        .ok_or_else(|| ApiError::Validation(vec!["Programme ID is required".into()]))?;
    let (applicant, application) = store
        .enrol_applicant(applicant, programme_id, today())
        .await?;
    tracing::info!(
        applicant_id = applicant.id,
        application_id = application.id,
        "applicant enrolled"
    );
    Ok(Enrolment {
        applicant: applicant.into(),
        application: application.into(),
    })
}

pub async fn create_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ApplicationRequest>,
) -> Result<Json<ApplicationView>, ApiError> {
    create(app_state.store.as_ref(), &caller, request).await.map(Json)
}

pub async fn get_handler(
    State(app_state): State<AppState>,
    _caller: Caller,
    ApiPath(application_id): ApiPath<i32>,
) -> Result<Json<ApplicationView>, ApiError> {
    get(app_state.store.as_ref(), application_id).await.map(Json)
}

pub async fn list_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicationView>>, ApiError> {
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector],
        &ApplicationFilter::default(),
        &page.to_request()?,
    )
    .await
    .map(Json)
}

pub async fn update_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(application_id): ApiPath<i32>,
    ApiJson(request): ApiJson<ApplicationRequest>,
) -> Result<Json<ApplicationView>, ApiError> {
    update(app_state.store.as_ref(), &caller, application_id, request)
        .await
        .map(Json)
}

pub async fn delete_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(application_id): ApiPath<i32>,
) -> Result<StatusCode, ApiError> {
    delete(app_state.store.as_ref(), &caller, application_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(application_id): ApiPath<i32>,
    ApiQuery(params): ApiQuery<crate::applicants::VerifyParams>,
) -> Result<Json<ApplicationView>, ApiError> {
    approve(
        app_state.store.as_ref(),
        &caller,
        application_id,
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
    caller.require(&[Role::Approver])?;
    maker_checker::confirm(
        app_state.store.as_ref(),
        &caller,
        log_id,
        params.approve,
        Some(EntityType::Application),
        app_state.confirm_policy,
    )
    .await
    .map(Json)
}

pub async fn filter_status_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<FilterParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicationView>>, ApiError> {
    let filter = ApplicationFilter {
        status: parse_application_status(params.status)?,
        ..ApplicationFilter::default()
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

pub async fn filter_applicant_status_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<FilterParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicationView>>, ApiError> {
    let filter = ApplicationFilter {
        applicant_id: params.applicant_id,
        status: parse_application_status(params.status)?,
        ..ApplicationFilter::default()
    };
    list(
        app_state.store.as_ref(),
        &caller,
        &[Role::Admin, Role::DataCollector, Role::Approver],
        &filter,
        &page.to_request()?,
    )
    .await
    .map(Json)
}

pub async fn filter_programme_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<FilterParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ApplicationView>>, ApiError> {
    let filter = ApplicationFilter {
        programme_id: params.programme_id,
        ..ApplicationFilter::default()
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

pub async fn report_handler(
    State(app_state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ProgrammeStats>>, ApiError> {
    report(app_state.store.as_ref(), &caller).await.map(Json)
}

pub async fn enrol_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ApplicantRequest>,
) -> Result<Json<Enrolment>, ApiError> {
    enrol(app_state.store.as_ref(), &caller, request)
        .await
        .map(Json)
}
