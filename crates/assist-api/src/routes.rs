use super::{
    applicants, applications, error, export, login, maker_checker, reference, uploads, users,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use error::ApiError;
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub(super) fn setup(app_state: super::AppState) -> axum::routing::Router {
    let max_bytes = app_state.uploads.max_bytes;
    axum::Router::new()
        .route("/", get(hello))
        .route("/error", get(error_page))
        .route("/api/auth/login", post(login::login::post))
        .route("/api/auth/register", post(login::register::post))
        .route(
            "/api/users",
            get(users::list_handler).post(users::register_handler),
        )
        .route(
            "/api/users/change-password",
            put(users::change_password_handler),
        )
        .route(
            "/api/applicants",
            get(applicants::list_handler).post(applicants::create_handler),
        )
        .route("/api/applicants/search", get(applicants::search_handler))
        .route(
            "/api/applicants/filter/status",
            get(applicants::filter_status_handler),
        )
        .route(
            "/api/applicants/filter/village",
            get(applicants::filter_village_handler),
        )
        .route(
            "/api/applicants/{id}",
            get(applicants::get_handler)
                .put(applicants::update_handler)
                .delete(applicants::delete_handler),
        )
        .route(
            "/api/applicants/{id}/verify",
            patch(applicants::verify_handler),
        )
        .route(
            "/api/applicants/maker-checker/{log_id}",
            patch(applicants::confirm_handler),
        )
        .route(
            "/api/applications",
            get(applications::list_handler).post(applications::create_handler),
        )
        .route(
            "/api/applications/filter/status",
            get(applications::filter_status_handler),
        )
        .route(
            "/api/applications/filter/applicant-status",
            get(applications::filter_applicant_status_handler),
        )
        .route(
            "/api/applications/filter/programme",
            get(applications::filter_programme_handler),
        )
        .route("/api/applications/report", get(applications::report_handler))
        .route("/api/applications/export", get(export::export_handler))
        .route(
            "/api/applications/{id}",
            get(applications::get_handler)
                .put(applications::update_handler)
                .delete(applications::delete_handler),
        )
        .route(
            "/api/applications/{id}/approve",
            patch(applications::approve_handler),
        )
        .route(
            "/api/applications/maker-checker/{log_id}",
            patch(applications::confirm_handler),
        )
        .route(
            "/api/maker-checker/applicants/{id}/verify",
            post(maker_checker::propose_verification_handler),
        )
        .route(
            "/api/maker-checker/applications/{id}/approve",
            post(maker_checker::propose_approval_handler),
        )
        .route(
            "/api/maker-checker/applications",
            post(applications::enrol_handler),
        )
        .route(
            "/api/maker-checker/logs/{log_id}/confirm",
            post(maker_checker::confirm_handler),
        )
        .route(
            "/api/maker-checker/logs/pending",
            get(maker_checker::pending_handler),
        )
        .route(
            "/api/maker-checker/users/{id}/password",
            put(users::reset_password_handler),
        )
        .route("/api/parameters", get(reference::parameters_handler))
        .route("/api/villages", get(reference::villages_handler))
        .route(
            "/api/programmes",
            get(reference::programmes_handler).post(reference::create_programme_handler),
        )
        .route(
            "/api/uploads/templates/{kind}",
            get(uploads::template_handler),
        )
        .route(
            "/api/uploads/applicants/{id}/image",
            post(uploads::image_handler),
        )
        .route("/api/uploads/{kind}", post(uploads::upload_handler))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(CatchPanicLayer::custom(panicked))
        .layer(middleware::from_fn(error::attach_path))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn hello() -> &'static str {
    "Social Assistance API, @2025"
}

pub async fn error_page() -> ApiError {
    ApiError::Internal("An unexpected error occurred".into())
}

pub async fn fallback(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(format!("No handler found for {}", uri.path()))
}

fn panicked(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_owned()))
        .unwrap_or_else(|| "handler panicked".to_owned());
    ApiError::Internal(message).into_response()
}
