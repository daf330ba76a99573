use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        multipart::MultipartError,
        FromRequest, FromRequestParts, Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidFile(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Access denied")]
    Forbidden,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::InvalidState(_)
            | ApiError::Validation(_)
            | ApiError::InvalidArgument(_)
            | ApiError::InvalidFile(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "Not Found",
            ApiError::Duplicate(_) => "Conflict",
            ApiError::Validation(_) => "Validation Failed",
            ApiError::InvalidState(_) | ApiError::InvalidArgument(_) | ApiError::InvalidFile(_) => {
                "Bad Request"
            }
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::Internal(_) => "Internal Server Error",
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<assist_db::Error> for ApiError {
    fn from(err: assist_db::Error) -> Self {
        use assist_db::Error;
        match err {
            Error::NotFound(message) => ApiError::NotFound(message),
            Error::Duplicate(message) => ApiError::Duplicate(message),
            Error::InvalidState(message) => ApiError::InvalidState(message),
            err @ Error::InvalidSort(_) => ApiError::InvalidArgument(err.to_string()),
            err => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidArgument(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidArgument(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::InvalidFile(err.body_text())
    }
}

/// JSON error body. `path` is filled in by [`attach_path`] once the request URI is known.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    pub path: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            status: status.as_u16(),
            error: self.label(),
            message: self.to_string(),
            path: String::new(),
        };
        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// Rewrites error bodies so that they name the request path.
pub async fn attach_path(request: Request, next: Next) -> Response {
    let path = format!("uri={}", request.uri().path());
    let response = next.run(request).await;
    match response.extensions().get::<ErrorBody>().cloned() {
        Some(body) => {
            let status = response.status();
            (status, Json(ErrorBody { path, ..body })).into_response()
        }
        None => response,
    }
}

/// `axum::Json` with rejections rendered as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with rejections rendered as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` with rejections rendered as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_store_errors_to_http_statuses() {
        let cases = [
            (assist_db::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (assist_db::Error::Duplicate("x".into()), StatusCode::CONFLICT),
            (assist_db::Error::InvalidState("x".into()), StatusCode::BAD_REQUEST),
            (assist_db::Error::InvalidSort("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn validation_message_joins_field_messages() {
        let err = ApiError::Validation(vec![
            "First name is required".into(),
            "Age must be non-negative".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "First name is required; Age must be non-negative"
        );
        assert_eq!(err.label(), "Validation Failed");
    }

    #[test]
    fn error_response_carries_body_extension() {
        let response = ApiError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response.extensions().get::<ErrorBody>().unwrap();
        assert_eq!(body.status, 403);
        assert_eq!(body.message, "Access denied");
    }
}
