use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::Serialize;
use tracing::error;

use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// RFC 7807 error body served as `application/problem+json`.
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        counter!("api_errors_total", "kind" => kind).increment(1);
        match err {
            ServiceError::NotFound(detail) => Self::new(StatusCode::NOT_FOUND, kind, detail),
            ServiceError::Conflict(detail) => Self::new(StatusCode::CONFLICT, kind, detail),
            ServiceError::BadRequest(detail) | ServiceError::StatusUnchanged(detail) => {
                Self::new(StatusCode::BAD_REQUEST, kind, detail)
            }
            ServiceError::Unauthorized(detail) => Self::new(StatusCode::UNAUTHORIZED, kind, detail),
            ServiceError::Forbidden(detail) => Self::new(StatusCode::FORBIDDEN, kind, detail),
            ServiceError::Storage(detail) => {
                error!(stage = "api", error = %detail, "storage failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    kind,
                    "an internal error occurred",
                )
            }
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
