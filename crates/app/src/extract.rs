//! Request extractors whose rejections are served as problem responses.

use axum::extract::{
    rejection::{JsonRejection, PathRejection, QueryRejection},
    FromRequest, FromRequestParts,
};
use tracing::debug;

use crate::error::ServiceError;
use crate::problem::ProblemResponse;

/// JSON body. A malformed payload is a `bad_request` problem.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ProblemResponse))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ProblemResponse))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ProblemResponse))]
pub struct ApiPath<T>(pub T);

fn malformed(source: &'static str, detail: String) -> ProblemResponse {
    debug!(stage = "api", source, %detail, "rejected malformed request");
    ServiceError::BadRequest(detail).into()
}

impl From<JsonRejection> for ProblemResponse {
    fn from(rejection: JsonRejection) -> Self {
        malformed("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ProblemResponse {
    fn from(rejection: QueryRejection) -> Self {
        malformed("query", rejection.body_text())
    }
}

impl From<PathRejection> for ProblemResponse {
    fn from(rejection: PathRejection) -> Self {
        malformed("path", rejection.body_text())
    }
}
