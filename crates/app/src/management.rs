use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error};

use greencity_core::token::TokenError;

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Decorates management requests with the stored access token before routing.
///
/// Requests whose path does not mention `management` pass through untouched.
/// When the token has not been stored the request is refused with 503 instead
/// of being forwarded with an unusable header.
pub async fn inject_access_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let authorization = match state.tokens().management_authorization(&path) {
        Ok(Some(value)) => value,
        Ok(None) => return next.run(request).await,
        Err(TokenError::Unset(key)) => {
            counter!("management_token_injections_total", "result" => "unset").increment(1);
            error!(stage = "management", %path, key, "management token has not been stored");
            return ProblemResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "management_token_unset",
                "management access token is not configured",
            )
            .into_response();
        }
    };

    let Ok(value) = HeaderValue::from_str(&authorization) else {
        counter!("management_token_injections_total", "result" => "invalid").increment(1);
        error!(stage = "management", %path, "stored management token is not a valid header value");
        return ProblemResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "management_token_invalid",
            "management access token cannot be sent",
        )
        .into_response();
    };

    request.headers_mut().insert(header::AUTHORIZATION, value);
    counter!("management_token_injections_total", "result" => "injected").increment(1);
    debug!(stage = "management", %path, "injected management authorization");
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use greencity_core::token::ACCESS_TOKEN_KEY;

    use super::inject_access_token;
    use crate::router::AppState;
    use crate::test_support::setup_state;

    async fn echo_authorization(request: Request<Body>) -> String {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("<none>")
            .to_string()
    }

    fn echo_router(state: AppState) -> Router {
        Router::new()
            .route("/management/echo", get(echo_authorization))
            .route("/public/echo", get(echo_authorization))
            .layer(middleware::from_fn_with_state(state.clone(), inject_access_token))
            .with_state(state)
    }

    async fn call(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        (status, String::from_utf8(bytes.to_vec()).expect("utf-8"))
    }

    #[tokio::test]
    async fn management_paths_receive_stored_token() {
        let state = setup_state().await;
        state.tokens().put(ACCESS_TOKEN_KEY, "abc");

        let (status, body) = call(echo_router(state), "/management/echo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Bearer abc");
    }

    #[tokio::test]
    async fn other_paths_are_left_alone() {
        let state = setup_state().await;
        state.tokens().put(ACCESS_TOKEN_KEY, "abc");

        let (status, body) = call(echo_router(state), "/public/echo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<none>");
    }

    #[tokio::test]
    async fn missing_token_is_refused() {
        let state = setup_state().await;

        let (status, body) = call(echo_router(state), "/management/echo").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("management_token_unset"));
    }
}
