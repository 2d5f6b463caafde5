use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use greencity_core::token::{TokenStore, ACCESS_TOKEN_KEY};
use greencity_storage::Database;

use crate::auth::Claims;
use crate::router::{app_router, AppState};
use crate::telemetry;

pub const TEST_JWT_SECRET: &[u8] = b"greencity-test-secret";

pub const AUTHOR: i64 = 1;
pub const READER: i64 = 2;
pub const ADMIN: i64 = 3;
pub const MODERATOR: i64 = 4;

pub fn mint_token(secret: &[u8], sub: &str, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now().timestamp() + ttl_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .expect("encode token")
}

pub fn bearer(user_id: i64) -> String {
    format!(
        "Bearer {}",
        mint_token(TEST_JWT_SECRET, &user_id.to_string(), 3600)
    )
}

pub async fn setup_state() -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let database = Database::connect("sqlite::memory:")
        .await
        .expect("connect");
    database.run_migrations().await.expect("migrations");

    for sql in [
        "INSERT INTO users (id, email, name, role) VALUES \
         (1, 'author@example.com', 'Author', 'ROLE_USER'), \
         (2, 'reader@example.com', 'Reader', 'ROLE_USER'), \
         (3, 'admin@example.com', 'Admin', 'ROLE_ADMIN'), \
         (4, 'moderator@example.com', 'Moderator', 'ROLE_MODERATOR')",
        "INSERT INTO eco_news (id, title, author_id, creation_date) VALUES \
         (1, 'First news', 1, '2024-01-01T00:00:00.000Z'), \
         (2, 'Second news', 1, '2024-01-02T00:00:00.000Z')",
    ] {
        sqlx::query(sql)
            .execute(database.pool())
            .await
            .expect("seed");
    }

    AppState::new(metrics, database, TokenStore::new(), TEST_JWT_SECRET)
}

/// State whose management token belongs to `user_id`.
pub async fn setup_management_state(user_id: i64) -> AppState {
    let state = setup_state().await;
    state.tokens().put(
        ACCESS_TOKEN_KEY,
        mint_token(TEST_JWT_SECRET, &user_id.to_string(), 3600),
    );
    state
}

pub fn json_request(method: &str, uri: &str, body: &Value, user_id: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = user_id {
        builder = builder.header(header::AUTHORIZATION, bearer(id));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn empty_request(method: &str, uri: &str, user_id: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user_id {
        builder = builder.header(header::AUTHORIZATION, bearer(id));
    }
    builder.body(Body::empty()).expect("request")
}

/// Sends `request` through the full router and decodes the JSON body (`Null` when empty).
pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    send_to(app_router(state.clone()), request).await
}

pub async fn send_to(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
