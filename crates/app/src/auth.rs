use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use greencity_core::types::User;

use crate::error::ServiceError;
use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Verifies HS256 bearer tokens issued for GreenCity users.
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Returns the user id carried in `sub`.
    pub fn user_id(&self, token: &str) -> Result<i64, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidSubject(data.claims.sub))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject '{0}' is not a user id")]
    InvalidSubject(String),
    #[error("user {0} does not exist")]
    UnknownUser(i64),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("authorization header is not ascii".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AuthError::InvalidToken("expected a bearer token".into()))
}

async fn resolve_user(state: &AppState, token: &str) -> Result<User, ServiceError> {
    let user_id = state.jwt().user_id(token).map_err(|err| {
        warn!(stage = "auth", error = %err, "rejected bearer token");
        err
    })?;
    state
        .storage()
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AuthError::UnknownUser(user_id).into())
}

/// Authenticated caller. Rejects the request with 401 when no valid token is present.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .map_err(ServiceError::from)?
            .ok_or_else(|| ServiceError::from(AuthError::Missing))?;
        Ok(Self(resolve_user(state, token).await?))
    }
}

/// Caller identity for endpoints that also serve anonymous requests.
pub struct OptionalUser(pub Option<User>);

impl OptionalUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|user| user.id)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts).map_err(ServiceError::from)? {
            Some(token) => Ok(Self(Some(resolve_user(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}

/// Caller allowed to use `/management` endpoints: a moderator or an admin.
pub struct Moderator(User);

impl Moderator {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Moderator {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.can_moderate() {
            return Err(ServiceError::Forbidden(format!(
                "user {} may not use management endpoints",
                user.id
            ))
            .into());
        }
        Ok(Self(user))
    }
}
