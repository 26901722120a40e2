//! Shared types and helpers for the route modules.

pub use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
pub use axum_extra::extract::cookie::CookieJar;
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;

pub use crate::adapters::http::app_state::AppState;
pub use crate::app_error::{AppError, AppResult};
pub use crate::application::jwt;

pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Resolves the caller from `Authorization: Bearer` or, failing that, the
/// `access_token` cookie.
pub(crate) fn current_user(
    headers: &HeaderMap,
    jar: &CookieJar,
    app_state: &AppState,
) -> AppResult<Uuid> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let token = match bearer {
        Some(token) => token.to_string(),
        None => jar
            .get("access_token")
            .map(|c| c.value().to_string())
            .ok_or(AppError::InvalidCredentials)?,
    };

    jwt::verify(&token, &app_state.config.jwt_secret)?.user_id()
}

/// Optional client supplied `Idempotency-Key` header
pub(crate) fn idempotency_key(headers: &HeaderMap) -> AppResult<Option<String>> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim().to_string()))
            .map_err(|_| AppError::InvalidInput("invalid idempotency key".into())),
    }
}

#[derive(Deserialize)]
pub(crate) struct LimitQuery {
    pub limit: Option<i64>,
}
