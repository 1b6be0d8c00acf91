//! Login, refresh and the caller's own identity.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    response::IntoResponse,
};
use chrono::Utc;

use keygate_auth::IdentityContext;

use crate::app::{dto::{LoginRequest, RefreshRequest}, errors, services::AppServices};

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services.sessions.login(body.email.trim(), &body.password, Utc::now()).await {
        Ok(pair) => Json(pair).into_response(),
        Err(e) => errors::login_error_to_response(e),
    }
}

/// POST /auth/refresh
///
/// Needs no access token: the refresh token is its own credential.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshRequest>,
) -> axum::response::Response {
    match services.sessions.refresh(&body.refresh_token, Utc::now()).await {
        Ok(pair) => Json(pair).into_response(),
        Err(e) => errors::refresh_error_to_response(e),
    }
}

/// GET /auth/me
pub async fn me(Extension(identity): Extension<IdentityContext>) -> Json<IdentityContext> {
    Json(identity)
}
