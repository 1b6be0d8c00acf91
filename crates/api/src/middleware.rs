use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use keygate_auth::{AccessTokenValidator, IdentityContext};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::ClientMeta;

#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<dyn AccessTokenValidator>,
}

/// Validate the bearer token and attach the resulting [`IdentityContext`].
///
/// The context is also copied onto the response so outer layers (access log) can
/// attribute the request.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return errors::unauthenticated();
    };

    let identity = match state.validator.authenticate(token, Utc::now()) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(error = %e, "rejected access token");
            return errors::unauthenticated();
        }
    };

    req.extensions_mut().insert(identity.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(identity);
    response
}

/// Coarse per-request audit record keyed by method and path.
pub async fn access_log_middleware(
    State(services): State<Arc<AppServices>>,
    req: Request,
    next: Next,
) -> Response {
    if !services.access_log.should_record(req.uri().path()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let meta = ClientMeta::from_parts(req.headers(), req.extensions()).into_inner();

    let response = next.run(req).await;

    let actor = response
        .extensions()
        .get::<IdentityContext>()
        .map(IdentityContext::subject_id);
    let entry = services
        .access_log
        .request_entry(actor, &method, &path, response.status().as_u16(), meta);
    services.audit.record(entry);

    response
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
