//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store adapters, session/directory services, audit recorder
//! - `routes/`: HTTP handlers, one file per area
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent `{"error", "message"}` responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use keygate_auth::Role;

use crate::authz::{self, RequiredRoles};
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the black-box tests).
///
/// Layering, outermost first: access log, then (per route group) token validation,
/// then the role gate, then the handler.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        validator: services.sessions.validator(),
    };

    let admin = routes::admin_router().route_layer(axum::middleware::from_fn_with_state(
        RequiredRoles::any_of([Role::ADMIN]),
        authz::require_roles,
    ));

    let protected = routes::authenticated_router()
        .route_layer(axum::middleware::from_fn_with_state(
            RequiredRoles::authenticated(),
            authz::require_roles,
        ))
        .nest("/admin", admin)
        .route_layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    services.clone(),
                    middleware::access_log_middleware,
                ))
                .layer(Extension(services)),
        )
}
