use axum::{
    Router,
    routing::{delete, get, post},
};

pub mod audit;
pub mod auth;
pub mod roles;
pub mod system;
pub mod users;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
}

/// Endpoints for any authenticated identity.
pub fn authenticated_router() -> Router {
    Router::new().route("/auth/me", get(auth::me))
}

/// Endpoints nested under `/admin`.
pub fn admin_router() -> Router {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/users/:id/password", axum::routing::put(users::change_password))
        .route("/users/:id/activate", post(users::activate_user))
        .route("/users/:id/deactivate", post(users::deactivate_user))
        .route("/users/:id/roles", post(users::assign_role))
        .route("/users/:id/roles/:role_id", delete(users::remove_role))
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route("/roles/:id", delete(roles::delete_role))
        .route("/audit", get(audit::query_audit))
}
