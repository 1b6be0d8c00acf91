//! Route-level authorization gate.
//!
//! Applied as a `route_layer` so the check completes before any handler body runs.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use keygate_auth::{AuthzError, IdentityContext, Role, RoleRequirement, authorize};

use crate::app::errors;

/// Roles a group of routes requires; any one of them suffices.
#[derive(Debug, Clone)]
pub struct RequiredRoles {
    roles: Arc<[Role]>,
}

impl RequiredRoles {
    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    /// Any authenticated identity.
    pub fn authenticated() -> Self {
        Self::any_of([])
    }
}

impl RoleRequirement for RequiredRoles {
    fn required_roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Check the identity attached by the auth middleware against `requirement`.
pub fn check<R: RoleRequirement>(identity: Option<&IdentityContext>, requirement: &R) -> Result<(), Response> {
    authorize(identity, requirement.required_roles()).map_err(|e| match e {
        AuthzError::Unauthenticated => errors::unauthenticated(),
        AuthzError::Forbidden => errors::forbidden(),
    })
}

pub async fn require_roles(State(required): State<RequiredRoles>, req: Request, next: Next) -> Response {
    if let Err(denied) = check(req.extensions().get::<IdentityContext>(), &required) {
        return denied;
    }
    next.run(req).await
}
