//! Identity administration under `/admin/users`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use keygate_audit::AuditAction;
use keygate_auth::{Change, CreateIdentity, IdentityContext, IdentityUpdate, PublicIdentity};
use keygate_core::{DomainResult, IdentityId, RoleId};

use crate::app::{
    dto::{AssignRoleRequest, ChangePasswordRequest, CreateUserRequest, UpdateUserRequest},
    errors,
    services::AppServices,
};
use crate::context::ClientMeta;

const ENTITY: &str = "Identity";
const MEMBERSHIP_ENTITY: &str = "Membership";

/// Map a mutation result to a response, recording the audit entry on success only.
fn respond(
    services: &AppServices,
    actor: &IdentityContext,
    meta: ClientMeta,
    id: IdentityId,
    action: AuditAction,
    result: DomainResult<Change<PublicIdentity>>,
) -> axum::response::Response {
    match result {
        Ok(change) => {
            services.audit_change(actor, meta, ENTITY, id, action, &change);
            match change.after {
                Some(after) => Json(after).into_response(),
                None => StatusCode::NO_CONTENT.into_response(),
            }
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// GET /admin/users
pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.directory.list_identities().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// GET /admin/users/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.directory.get_identity(id).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /admin/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Json(body): Json<CreateUserRequest>,
) -> axum::response::Response {
    let cmd = CreateIdentity {
        email: body.email,
        full_name: body.full_name,
        password: body.password,
        is_active: body.is_active.unwrap_or(true),
        roles: body.role_ids,
    };

    let change = match services.directory.create_identity(cmd, Utc::now()).await {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let Some(created) = change.after.clone() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    services.audit_change(&actor, meta, ENTITY, created.id, AuditAction::Create, &change);
    (StatusCode::CREATED, Json(created)).into_response()
}

/// PUT /admin/users/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let update = IdentityUpdate {
        email: body.email,
        full_name: body.full_name,
    };
    let result = services.directory.update_identity(id, update, Utc::now()).await;
    respond(&services, &actor, meta, id, AuditAction::Update, result)
}

/// PUT /admin/users/:id/password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
    Json(body): Json<ChangePasswordRequest>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.directory.change_password(id, body.password, Utc::now()).await;
    respond(&services, &actor, meta, id, AuditAction::ChangePassword, result)
}

/// POST /admin/users/:id/activate
pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.directory.set_active(id, true, Utc::now()).await;
    respond(&services, &actor, meta, id, AuditAction::Activate, result)
}

/// POST /admin/users/:id/deactivate
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.directory.set_active(id, false, Utc::now()).await;
    respond(&services, &actor, meta, id, AuditAction::Deactivate, result)
}

/// DELETE /admin/users/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.directory.delete_identity(id).await;
    respond(&services, &actor, meta, id, AuditAction::Delete, result)
}

/// POST /admin/users/:id/roles
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> axum::response::Response {
    let id: IdentityId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.directory.assign_role(id, body.role_id, Utc::now()).await {
        Ok(change) => {
            let entity_id = format!("{id}:{}", body.role_id);
            services.audit_change(&actor, meta, MEMBERSHIP_ENTITY, entity_id, AuditAction::AssignRole, &change);
            (StatusCode::CREATED, Json(change.after)).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// DELETE /admin/users/:id/roles/:role_id
pub async fn remove_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path((id, role_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (id, role_id): (IdentityId, RoleId) = match (errors::parse_id(&id), errors::parse_id(&role_id)) {
        (Ok(id), Ok(role_id)) => (id, role_id),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match services.directory.remove_role(id, role_id).await {
        Ok(change) => {
            let entity_id = format!("{id}:{role_id}");
            services.audit_change(&actor, meta, MEMBERSHIP_ENTITY, entity_id, AuditAction::RemoveRole, &change);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
