use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use keygate_audit::AuditAction;
use keygate_auth::IdentityContext;
use keygate_core::RoleId;

use crate::app::{dto::CreateRoleRequest, errors, services::AppServices};
use crate::context::ClientMeta;

const ENTITY: &str = "Role";

/// GET /admin/roles
pub async fn list_roles(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.directory.list_roles().await {
        Ok(roles) => Json(roles).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /admin/roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Json(body): Json<CreateRoleRequest>,
) -> axum::response::Response {
    let change = match services.directory.create_role(&body.name, body.description, Utc::now()).await {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let Some(role) = change.after.clone() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    services.audit_change(&actor, meta, ENTITY, role.id, AuditAction::Create, &change);
    (StatusCode::CREATED, Json(role)).into_response()
}

/// DELETE /admin/roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<IdentityContext>,
    meta: ClientMeta,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.directory.delete_role(id).await {
        Ok(change) => {
            services.audit_change(&actor, meta, ENTITY, id, AuditAction::Delete, &change);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
