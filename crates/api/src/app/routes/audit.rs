use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};

use crate::app::{dto::AuditQuery, errors, services::AppServices};

/// GET /admin/audit
pub async fn query_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    let (filter, pagination) = query.into_parts();
    match services.audit.sink().query(filter, pagination).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::domain_error_to_response(e.into()),
    }
}
