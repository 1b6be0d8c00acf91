use chrono::{DateTime, Utc};
use serde::Deserialize;

use keygate_audit::{AuditFilter, Pagination};
use keygate_core::{IdentityId, RoleId};

// -------------------------
// Auth
// -------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// -------------------------
// Users
// -------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

// -------------------------
// Roles
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
}

// -------------------------
// Audit
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<IdentityId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    pub fn into_parts(self) -> (AuditFilter, Pagination) {
        (
            AuditFilter {
                entity_type: self.entity_type,
                entity_id: self.entity_id,
                actor_id: self.actor_id,
                since: self.since,
                until: self.until,
            },
            Pagination::new(self.limit, self.offset),
        )
    }
}
