//! Audit entry model and query parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keygate_core::IdentityId;

/// Actions recorded by the built-in handlers. Per-request entries use the HTTP method
/// as their action instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    ChangePassword,
    Activate,
    Deactivate,
    AssignRole,
    RemoveRole,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "Create",
            AuditAction::Update => "Update",
            AuditAction::Delete => "Delete",
            AuditAction::ChangePassword => "ChangePassword",
            AuditAction::Activate => "Activate",
            AuditAction::Deactivate => "Deactivate",
            AuditAction::AssignRole => "AssignRole",
            AuditAction::RemoveRole => "RemoveRole",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

/// Source of the request that triggered a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Everything the recorder needs to append one entry; id and timestamp are assigned on write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor_id: Option<IdentityId>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub meta: RequestMeta,
}

impl NewAuditEntry {
    pub fn new(
        actor_id: Option<IdentityId>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        action: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            action: action.into(),
            before: None,
            after: None,
            meta: RequestMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_snapshots(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn into_entry(self, occurred_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: Uuid::now_v7(),
            actor_id: self.actor_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            before: self.before,
            after: self.after,
            occurred_at,
            ip_address: self.meta.ip_address,
            user_agent: self.meta.user_agent,
        }
    }
}

/// Immutable persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<IdentityId>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// All fields are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<IdentityId>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity_type.as_deref().is_none_or(|t| t == entry.entity_type)
            && self.entity_id.as_deref().is_none_or(|id| id == entry.entity_id)
            && self.actor_id.is_none_or(|a| entry.actor_id == Some(a))
            && self.since.is_none_or(|s| entry.occurred_at >= s)
            && self.until.is_none_or(|u| entry.occurred_at < u)
    }
}

/// One page of entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}
