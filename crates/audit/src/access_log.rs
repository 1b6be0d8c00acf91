//! Coarse per-request access log.

use keygate_core::IdentityId;

use crate::{NewAuditEntry, RequestMeta};

/// Paths that are never written to the access log.
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &[
    "/health",
    "/docs",
    "/swagger",
    "/openapi",
    "/auth/login",
    "/auth/refresh",
];

pub const REQUEST_ENTITY_TYPE: &str = "request";

#[derive(Debug, Clone)]
pub struct AccessLogPolicy {
    skip_prefixes: Vec<String>,
}

impl Default for AccessLogPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_PREFIXES.iter().copied())
    }
}

impl AccessLogPolicy {
    pub fn new<I, S>(skip_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skip_prefixes: skip_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Cheap prefix test; run before doing any recording work.
    pub fn should_record(&self, path: &str) -> bool {
        !self.skip_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Entry keyed by method and path, with the response status as the after-state.
    pub fn request_entry(
        &self,
        actor_id: Option<IdentityId>,
        method: &str,
        path: &str,
        status: u16,
        meta: RequestMeta,
    ) -> NewAuditEntry {
        NewAuditEntry::new(actor_id, REQUEST_ENTITY_TYPE, path, method)
            .with_snapshots(None, Some(serde_json::json!({ "status": status })))
            .with_meta(meta)
    }
}
