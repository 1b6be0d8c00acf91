//! Storage seam for audit entries.

use async_trait::async_trait;
use thiserror::Error;

use keygate_core::DomainError;

use crate::{AuditEntry, AuditFilter, AuditPage, Pagination};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditSinkError {
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to serialize audit snapshot: {0}")]
    Serialization(String),
}

impl From<AuditSinkError> for DomainError {
    fn from(value: AuditSinkError) -> Self {
        DomainError::Unavailable(value.to_string())
    }
}

/// Append-only audit storage.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError>;

    /// Newest first.
    async fn query(&self, filter: AuditFilter, pagination: Pagination) -> Result<AuditPage, AuditSinkError>;
}
