use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use keygate_audit::{AuditEntry, AuditFilter, AuditPage, AuditSink, AuditSinkError, Pagination};

use super::InMemoryDirectory;

/// Append-only audit log held in process memory.
///
/// When linked to a directory, actors whose identity has been deleted read back as
/// `None`, the same as the Postgres `ON DELETE SET NULL` column.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    directory: Option<Arc<InMemoryDirectory>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked_to(directory: Arc<InMemoryDirectory>) -> Self {
        Self {
            entries: RwLock::default(),
            directory: Some(directory),
        }
    }

    fn visible(&self, mut entry: AuditEntry) -> Result<AuditEntry, AuditSinkError> {
        if let (Some(directory), Some(actor)) = (&self.directory, entry.actor_id) {
            let exists = directory
                .holds_identity(actor)
                .map_err(|e| AuditSinkError::Unavailable(e.to_string()))?;
            if !exists {
                entry.actor_id = None;
            }
        }
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AuditSinkError {
    AuditSinkError::Unavailable("in-memory audit lock poisoned".to_string())
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError> {
        let entry = self.visible(entry)?;
        self.entries.write().map_err(poisoned)?.push(entry);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter, pagination: Pagination) -> Result<AuditPage, AuditSinkError> {
        let snapshot: Vec<AuditEntry> = self.entries.read().map_err(poisoned)?.clone();

        let mut matching = Vec::new();
        for entry in snapshot {
            let entry = self.visible(entry)?;
            if filter.matches(&entry) {
                matching.push(entry);
            }
        }

        // Newest first; insertion order breaks timestamp ties.
        matching.reverse();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let total = matching.len() as u64;
        let page: Vec<AuditEntry> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(AuditPage {
            has_more: total > u64::from(pagination.offset) + u64::from(pagination.limit),
            entries: page,
            total,
            pagination,
        })
    }
}
