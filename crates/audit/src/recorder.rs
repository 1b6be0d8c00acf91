//! Fire-and-forget audit recording.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{AuditSink, AuditSinkError, NewAuditEntry};

/// Hands entries to an [`AuditSink`] on a detached task.
///
/// Callers never observe a recording failure. Each failure is logged at `warn` on
/// target `keygate::audit` and increments [`AuditRecorder::failure_count`].
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    failures: Arc<AtomicU64>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sink(&self) -> Arc<dyn AuditSink> {
        self.sink.clone()
    }

    /// Number of entries that could not be recorded since startup.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Spawn the write and return immediately. The handle is only useful to tests;
    /// the write is never cancelled.
    pub fn record(&self, entry: NewAuditEntry) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.record_now(entry).await;
        })
    }

    /// Write on the current task. Still never fails outward.
    pub async fn record_now(&self, entry: NewAuditEntry) {
        let entity_type = entry.entity_type.clone();
        let entity_id = entry.entity_id.clone();
        let action = entry.action.clone();

        if let Err(err) = self.sink.append(entry.into_entry(Utc::now())).await {
            self.note_failure(&err, &entity_type, &entity_id, &action);
        }
    }

    /// Serialize the snapshots onto `entry` and record it.
    ///
    /// Must be called after the mutation has committed; `after` is the committed state.
    pub fn record_mutation<T: Serialize>(
        &self,
        entry: NewAuditEntry,
        before: Option<&T>,
        after: Option<&T>,
    ) -> Option<JoinHandle<()>> {
        match snapshot(before).and_then(|b| snapshot(after).map(|a| (b, a))) {
            Ok((before, after)) => Some(self.record(entry.with_snapshots(before, after))),
            Err(err) => {
                self.note_failure(&err, &entry.entity_type, &entry.entity_id, &entry.action);
                None
            }
        }
    }

    fn note_failure(&self, err: &AuditSinkError, entity_type: &str, entity_id: &str, action: &str) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            target: "keygate::audit",
            error = %err,
            entity_type,
            entity_id,
            action,
            failures = total,
            "audit entry dropped"
        );
    }
}

fn snapshot<T: Serialize>(value: Option<&T>) -> Result<Option<serde_json::Value>, AuditSinkError> {
    value
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AuditSinkError::Serialization(e.to_string()))
}
