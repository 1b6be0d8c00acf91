//! `keygate-audit` — append-only audit trail and per-request access log.
//!
//! Recording is best-effort: a failed write never reaches the caller of the business
//! operation. Failures are logged on target `keygate::audit` and counted.

pub mod access_log;
pub mod entry;
pub mod recorder;
pub mod sink;

pub use access_log::{AccessLogPolicy, DEFAULT_SKIP_PREFIXES, REQUEST_ENTITY_TYPE};
pub use entry::{AuditAction, AuditEntry, AuditFilter, AuditPage, NewAuditEntry, Pagination, RequestMeta};
pub use recorder::AuditRecorder;
pub use sink::{AuditSink, AuditSinkError};
