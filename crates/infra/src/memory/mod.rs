//! In-memory adapters. Intended for tests and single-process development.

mod audit;
mod directory;
mod refresh;

pub use audit::InMemoryAuditLog;
pub use directory::InMemoryDirectory;
pub use refresh::InMemoryRefreshTokens;

use keygate_auth::StoreError;

pub(crate) fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}
