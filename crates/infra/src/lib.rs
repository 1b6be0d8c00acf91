//! Infrastructure layer: store adapters (in-memory and Postgres) and bootstrap seeding.

pub mod memory;
pub mod postgres;
pub mod seed;

pub use memory::{InMemoryAuditLog, InMemoryDirectory, InMemoryRefreshTokens};
pub use postgres::{PgAuditLog, PgDirectory, PgRefreshTokens};
pub use seed::seed_admin;

/// Conflict messages shared by every adapter, phrased so a caller can correct the input.
pub mod conflicts {
    pub const EMAIL_TAKEN: &str = "an identity with this email already exists";
    pub const ROLE_NAME_TAKEN: &str = "a role with this name already exists";
    pub const MEMBERSHIP_EXISTS: &str = "identity already holds this role";
    pub const ROLE_IN_USE: &str = "role is still assigned to at least one identity";
}
