//! Persistence seams consumed by the session and directory services.
//!
//! Uniqueness (email, role name, membership pair) and referential rules are the
//! store's responsibility; violations come back as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use keygate_core::{DomainError, IdentityId, RoleId};

use crate::{
    Identity, IdentityUpdate, Membership, NewIdentity, NewRole, Role, RoleRecord,
    StoredRefreshToken,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(what) => DomainError::NotFound(what),
            StoreError::Unavailable(msg) => DomainError::Unavailable(msg),
        }
    }
}

/// Read-only lookups used by login and refresh.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact (case-sensitive) email match among active identities only.
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;

    /// Names of the roles currently held, ordered by name.
    async fn roles_for(&self, id: IdentityId) -> Result<Vec<Role>, StoreError>;
}

/// Identity, role and membership administration.
#[async_trait]
pub trait DirectoryStore: CredentialStore {
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError>;

    /// Exact email match regardless of the active flag.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Inserts the identity together with its initial memberships; either all of them
    /// are written or none are. `roles` must not contain duplicates, and an unknown role
    /// fails with `NotFound`.
    async fn create_identity(
        &self,
        new: NewIdentity,
        roles: &[RoleId],
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError>;

    async fn update_identity(
        &self,
        id: IdentityId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError>;

    async fn set_password_hash(
        &self,
        id: IdentityId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError>;

    async fn set_active(&self, id: IdentityId, active: bool, now: DateTime<Utc>) -> Result<Identity, StoreError>;

    /// Removes the identity and cascades its memberships. Returns the removed row.
    async fn delete_identity(&self, id: IdentityId) -> Result<Identity, StoreError>;

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError>;

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError>;

    async fn create_role(&self, new: NewRole, now: DateTime<Utc>) -> Result<RoleRecord, StoreError>;

    /// Fails with `Conflict` while any identity still holds the role.
    async fn delete_role(&self, id: RoleId) -> Result<RoleRecord, StoreError>;

    /// Fails with `Conflict` when the membership already exists and with `NotFound`
    /// when either side does not exist.
    async fn assign_role(
        &self,
        identity_id: IdentityId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<Membership, StoreError>;

    async fn remove_role(&self, identity_id: IdentityId, role_id: RoleId) -> Result<Membership, StoreError>;
}

/// Server-side registry of issued refresh tokens, keyed by fingerprint.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(&self, token: StoredRefreshToken) -> Result<(), StoreError>;

    /// Remove and return the record, so each refresh token is usable once.
    async fn take(&self, fingerprint: &str) -> Result<Option<StoredRefreshToken>, StoreError>;

    /// Drop records that expired before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
