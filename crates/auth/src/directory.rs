//! Administration of identities, roles and memberships.
//!
//! Every mutation returns a [`Change`] with before/after snapshots so the caller can
//! hand them to the audit recorder once the mutation has committed.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use keygate_core::{DomainError, DomainResult, IdentityId, RoleId};

use crate::{
    DirectoryStore, Identity, IdentityUpdate, Membership, NewIdentity, NewRole, PasswordHasher,
    PublicIdentity, Role, RoleRecord,
};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Snapshot pair produced by a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change<T> {
    pub before: Option<T>,
    pub after: Option<T>,
}

impl<T> Change<T> {
    pub fn created(after: T) -> Self {
        Self { before: None, after: Some(after) }
    }

    pub fn updated(before: T, after: T) -> Self {
        Self { before: Some(before), after: Some(after) }
    }

    pub fn deleted(before: T) -> Self {
        Self { before: Some(before), after: None }
    }
}

/// Request to create an identity with a plaintext password.
#[derive(Clone)]
pub struct CreateIdentity {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub is_active: bool,
    pub roles: Vec<RoleId>,
}

pub struct DirectoryService {
    store: Arc<dyn DirectoryStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DirectoryStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn list_identities(&self) -> DomainResult<Vec<PublicIdentity>> {
        let identities = self.store.list_identities().await?;
        let mut out = Vec::with_capacity(identities.len());
        for identity in identities {
            out.push(self.project(&identity).await?);
        }
        Ok(out)
    }

    pub async fn get_identity(&self, id: IdentityId) -> DomainResult<PublicIdentity> {
        let identity = self.require_identity(id).await?;
        self.project(&identity).await
    }

    pub async fn create_identity(
        &self,
        cmd: CreateIdentity,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<PublicIdentity>> {
        let email = normalize_email(&cmd.email)?;
        let full_name = normalize_name(&cmd.full_name)?;
        check_password(&cmd.password)?;

        let roles: Vec<RoleId> = cmd.roles.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        for role_id in &roles {
            if self.store.find_role(*role_id).await?.is_none() {
                return Err(DomainError::not_found(format!("role {role_id}")));
            }
        }

        let password_hash = self.hash_off_thread(cmd.password).await?;
        let identity = self
            .store
            .create_identity(
                NewIdentity {
                    email,
                    full_name,
                    password_hash,
                    is_active: cmd.is_active,
                },
                &roles,
                now,
            )
            .await?;

        tracing::info!(identity_id = %identity.id, "identity created");
        Ok(Change::created(self.project(&identity).await?))
    }

    pub async fn update_identity(
        &self,
        id: IdentityId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<PublicIdentity>> {
        let update = IdentityUpdate {
            email: update.email.as_deref().map(normalize_email).transpose()?,
            full_name: update.full_name.as_deref().map(normalize_name).transpose()?,
        };

        let before = self.get_identity(id).await?;
        let updated = self.store.update_identity(id, update, now).await?;
        Ok(Change::updated(before, self.project(&updated).await?))
    }

    pub async fn change_password(
        &self,
        id: IdentityId,
        password: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<PublicIdentity>> {
        check_password(&password)?;
        let before = self.get_identity(id).await?;
        let password_hash = self.hash_off_thread(password).await?;
        let updated = self.store.set_password_hash(id, password_hash, now).await?;
        Ok(Change::updated(before, self.project(&updated).await?))
    }

    pub async fn set_active(
        &self,
        id: IdentityId,
        active: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<PublicIdentity>> {
        let before = self.get_identity(id).await?;
        let updated = self.store.set_active(id, active, now).await?;
        Ok(Change::updated(before, self.project(&updated).await?))
    }

    pub async fn delete_identity(&self, id: IdentityId) -> DomainResult<Change<PublicIdentity>> {
        let before = self.get_identity(id).await?;
        self.store.delete_identity(id).await?;
        tracing::info!(identity_id = %id, "identity deleted");
        Ok(Change::deleted(before))
    }

    pub async fn list_roles(&self) -> DomainResult<Vec<RoleRecord>> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn create_role(
        &self,
        name: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<RoleRecord>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let role = self
            .store
            .create_role(
                NewRole {
                    name: Role::new(name.to_string()),
                    description,
                },
                now,
            )
            .await?;
        Ok(Change::created(role))
    }

    pub async fn delete_role(&self, id: RoleId) -> DomainResult<Change<RoleRecord>> {
        let removed = self.store.delete_role(id).await?;
        Ok(Change::deleted(removed))
    }

    pub async fn assign_role(
        &self,
        identity_id: IdentityId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> DomainResult<Change<Membership>> {
        let membership = self.store.assign_role(identity_id, role_id, now).await?;
        Ok(Change::created(membership))
    }

    pub async fn remove_role(&self, identity_id: IdentityId, role_id: RoleId) -> DomainResult<Change<Membership>> {
        let membership = self.store.remove_role(identity_id, role_id).await?;
        Ok(Change::deleted(membership))
    }

    async fn require_identity(&self, id: IdentityId) -> DomainResult<Identity> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("identity {id}")))
    }

    async fn project(&self, identity: &Identity) -> DomainResult<PublicIdentity> {
        let roles = self.store.roles_for(identity.id).await?;
        Ok(identity.to_public(roles))
    }

    async fn hash_off_thread(&self, password: String) -> DomainResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| DomainError::unavailable(e.to_string()))?
            .map_err(|e| DomainError::unavailable(e.to_string()))
    }
}

/// Trimmed but not case-folded: email uniqueness is case-sensitive.
fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(' ') => {
            Ok(email.to_string())
        }
        _ => Err(DomainError::validation("email must look like local@domain")),
    }
}

fn normalize_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("full name must not be empty"));
    }
    Ok(name.to_string())
}

fn check_password(password: &str) -> DomainResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_but_keep_case() {
        assert_eq!(normalize_email("  Bob@Example.com ").unwrap(), "Bob@Example.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "bob", "@example.com", "bob@", "bo b@example.com"] {
            assert!(
                matches!(normalize_email(bad), Err(DomainError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(normalize_name("   ").is_err());
        assert_eq!(normalize_name(" Ada ").unwrap(), "Ada");
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("short").is_err());
        assert!(check_password("long-enough").is_ok());
    }

    #[test]
    fn change_constructors_place_snapshots() {
        let c = Change::updated(1, 2);
        assert_eq!((c.before, c.after), (Some(1), Some(2)));
        assert_eq!(Change::created(3).before, None);
        assert_eq!(Change::deleted(4).after, None);
    }
}
