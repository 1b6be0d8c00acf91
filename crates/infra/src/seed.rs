//! Bootstrap administrator.

use chrono::{DateTime, Utc};

use keygate_auth::{
    DirectoryStore, Identity, NewIdentity, NewRole, PasswordHasher, Role, StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to hash seed password: {0}")]
    Hash(String),
}

/// Ensure an `Admin` role and an active identity holding it exist.
///
/// Idempotent: an existing identity with `email` is re-activated and granted the role,
/// but its password is left untouched.
pub async fn seed_admin(
    store: &dyn DirectoryStore,
    hasher: &dyn PasswordHasher,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<Identity, SeedError> {
    let role = match store.find_role_by_name(Role::ADMIN.as_str()).await? {
        Some(role) => role,
        None => {
            store
                .create_role(
                    NewRole {
                        name: Role::ADMIN,
                        description: Some("Full administrative access".to_string()),
                    },
                    now,
                )
                .await?
        }
    };

    let identity = match store.find_by_email(email).await? {
        Some(existing) if existing.is_active => existing,
        Some(existing) => store.set_active(existing.id, true, now).await?,
        None => {
            let password_hash = hasher.hash(password).map_err(|e| SeedError::Hash(e.to_string()))?;
            let created = store
                .create_identity(
                    NewIdentity {
                        email: email.to_string(),
                        full_name: "Administrator".to_string(),
                        password_hash,
                        is_active: true,
                    },
                    &[role.id],
                    now,
                )
                .await?;
            tracing::info!(identity_id = %created.id, "seeded administrator");
            created
        }
    };

    match store.assign_role(identity.id, role.id, now).await {
        Ok(_) | Err(StoreError::Conflict(_)) => {}
        Err(other) => return Err(other.into()),
    }

    Ok(identity)
}
