use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keygate_auth::{
    CredentialStore, DirectoryStore, Identity, IdentityUpdate, Membership, NewIdentity, NewRole, Role,
    RoleRecord, StoreError,
};
use keygate_core::{IdentityId, RoleId};

use super::poisoned;
use crate::conflicts;

#[derive(Debug, Default)]
struct DirectoryState {
    last_identity_id: i64,
    last_role_id: i64,
    identities: BTreeMap<IdentityId, Identity>,
    roles: BTreeMap<RoleId, RoleRecord>,
    memberships: BTreeMap<(IdentityId, RoleId), Membership>,
}

impl DirectoryState {
    fn identity_mut(&mut self, id: IdentityId) -> Result<&mut Identity, StoreError> {
        self.identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))
    }

    fn email_taken(&self, email: &str, except: Option<IdentityId>) -> bool {
        self.identities
            .values()
            .any(|i| i.email == email && Some(i.id) != except)
    }
}

/// Identities, roles and memberships behind a single lock, so every uniqueness and
/// referential check happens atomically with the write it guards.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn holds_identity(&self, id: IdentityId) -> Result<bool, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.identities.contains_key(&id))
    }
}

#[async_trait]
impl CredentialStore for InMemoryDirectory {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .identities
            .values()
            .find(|i| i.is_active && i.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.identities.get(&id).cloned())
    }

    async fn roles_for(&self, id: IdentityId) -> Result<Vec<Role>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        let names: BTreeSet<Role> = state
            .memberships
            .keys()
            .filter(|(identity_id, _)| *identity_id == id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .map(|r| r.name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.identities.values().cloned().collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn create_identity(
        &self,
        new: NewIdentity,
        roles: &[RoleId],
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.email_taken(&new.email, None) {
            return Err(StoreError::Conflict(conflicts::EMAIL_TAKEN.to_string()));
        }
        if let Some(missing) = roles.iter().find(|id| !state.roles.contains_key(*id)) {
            return Err(StoreError::NotFound(format!("role {missing}")));
        }
        let role_ids: BTreeSet<RoleId> = roles.iter().copied().collect();
        if role_ids.len() != roles.len() {
            return Err(StoreError::Conflict(conflicts::MEMBERSHIP_EXISTS.to_string()));
        }

        state.last_identity_id += 1;
        let identity = Identity {
            id: IdentityId::new(state.last_identity_id),
            email: new.email,
            full_name: new.full_name,
            password_hash: new.password_hash,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        for role_id in role_ids {
            state.memberships.insert(
                (identity.id, role_id),
                Membership {
                    identity_id: identity.id,
                    role_id,
                    assigned_at: now,
                },
            );
        }
        state.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if let Some(email) = &update.email {
            if state.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(conflicts::EMAIL_TAKEN.to_string()));
            }
        }

        let identity = state.identity_mut(id)?;
        if let Some(email) = update.email {
            identity.email = email;
        }
        if let Some(full_name) = update.full_name {
            identity.full_name = full_name;
        }
        identity.updated_at = now;
        Ok(identity.clone())
    }

    async fn set_password_hash(
        &self,
        id: IdentityId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let identity = state.identity_mut(id)?;
        identity.password_hash = password_hash;
        identity.updated_at = now;
        Ok(identity.clone())
    }

    async fn set_active(&self, id: IdentityId, active: bool, now: DateTime<Utc>) -> Result<Identity, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let identity = state.identity_mut(id)?;
        identity.is_active = active;
        identity.updated_at = now;
        Ok(identity.clone())
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<Identity, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let removed = state
            .identities
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        state.memberships.retain(|(identity_id, _), _| *identity_id != id);
        Ok(removed)
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        let mut roles: Vec<RoleRecord> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.roles.values().find(|r| r.name.as_str() == name).cloned())
    }

    async fn create_role(&self, new: NewRole, now: DateTime<Utc>) -> Result<RoleRecord, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.roles.values().any(|r| r.name == new.name) {
            return Err(StoreError::Conflict(conflicts::ROLE_NAME_TAKEN.to_string()));
        }

        state.last_role_id += 1;
        let role = RoleRecord {
            id: RoleId::new(state.last_role_id),
            name: new.name,
            description: new.description,
            created_at: now,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn delete_role(&self, id: RoleId) -> Result<RoleRecord, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.roles.contains_key(&id) {
            return Err(StoreError::NotFound(format!("role {id}")));
        }
        if state.memberships.keys().any(|(_, role_id)| *role_id == id) {
            return Err(StoreError::Conflict(conflicts::ROLE_IN_USE.to_string()));
        }
        state
            .roles
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))
    }

    async fn assign_role(
        &self,
        identity_id: IdentityId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<Membership, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.identities.contains_key(&identity_id) {
            return Err(StoreError::NotFound(format!("identity {identity_id}")));
        }
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if state.memberships.contains_key(&(identity_id, role_id)) {
            return Err(StoreError::Conflict(conflicts::MEMBERSHIP_EXISTS.to_string()));
        }

        let membership = Membership {
            identity_id,
            role_id,
            assigned_at: now,
        };
        state.memberships.insert((identity_id, role_id), membership.clone());
        Ok(membership)
    }

    async fn remove_role(&self, identity_id: IdentityId, role_id: RoleId) -> Result<Membership, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .memberships
            .remove(&(identity_id, role_id))
            .ok_or_else(|| StoreError::NotFound(format!("membership of role {role_id} for identity {identity_id}")))
    }
}
