//! Identity, role and membership records as held by the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keygate_core::{IdentityId, RoleId};

use crate::Role;

/// A stored principal.
///
/// Deliberately not `Serialize`: anything leaving the process goes through
/// [`PublicIdentity`], which has no password-hash field.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn to_public(&self, roles: Vec<Role>) -> PublicIdentity {
        PublicIdentity {
            id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            is_active: self.is_active,
            created_at: self.created_at,
            roles,
        }
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("password_hash", &"<redacted>")
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Wire projection of an identity. Also used as the audit snapshot for identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub id: IdentityId,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

/// Input for inserting a new identity. The password is already hashed.
#[derive(Clone)]
pub struct NewIdentity {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Profile fields that may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: Role,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: Role,
    pub description: Option<String>,
}

/// Association of one identity with one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub identity_id: IdentityId,
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        let now = Utc::now();
        Identity {
            id: IdentityId::new(7),
            email: "alice@example.com".to_string(),
            full_name: "Alice Smith".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn public_projection_never_carries_the_hash() {
        let public = identity().to_public(vec![Role::new("Manager")]);
        let json = serde_json::to_value(&public).unwrap();

        let obj = json.as_object().unwrap();
        assert!(!obj.keys().any(|k| k.to_lowercase().contains("password")));
        assert!(!json.to_string().contains("$argon2id"));
        assert_eq!(json["fullName"], "Alice Smith");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["roles"][0], "Manager");

        let back: PublicIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(back, public);
    }

    #[test]
    fn debug_output_redacts_hash() {
        let dbg = format!("{:?}", identity());
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("argon2id"));
    }
}
