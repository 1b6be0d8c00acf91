use std::collections::BTreeSet;

use serde::Serialize;

use keygate_core::IdentityId;

use crate::{AccessClaims, Role};

/// Identity recovered from a verified access token.
///
/// Built only from a fully validated token, so a value of this type is never a
/// partial or degraded identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    subject_id: IdentityId,
    display_name: String,
    email: String,
    roles: BTreeSet<Role>,
}

impl IdentityContext {
    pub fn new(
        subject_id: IdentityId,
        display_name: impl Into<String>,
        email: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            subject_id,
            display_name: display_name.into(),
            email: email.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn subject_id(&self) -> IdentityId {
        self.subject_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn has_any_role(&self, required: &[Role]) -> bool {
        required.iter().any(|r| self.roles.contains(r))
    }
}

impl TryFrom<AccessClaims> for IdentityContext {
    type Error = keygate_core::DomainError;

    fn try_from(claims: AccessClaims) -> Result<Self, Self::Error> {
        let subject_id: IdentityId = claims.sub.parse()?;
        Ok(Self::new(
            subject_id,
            claims.name,
            claims.email,
            claims.role.into_iter().map(Role::from),
        ))
    }
}
