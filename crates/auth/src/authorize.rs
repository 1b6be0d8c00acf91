//! The authorization gate.

use thiserror::Error;

use keygate_core::DomainError;

use crate::{IdentityContext, Role};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    /// No identity, or the token did not validate.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Valid identity whose roles do not intersect the requirement.
    #[error("forbidden: required role not met")]
    Forbidden,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => DomainError::Unauthenticated,
            AuthzError::Forbidden => DomainError::Forbidden,
        }
    }
}

/// Operation-side role requirement, checked at the boundary before the handler body.
///
/// An empty slice means "any authenticated identity".
pub trait RoleRequirement {
    fn required_roles(&self) -> &[Role];
}

/// Decide whether `identity` may run an operation requiring any of `required`.
///
/// - No IO
/// - No panics
/// - Denial never names the missing role
pub fn authorize(identity: Option<&IdentityContext>, required: &[Role]) -> Result<(), AuthzError> {
    let identity = identity.ok_or(AuthzError::Unauthenticated)?;

    if required.is_empty() || identity.has_any_role(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_core::IdentityId;
    use proptest::collection::btree_set;
    use proptest::prelude::*;

    fn ctx(roles: impl IntoIterator<Item = Role>) -> IdentityContext {
        IdentityContext::new(IdentityId::new(1), "Test", "t@example.com", roles)
    }

    #[test]
    fn anonymous_is_unauthenticated_even_for_open_operations() {
        assert_eq!(authorize(None, &[]), Err(AuthzError::Unauthenticated));
        assert_eq!(authorize(None, &[Role::ADMIN]), Err(AuthzError::Unauthenticated));
    }

    #[test]
    fn empty_requirement_admits_any_identity() {
        assert_eq!(authorize(Some(&ctx([])), &[]), Ok(()));
    }

    #[test]
    fn role_names_are_case_sensitive() {
        let identity = ctx([Role::new("admin")]);
        assert_eq!(authorize(Some(&identity), &[Role::ADMIN]), Err(AuthzError::Forbidden));
    }

    #[test]
    fn forbidden_message_does_not_name_the_role() {
        let err = authorize(Some(&ctx([])), &[Role::new("Warehouse")]).unwrap_err();
        assert!(!err.to_string().contains("Warehouse"));
    }

    fn role_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["Admin", "Manager", "Clerk", "Auditor", "Warehouse", "Sales"])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn allow_iff_intersection(
            held in btree_set(role_name(), 0..6),
            required in btree_set(role_name(), 0..6),
        ) {
            let identity = ctx(held.iter().cloned().map(Role::from));
            let required: Vec<Role> = required.iter().cloned().map(Role::from).collect();

            let intersects = required.iter().any(|r| held.contains(r.as_str()));
            let result = authorize(Some(&identity), &required);

            if required.is_empty() || intersects {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(AuthzError::Forbidden));
            }
        }
    }
}
