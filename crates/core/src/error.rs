//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Each variant corresponds to one caller-visible failure class. Authentication
/// failures carry no detail on purpose: they must not reveal which factor was wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness or referential rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad credentials or a missing/invalid/expired token.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Valid identity, insufficient role.
    #[error("forbidden: required role not met")]
    Forbidden,

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_message_is_generic() {
        assert_eq!(DomainError::Unauthenticated.to_string(), "unauthenticated");
    }

    #[test]
    fn forbidden_does_not_name_a_role() {
        let msg = DomainError::Forbidden.to_string();
        assert_eq!(msg, "forbidden: required role not met");
    }

    #[test]
    fn not_found_names_the_resource_kind() {
        assert_eq!(DomainError::not_found("role").to_string(), "role not found");
    }
}
