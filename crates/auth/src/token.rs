//! Access-token issuance and validation (HS256 JWT).
//!
//! Issuer and validator share one immutable [`TokenSettings`] built at startup, so
//! the signing key used to mint a token is always the one used to verify it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    AccessClaims, Identity, IdentityContext, RefreshToken, Role, TokenValidationError,
    validate_claims,
};

pub const MIN_SIGNING_KEY_BYTES: usize = 32;
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing key must be at least 32 bytes")]
    WeakKey,

    #[error("token lifetime must be positive")]
    InvalidLifetime,

    #[error("failed to encode token: {0}")]
    Encode(String),

    /// Bad signature, wrong issuer/audience, malformed structure or subject.
    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,
}

/// Process-wide token configuration. Read-only after construction.
#[derive(Clone)]
pub struct TokenSettings {
    signing_key: Vec<u8>,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSettings {
    pub fn new(
        signing_key: impl Into<Vec<u8>>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let signing_key = signing_key.into();
        if signing_key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(TokenError::WeakKey);
        }
        Ok(Self {
            signing_key,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        })
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Result<Self, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidLifetime);
        }
        self.access_ttl = ttl;
        Ok(self)
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Result<Self, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidLifetime);
        }
        self.refresh_ttl = ttl;
        Ok(self)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// A signed access token plus the moment it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints access and refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    settings: Arc<TokenSettings>,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(settings: Arc<TokenSettings>) -> Self {
        let encoding_key = EncodingKey::from_secret(&settings.signing_key);
        Self {
            settings,
            encoding_key,
        }
    }

    /// Sign a token carrying exactly `roles`, valid from `now` for the configured
    /// access lifetime.
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<IssuedAccessToken, TokenError> {
        let expires_at = now + self.settings.access_ttl;
        let claims = AccessClaims {
            sub: identity.id.to_string(),
            name: identity.full_name.clone(),
            email: identity.email.clone(),
            role: roles.iter().map(|r| r.as_str().to_string()).collect(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::now_v7().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))?;

        Ok(IssuedAccessToken { token, expires_at })
    }

    pub fn issue_refresh_token(&self) -> RefreshToken {
        RefreshToken::generate()
    }
}

/// Validates an incoming access token and recovers the identity it was issued to.
pub trait AccessTokenValidator: Send + Sync {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityContext, TokenError>;
}

#[derive(Clone)]
pub struct Hs256TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Hs256TokenValidator {
    pub fn new(settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            decoding_key: DecodingKey::from_secret(&settings.signing_key),
            validation,
        }
    }
}

impl AccessTokenValidator for Hs256TokenValidator {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityContext, TokenError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| TokenError::Invalid)?;

        validate_claims(&data.claims, now).map_err(|e| match e {
            TokenValidationError::Expired => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        IdentityContext::try_from(data.claims).map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_core::IdentityId;

    const KEY: &str = "test-signing-key-that-is-at-least-32-bytes";

    fn settings() -> Arc<TokenSettings> {
        Arc::new(TokenSettings::new(KEY, "keygate", "keygate-clients").unwrap())
    }

    fn identity() -> Identity {
        let now = Utc::now();
        Identity {
            id: IdentityId::new(1),
            email: "admin@example.com".to_string(),
            full_name: "System Administrator".to_string(),
            password_hash: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_round_trips_to_identity_context() {
        let settings = settings();
        let issuer = TokenIssuer::new(settings.clone());
        let validator = Hs256TokenValidator::new(&settings);
        let now = Utc::now();

        let issued = issuer
            .issue_access_token(&identity(), &[Role::ADMIN, Role::new("Manager")], now)
            .unwrap();
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.expires_at, now + Duration::minutes(60));

        let ctx = validator.authenticate(&issued.token, now).unwrap();
        assert_eq!(ctx.subject_id(), IdentityId::new(1));
        assert_eq!(ctx.display_name(), "System Administrator");
        assert_eq!(ctx.email(), "admin@example.com");
        let roles: Vec<&str> = ctx.roles().iter().map(|r| r.as_str()).collect();
        assert_eq!(roles, vec!["Admin", "Manager"]);
    }

    #[test]
    fn rejects_after_configured_expiry() {
        let settings = Arc::new(
            TokenSettings::new(KEY, "keygate", "keygate-clients")
                .unwrap()
                .with_access_ttl(Duration::minutes(5))
                .unwrap(),
        );
        let issuer = TokenIssuer::new(settings.clone());
        let validator = Hs256TokenValidator::new(&settings);
        let now = Utc::now();

        let issued = issuer.issue_access_token(&identity(), &[], now).unwrap();
        assert!(validator.authenticate(&issued.token, now + Duration::minutes(4)).is_ok());
        assert_eq!(
            validator.authenticate(&issued.token, now + Duration::minutes(5)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn rejects_foreign_signature_and_tampering() {
        let settings = settings();
        let other = Arc::new(
            TokenSettings::new("another-signing-key-of-sufficient-size!!", "keygate", "keygate-clients")
                .unwrap(),
        );
        let now = Utc::now();
        let forged = TokenIssuer::new(other).issue_access_token(&identity(), &[Role::ADMIN], now).unwrap();
        let validator = Hs256TokenValidator::new(&settings);
        assert_eq!(validator.authenticate(&forged.token, now), Err(TokenError::Invalid));

        let genuine = TokenIssuer::new(settings.clone())
            .issue_access_token(&identity(), &[], now)
            .unwrap();
        let mut parts: Vec<String> = genuine.token.split('.').map(str::to_string).collect();
        parts[1] = parts[1].chars().rev().collect();
        let tampered = parts.join(".");
        assert_eq!(validator.authenticate(&tampered, now), Err(TokenError::Invalid));
        assert_eq!(validator.authenticate("not-a-jwt", now), Err(TokenError::Invalid));
    }

    #[test]
    fn rejects_wrong_audience() {
        let now = Utc::now();
        let minted_for_other = Arc::new(TokenSettings::new(KEY, "keygate", "someone-else").unwrap());
        let token = TokenIssuer::new(minted_for_other)
            .issue_access_token(&identity(), &[], now)
            .unwrap();

        let validator = Hs256TokenValidator::new(&settings());
        assert_eq!(validator.authenticate(&token.token, now), Err(TokenError::Invalid));
    }

    #[test]
    fn settings_reject_short_keys_and_zero_lifetimes() {
        assert_eq!(
            TokenSettings::new("short", "i", "a").unwrap_err(),
            TokenError::WeakKey
        );
        let s = TokenSettings::new(KEY, "i", "a").unwrap();
        assert_eq!(
            s.with_access_ttl(Duration::zero()).unwrap_err(),
            TokenError::InvalidLifetime
        );
    }

    #[test]
    fn debug_redacts_key() {
        assert!(!format!("{:?}", settings()).contains(KEY));
    }
}
