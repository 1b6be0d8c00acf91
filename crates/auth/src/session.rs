//! Login / refresh / request-authentication state machine.
//!
//! ```text
//! Anonymous --login--> Authenticated(pair)
//! Authenticated --refresh(valid refresh token)--> Authenticated(new pair)
//! Authenticated --refresh(invalid/absent/expired)--> Anonymous
//! ```
//!
//! Access and refresh tokens are separate trust domains: refresh never looks at the
//! access token, and request authentication never looks at the refresh store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use keygate_core::DomainError;

use crate::{
    AccessTokenValidator, CredentialStore, Hs256TokenValidator, Identity, IdentityContext,
    PasswordError, PasswordHasher, PublicIdentity, RefreshTokenStore, StoreError,
    StoredRefreshToken, TokenIssuer, TokenSettings, refresh,
};

/// Verified against when the email is unknown, so both failure paths cost the same.
const DUMMY_PASSWORD: &str = "keygate-timing-equaliser";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, inactive identity or wrong password. Deliberately one variant.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Missing, unknown, expired, consumed or tampered token.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("token issuance failed: {0}")]
    Issuance(String),
}

impl From<AuthError> for DomainError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials | AuthError::InvalidToken => DomainError::Unauthenticated,
            AuthError::Store(e) => e.into(),
            AuthError::Issuance(msg) => DomainError::Unavailable(msg),
        }
    }
}

/// Access + refresh token issued together, with the public identity they belong to.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: PublicIdentity,
}

impl core::fmt::Debug for SessionCredentialPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionCredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

pub struct SessionService {
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: Arc<dyn PasswordHasher>,
    settings: Arc<TokenSettings>,
    issuer: TokenIssuer,
    validator: Arc<dyn AccessTokenValidator>,
    dummy_hash: String,
}

impl SessionService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: Arc<dyn PasswordHasher>,
        settings: Arc<TokenSettings>,
    ) -> Result<Self, PasswordError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            credentials,
            refresh_tokens,
            hasher,
            issuer: TokenIssuer::new(settings.clone()),
            validator: Arc::new(Hs256TokenValidator::new(&settings)),
            settings,
            dummy_hash,
        })
    }

    /// Validator sharing this service's signing key, for the request gate.
    pub fn validator(&self) -> Arc<dyn AccessTokenValidator> {
        self.validator.clone()
    }

    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionCredentialPair, AuthError> {
        let identity = self.credentials.find_active_by_email(email).await?;

        let stored_hash = identity
            .as_ref()
            .map(|i| i.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let verified = self.verify_off_thread(password, stored_hash).await;

        let identity = match identity {
            Some(identity) if verified => identity,
            _ => {
                tracing::info!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let pair = self.issue_pair(identity, now).await?;
        tracing::info!(identity_id = %pair.user.id, "login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed.
    pub async fn refresh(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionCredentialPair, AuthError> {
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let stored = self
            .refresh_tokens
            .take(&refresh::fingerprint(presented))
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if stored.is_expired(now) {
            tracing::info!(identity_id = %stored.identity_id, "expired refresh token presented");
            return Err(AuthError::InvalidToken);
        }

        let identity = self
            .credentials
            .find_by_id(stored.identity_id)
            .await?
            .filter(|i| i.is_active)
            .ok_or(AuthError::InvalidToken)?;

        let pair = self.issue_pair(identity, now).await?;
        tracing::info!(identity_id = %pair.user.id, "session refreshed");
        Ok(pair)
    }

    pub fn authenticate_request(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityContext, AuthError> {
        self.validator
            .authenticate(token, now)
            .map_err(|_| AuthError::InvalidToken)
    }

    async fn issue_pair(&self, identity: Identity, now: DateTime<Utc>) -> Result<SessionCredentialPair, AuthError> {
        let roles = self.credentials.roles_for(identity.id).await?;

        let access = self
            .issuer
            .issue_access_token(&identity, &roles, now)
            .map_err(|e| AuthError::Issuance(e.to_string()))?;
        let refresh_token = self.issuer.issue_refresh_token();

        self.refresh_tokens
            .save(StoredRefreshToken::new(
                &refresh_token,
                identity.id,
                now,
                self.settings.refresh_ttl(),
            ))
            .await?;

        Ok(SessionCredentialPair {
            access_token: access.token,
            refresh_token: refresh_token.into_string(),
            expires_at: access.expires_at,
            user: identity.to_public(roles),
        })
    }

    async fn verify_off_thread(&self, password: &str, stored_hash: String) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .unwrap_or(false)
    }
}
