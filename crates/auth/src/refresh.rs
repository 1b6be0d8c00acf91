//! Opaque refresh tokens.
//!
//! The raw token is handed to the client once. The store only ever sees its SHA-256
//! fingerprint, so a leaked table cannot be replayed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use keygate_core::IdentityId;

pub const REFRESH_TOKEN_BYTES: usize = 64;

/// A freshly generated refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl core::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("RefreshToken(<redacted>)")
    }
}

/// Hex SHA-256 of a presented token.
pub fn fingerprint(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Server-side record of an issued refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRefreshToken {
    pub fingerprint: String,
    pub identity_id: IdentityId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRefreshToken {
    pub fn new(token: &RefreshToken, identity_id: IdentityId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            fingerprint: token.fingerprint(),
            identity_id,
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
