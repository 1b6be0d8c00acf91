use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keygate_auth::{RefreshTokenStore, StoreError, StoredRefreshToken};

use super::poisoned;

#[derive(Debug, Default)]
pub struct InMemoryRefreshTokens {
    tokens: RwLock<HashMap<String, StoredRefreshToken>>,
}

impl InMemoryRefreshTokens {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokens {
    async fn save(&self, token: StoredRefreshToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        tokens.insert(token.fingerprint.clone(), token);
        Ok(())
    }

    async fn take(&self, fingerprint: &str) -> Result<Option<StoredRefreshToken>, StoreError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        Ok(tokens.remove(fingerprint))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        Ok((before - tokens.len()) as u64)
    }
}
