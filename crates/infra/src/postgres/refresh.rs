use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use keygate_auth::{RefreshTokenStore, StoreError, StoredRefreshToken};
use keygate_core::IdentityId;

use super::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PgRefreshTokens {
    pool: PgPool,
}

impl PgRefreshTokens {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokens {
    async fn save(&self, token: StoredRefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (fingerprint, identity_id, issued_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.fingerprint)
        .bind(token.identity_id.get())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_refresh_token", e))?;
        Ok(())
    }

    async fn take(&self, fingerprint: &str) -> Result<Option<StoredRefreshToken>, StoreError> {
        // DELETE ... RETURNING makes consumption atomic under concurrent refreshes.
        let row = sqlx::query(
            "DELETE FROM refresh_tokens WHERE fingerprint = $1 \
             RETURNING fingerprint, identity_id, issued_at, expires_at",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("take_refresh_token", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode refresh token: {e}"));
        Ok(Some(StoredRefreshToken {
            fingerprint: row.try_get("fingerprint").map_err(decode)?,
            identity_id: IdentityId::new(row.try_get("identity_id").map_err(decode)?),
            issued_at: row.try_get("issued_at").map_err(decode)?,
            expires_at: row.try_get("expires_at").map_err(decode)?,
        }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_refresh_tokens", e))?;
        Ok(result.rows_affected())
    }
}
