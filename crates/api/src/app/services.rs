//! Service wiring: stores, hasher, session/directory services and the audit recorder.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use keygate_audit::{AccessLogPolicy, AuditAction, AuditRecorder, AuditSink, NewAuditEntry};
use keygate_auth::{
    Argon2Hasher, Change, CredentialStore, DirectoryService, DirectoryStore, IdentityContext, PasswordHasher,
    RefreshTokenStore, SessionService,
};
use keygate_infra::{
    InMemoryAuditLog, InMemoryDirectory, InMemoryRefreshTokens, PgAuditLog, PgDirectory, PgRefreshTokens,
    postgres, seed_admin,
};

use crate::config::AppConfig;
use crate::context::ClientMeta;

/// Store adapters behind their trait objects.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        Self {
            credentials: directory.clone(),
            audit: Arc::new(InMemoryAuditLog::linked_to(directory.clone())),
            directory,
            refresh_tokens: Arc::new(InMemoryRefreshTokens::new()),
        }
    }

    pub async fn postgres(database_url: &str) -> anyhow::Result<Self> {
        let pool = postgres::connect(database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        postgres::ensure_schema(&pool)
            .await
            .context("failed to ensure database schema")?;

        let directory = Arc::new(PgDirectory::new(pool.clone()));
        Ok(Self {
            credentials: directory.clone(),
            directory,
            refresh_tokens: Arc::new(PgRefreshTokens::new(pool.clone())),
            audit: Arc::new(PgAuditLog::new(pool)),
        })
    }

    /// Replace the audit sink, keeping everything else.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

pub struct AppServices {
    pub sessions: SessionService,
    pub directory: DirectoryService,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub audit: AuditRecorder,
    pub access_log: AccessLogPolicy,
}

impl AppServices {
    /// Record a committed mutation. Never fails outward.
    pub fn audit_change<T: Serialize>(
        &self,
        actor: &IdentityContext,
        meta: ClientMeta,
        entity_type: &str,
        entity_id: impl ToString,
        action: AuditAction,
        change: &Change<T>,
    ) {
        let entry = NewAuditEntry::new(Some(actor.subject_id()), entity_type, entity_id, action)
            .with_meta(meta.into_inner());
        self.audit
            .record_mutation(entry, change.before.as_ref(), change.after.as_ref());
    }
}

pub async fn build_services(config: &AppConfig, stores: Stores) -> anyhow::Result<AppServices> {
    let hasher: Arc<dyn PasswordHasher> =
        Arc::new(Argon2Hasher::new(config.hasher).context("invalid Argon2 parameters")?);
    let settings = Arc::new(config.token_settings()?);

    if let Some(seed) = &config.seed_admin {
        seed_admin(
            stores.directory.as_ref(),
            hasher.as_ref(),
            &seed.email,
            &seed.password,
            Utc::now(),
        )
        .await
        .context("failed to seed administrator")?;
    }

    let sessions = SessionService::new(
        stores.credentials.clone(),
        stores.refresh_tokens.clone(),
        hasher.clone(),
        settings,
    )
    .context("failed to initialise session service")?;

    Ok(AppServices {
        sessions,
        directory: DirectoryService::new(stores.directory, hasher),
        refresh_tokens: stores.refresh_tokens,
        audit: AuditRecorder::new(stores.audit),
        access_log: AccessLogPolicy::default(),
    })
}

/// Periodically drop expired refresh-token records.
pub fn spawn_refresh_token_sweeper(services: Arc<AppServices>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match services.refresh_tokens.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "purged expired refresh tokens"),
                Err(e) => tracing::warn!(error = %e, "refresh token purge failed"),
            }
        }
    })
}
