//! Runs against a live database only when `DATABASE_URL` is set; otherwise each test
//! returns early.

use chrono::Utc;
use keygate_audit::{AuditFilter, AuditSink, NewAuditEntry, Pagination};
use keygate_auth::{CredentialStore, DirectoryStore, NewIdentity, NewRole, Role, StoreError};
use keygate_core::RoleId;
use keygate_infra::postgres::{self, PgAuditLog, PgDirectory};
use sqlx::PgPool;

async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = postgres::connect(&url).await.expect("connect");
    postgres::ensure_schema(&pool).await.expect("schema");
    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn new_identity(email: &str) -> NewIdentity {
    NewIdentity {
        email: email.to_string(),
        full_name: "Someone".to_string(),
        password_hash: "hash".to_string(),
        is_active: true,
    }
}

#[tokio::test]
async fn repeated_initial_role_rolls_back_the_identity() {
    let Some(pool) = pool().await else { return };
    let store = PgDirectory::new(pool);
    let now = Utc::now();
    let role = store
        .create_role(
            NewRole {
                name: Role::from(unique("Clerk")),
                description: None,
            },
            now,
        )
        .await
        .unwrap();
    let email = format!("{}@example.com", unique("pg"));

    let err = store
        .create_identity(new_identity(&email), &[role.id, role.id], now)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert!(store.find_by_email(&email).await.unwrap().is_none());

    let err = store
        .create_identity(new_identity(&email), &[RoleId::new(i64::MAX)], now)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let created = store.create_identity(new_identity(&email), &[role.id], now).await.unwrap();
    assert_eq!(store.roles_for(created.id).await.unwrap(), vec![role.name.clone()]);

    store.delete_identity(created.id).await.unwrap();
    store.delete_role(role.id).await.unwrap();
}

#[tokio::test]
async fn entries_from_deleted_actors_are_kept_without_an_actor() {
    let Some(pool) = pool().await else { return };
    let store = PgDirectory::new(pool.clone());
    let log = PgAuditLog::new(pool);
    let now = Utc::now();

    let email = format!("{}@example.com", unique("gone"));
    let actor = store.create_identity(new_identity(&email), &[], now).await.unwrap();
    store.delete_identity(actor.id).await.unwrap();

    let entity_id = unique("self-delete");
    log.append(NewAuditEntry::new(Some(actor.id), "Identity", &entity_id, "Delete").into_entry(now))
        .await
        .unwrap();

    let page = log
        .query(
            AuditFilter {
                entity_type: Some("Identity".to_string()),
                entity_id: Some(entity_id),
                ..AuditFilter::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].actor_id, None);
    assert_eq!(page.entries[0].action, "Delete");
}
