use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use keygate_audit::{AuditEntry, AuditFilter, AuditPage, AuditSink, AuditSinkError, Pagination};
use keygate_core::IdentityId;

#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn sink_error(operation: &str, err: sqlx::Error) -> AuditSinkError {
    AuditSinkError::Unavailable(format!("{operation}: {err}"))
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, sqlx::Error> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor_id: row.try_get::<Option<i64>, _>("actor_id")?.map(IdentityId::new),
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        action: row.try_get("action")?,
        before: row.try_get("before")?,
        after: row.try_get("after")?,
        occurred_at: row.try_get("occurred_at")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

#[async_trait]
impl AuditSink for PgAuditLog {
    /// An actor that no longer exists is stored as NULL, matching `ON DELETE SET NULL`.
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (id, actor_id, entity_type, entity_id, action, before, after, occurred_at, ip_address, user_agent)
            VALUES ($1, (SELECT id FROM identities WHERE id = $2), $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id.map(|a| a.get()))
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(entry.occurred_at)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| sink_error("append_audit_entry", e))?;
        Ok(())
    }

    async fn query(&self, filter: AuditFilter, pagination: Pagination) -> Result<AuditPage, AuditSinkError> {
        let actor = filter.actor_id.map(|a| a.get());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM audit_entries
            WHERE ($1::text IS NULL OR entity_type = $1)
                AND ($2::text IS NULL OR entity_id = $2)
                AND ($3::bigint IS NULL OR actor_id = $3)
                AND ($4::timestamptz IS NULL OR occurred_at >= $4)
                AND ($5::timestamptz IS NULL OR occurred_at < $5)
            "#,
        )
        .bind(filter.entity_type.as_deref())
        .bind(filter.entity_id.as_deref())
        .bind(actor)
        .bind(filter.since)
        .bind(filter.until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| sink_error("count_audit_entries", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| sink_error("count_audit_entries", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, entity_type, entity_id, action, before, after, occurred_at, ip_address, user_agent
            FROM audit_entries
            WHERE ($1::text IS NULL OR entity_type = $1)
                AND ($2::text IS NULL OR entity_id = $2)
                AND ($3::bigint IS NULL OR actor_id = $3)
                AND ($4::timestamptz IS NULL OR occurred_at >= $4)
                AND ($5::timestamptz IS NULL OR occurred_at < $5)
            ORDER BY occurred_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.entity_type.as_deref())
        .bind(filter.entity_id.as_deref())
        .bind(actor)
        .bind(filter.since)
        .bind(filter.until)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| sink_error("query_audit_entries", e))?;

        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sink_error("decode_audit_entry", e))?;

        Ok(AuditPage {
            entries,
            total: total as u64,
            has_more: total > i64::from(pagination.offset) + i64::from(pagination.limit),
            pagination,
        })
    }
}
