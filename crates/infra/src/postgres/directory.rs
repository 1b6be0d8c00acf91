use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use async_trait::async_trait;
use keygate_auth::{
    CredentialStore, DirectoryStore, Identity, IdentityUpdate, Membership, NewIdentity, NewRole, Role,
    RoleRecord, StoreError,
};
use keygate_core::{IdentityId, RoleId};

use super::{conflict_as, map_sqlx_error};
use crate::conflicts;

const IDENTITY_COLUMNS: &str = "id, email, full_name, password_hash, is_active, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, description, created_at";

#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_identity(&self, sql: &str, operation: &str, id: IdentityId) -> Result<Identity, StoreError> {
        let row = sqlx::query(sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        identity_from_row(&row)
    }
}

fn decode_error(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("failed to decode row: {e}"))
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    Ok(Identity {
        id: IdentityId::new(row.try_get("id").map_err(decode_error)?),
        email: row.try_get("email").map_err(decode_error)?,
        full_name: row.try_get("full_name").map_err(decode_error)?,
        password_hash: row.try_get("password_hash").map_err(decode_error)?,
        is_active: row.try_get("is_active").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleRecord, StoreError> {
    let name: String = row.try_get("name").map_err(decode_error)?;
    Ok(RoleRecord {
        id: RoleId::new(row.try_get("id").map_err(decode_error)?),
        name: Role::from(name),
        description: row.try_get("description").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    Ok(Membership {
        identity_id: IdentityId::new(row.try_get("identity_id").map_err(decode_error)?),
        role_id: RoleId::new(row.try_get("role_id").map_err(decode_error)?),
        assigned_at: row.try_get("assigned_at").map_err(decode_error)?,
    })
}

#[async_trait]
impl CredentialStore for PgDirectory {
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1 AND is_active");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_active_by_email", e))?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn roles_for(&self, id: IdentityId) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.name
            FROM memberships m
            JOIN roles r ON r.id = m.role_id
            WHERE m.identity_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_for", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map(Role::from).map_err(decode_error))
            .collect()
    }
}

#[async_trait]
impl DirectoryStore for PgDirectory {
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_identities", e))?;
        rows.iter().map(identity_from_row).collect()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_email", e))?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn create_identity(
        &self,
        new: NewIdentity,
        roles: &[RoleId],
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let role_ids: Vec<i64> = roles.iter().map(|id| id.get()).collect();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE id = ANY($1)")
            .bind(&role_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_identity", e))?;
        if let Some(missing) = roles.iter().find(|id| !known.contains(&id.get())) {
            return Err(StoreError::NotFound(format!("role {missing}")));
        }

        let sql = format!(
            "INSERT INTO identities (email, full_name, password_hash, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new.email)
            .bind(&new.full_name)
            .bind(&new.password_hash)
            .bind(new.is_active)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_identity", e))
            .map_err(conflict_as(conflicts::EMAIL_TAKEN))?;
        let identity = identity_from_row(&row)?;

        // A repeated role id hits the (identity_id, role_id) key and rolls everything back.
        sqlx::query(
            "INSERT INTO memberships (identity_id, role_id, assigned_at) \
             SELECT $1, role_id, $3 FROM UNNEST($2::BIGINT[]) AS t(role_id)",
        )
        .bind(identity.id.get())
        .bind(&role_ids)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_identity", e))
        .map_err(conflict_as(conflicts::MEMBERSHIP_EXISTS))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(identity)
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let sql = format!(
            "UPDATE identities SET email = COALESCE($2, email), full_name = COALESCE($3, full_name), \
             updated_at = $4 WHERE id = $1 RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(update.email.as_deref())
            .bind(update.full_name.as_deref())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_identity", e))
            .map_err(conflict_as(conflicts::EMAIL_TAKEN))?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        identity_from_row(&row)
    }

    async fn set_password_hash(
        &self,
        id: IdentityId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let sql = format!(
            "UPDATE identities SET password_hash = $2, updated_at = $3 WHERE id = $1 RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(password_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_password_hash", e))?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        identity_from_row(&row)
    }

    async fn set_active(&self, id: IdentityId, active: bool, now: DateTime<Utc>) -> Result<Identity, StoreError> {
        let sql = format!(
            "UPDATE identities SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(active)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_active", e))?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        identity_from_row(&row)
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<Identity, StoreError> {
        let sql = format!("DELETE FROM identities WHERE id = $1 RETURNING {IDENTITY_COLUMNS}");
        self.fetch_identity(&sql, "delete_identity", id).await
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn create_role(&self, new: NewRole, now: DateTime<Utc>) -> Result<RoleRecord, StoreError> {
        let sql = format!(
            "INSERT INTO roles (name, description, created_at) VALUES ($1, $2, $3) RETURNING {ROLE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.name.as_str())
            .bind(new.description.as_deref())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_role", e))
            .map_err(conflict_as(conflicts::ROLE_NAME_TAKEN))?;
        role_from_row(&row)
    }

    async fn delete_role(&self, id: RoleId) -> Result<RoleRecord, StoreError> {
        // memberships.role_id is ON DELETE RESTRICT, so an in-use role fails with 23503.
        let sql = format!("DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))
            .map_err(conflict_as(conflicts::ROLE_IN_USE))?
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;
        role_from_row(&row)
    }

    async fn assign_role(
        &self,
        identity_id: IdentityId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<Membership, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM identities WHERE id = $1) AS identity, \
                    EXISTS (SELECT 1 FROM roles WHERE id = $2) AS role",
        )
        .bind(identity_id.get())
        .bind(role_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        if !exists.try_get::<bool, _>("identity").map_err(decode_error)? {
            return Err(StoreError::NotFound(format!("identity {identity_id}")));
        }
        if !exists.try_get::<bool, _>("role").map_err(decode_error)? {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }

        let row = sqlx::query(
            "INSERT INTO memberships (identity_id, role_id, assigned_at) VALUES ($1, $2, $3) \
             RETURNING identity_id, role_id, assigned_at",
        )
        .bind(identity_id.get())
        .bind(role_id.get())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))
        .map_err(conflict_as(conflicts::MEMBERSHIP_EXISTS))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        membership_from_row(&row)
    }

    async fn remove_role(&self, identity_id: IdentityId, role_id: RoleId) -> Result<Membership, StoreError> {
        let row = sqlx::query(
            "DELETE FROM memberships WHERE identity_id = $1 AND role_id = $2 \
             RETURNING identity_id, role_id, assigned_at",
        )
        .bind(identity_id.get())
        .bind(role_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove_role", e))?
        .ok_or_else(|| StoreError::NotFound(format!("membership of role {role_id} for identity {identity_id}")))?;
        membership_from_row(&row)
    }
}
