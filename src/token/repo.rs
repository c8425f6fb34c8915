//! Token record persistence.
//!
//! Revocation is a soft delete: every lookup and mutation filters on
//! `deleted_at IS NULL`, so a revoked record is never live again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{NewTokenRecord, Owner, Rotation, TokenRecord};

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, record: NewTokenRecord) -> Result<TokenRecord>;

    /// Live (not revoked) record for `uuid`.
    async fn find_live(&self, uuid: Uuid) -> Result<Option<TokenRecord>>;

    /// Live records of `owner`, newest first.
    async fn list_live(&self, owner: Owner) -> Result<Vec<TokenRecord>>;

    /// Apply `rotation` only if the record still carries the prior uuid and
    /// refresh hash. Returns `false` if another writer got there first.
    async fn rotate(&self, rotation: Rotation) -> Result<bool>;

    /// Revoke `uuid` if it is live and belongs to `owner`.
    async fn revoke(&self, uuid: Uuid, owner: Owner) -> Result<bool>;

    /// Revoke every live record of `owner`, returning how many were revoked.
    async fn revoke_all(&self, owner: Owner) -> Result<u64>;

    async fn touch_last_used(&self, uuid: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

const SELECT_COLUMNS: &str = r"
    id, uuid, owner_id, owner_type, access_token, access_token_expires_at,
    refresh_token, refresh_token_expires_at, ip, user_agent, last_used_at,
    created_at, updated_at";

fn record_from_row(row: &PgRow) -> Result<TokenRecord> {
    let owner_type: String = row.try_get("owner_type")?;
    let owner_id: Uuid = row.try_get("owner_id")?;
    Ok(TokenRecord {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        owner: Owner::from_parts(&owner_type, owner_id)?,
        access_token_hash: row.try_get("access_token")?,
        access_token_expires_at: row.try_get("access_token_expires_at")?,
        refresh_token_hash: row.try_get("refresh_token")?,
        refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
        ip: row.try_get("ip")?,
        user_agent: row.try_get("user_agent")?,
        last_used_at: row.try_get("last_used_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert(&self, record: NewTokenRecord) -> Result<TokenRecord> {
        let query = format!(
            r"
            INSERT INTO access_tokens
                (uuid, owner_id, owner_type, access_token, access_token_expires_at,
                 refresh_token, refresh_token_expires_at, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {SELECT_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(record.uuid)
            .bind(record.owner.id())
            .bind(record.owner.kind().as_str())
            .bind(&record.access_token_hash)
            .bind(record.access_token_expires_at)
            .bind(&record.refresh_token_hash)
            .bind(record.refresh_token_expires_at)
            .bind(&record.client.ip)
            .bind(&record.client.user_agent)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert access token")?;

        record_from_row(&row)
    }

    async fn find_live(&self, uuid: Uuid) -> Result<Option<TokenRecord>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM access_tokens WHERE uuid = $1 AND deleted_at IS NULL"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup access token")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_live(&self, owner: Owner) -> Result<Vec<TokenRecord>> {
        let query = format!(
            r"
            SELECT {SELECT_COLUMNS} FROM access_tokens
            WHERE owner_id = $1 AND owner_type = $2 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .bind(owner.id())
            .bind(owner.kind().as_str())
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list access tokens")?;

        rows.iter().map(record_from_row).collect()
    }

    async fn rotate(&self, rotation: Rotation) -> Result<bool> {
        let query = r"
            UPDATE access_tokens
            SET uuid = $1,
                access_token = $2,
                access_token_expires_at = $3,
                refresh_token = $4,
                refresh_token_expires_at = $5,
                updated_at = NOW()
            WHERE uuid = $6
              AND refresh_token = $7
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(rotation.new_uuid)
            .bind(&rotation.access_token_hash)
            .bind(rotation.access_token_expires_at)
            .bind(&rotation.refresh_token_hash)
            .bind(rotation.refresh_token_expires_at)
            .bind(rotation.old_uuid)
            .bind(&rotation.prior_refresh_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate access token")?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, uuid: Uuid, owner: Owner) -> Result<bool> {
        let query = r"
            UPDATE access_tokens
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE uuid = $1
              AND owner_id = $2
              AND owner_type = $3
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(uuid)
            .bind(owner.id())
            .bind(owner.kind().as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke access token")?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all(&self, owner: Owner) -> Result<u64> {
        let query = r"
            UPDATE access_tokens
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE owner_id = $1
              AND owner_type = $2
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(owner.id())
            .bind(owner.kind().as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke access tokens")?;

        Ok(result.rows_affected())
    }

    async fn touch_last_used(&self, uuid: Uuid, at: DateTime<Utc>) -> Result<()> {
        let query =
            "UPDATE access_tokens SET last_used_at = $1 WHERE uuid = $2 AND deleted_at IS NULL";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(at)
            .bind(uuid)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update last_used_at")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to ping database")?;
        Ok(())
    }
}
