use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    models::{NewTokenRecord, Owner, Rotation, TokenRecord},
    repo::TokenRepository,
};

struct Stored {
    record: TokenRecord,
    deleted_at: Option<DateTime<Utc>>,
}

impl Stored {
    fn live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Single-process token repository for development and tests.
#[derive(Default)]
pub struct MemoryTokenRepository {
    rows: Mutex<Vec<Stored>>,
}

impl MemoryTokenRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored expiries of a live record.
    pub async fn set_expiries(
        &self,
        uuid: Uuid,
        access_expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> bool {
        let mut rows = self.rows.lock().await;
        rows.iter_mut()
            .find(|row| row.live() && row.record.uuid == uuid)
            .map(|row| {
                row.record.access_token_expires_at = access_expires_at;
                row.record.refresh_token_expires_at = refresh_expires_at;
            })
            .is_some()
    }

    /// Number of records, live or revoked.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn insert(&self, new: NewTokenRecord) -> Result<TokenRecord> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|row| row.record.uuid == new.uuid) {
            anyhow::bail!("duplicate token uuid {}", new.uuid);
        }
        let now = Utc::now();
        let record = TokenRecord {
            id: i64::try_from(rows.len())? + 1,
            uuid: new.uuid,
            owner: new.owner,
            access_token_hash: new.access_token_hash,
            access_token_expires_at: new.access_token_expires_at,
            refresh_token_hash: new.refresh_token_hash,
            refresh_token_expires_at: new.refresh_token_expires_at,
            ip: new.client.ip,
            user_agent: new.client.user_agent,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(Stored {
            record: record.clone(),
            deleted_at: None,
        });
        Ok(record)
    }

    async fn find_live(&self, uuid: Uuid) -> Result<Option<TokenRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.live() && row.record.uuid == uuid)
            .map(|row| row.record.clone()))
    }

    async fn list_live(&self, owner: Owner) -> Result<Vec<TokenRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|row| row.live() && row.record.owner == owner)
            .map(|row| row.record.clone())
            .collect())
    }

    async fn rotate(&self, rotation: Rotation) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.iter_mut().find(|row| {
            row.live()
                && row.record.uuid == rotation.old_uuid
                && row.record.refresh_token_hash == rotation.prior_refresh_hash
        }) else {
            return Ok(false);
        };
        row.record.uuid = rotation.new_uuid;
        row.record.access_token_hash = rotation.access_token_hash;
        row.record.access_token_expires_at = rotation.access_token_expires_at;
        row.record.refresh_token_hash = rotation.refresh_token_hash;
        row.record.refresh_token_expires_at = rotation.refresh_token_expires_at;
        row.record.updated_at = Utc::now();
        Ok(true)
    }

    async fn revoke(&self, uuid: Uuid, owner: Owner) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows
            .iter_mut()
            .find(|row| row.live() && row.record.uuid == uuid && row.record.owner == owner)
        else {
            return Ok(false);
        };
        row.deleted_at = Some(Utc::now());
        Ok(true)
    }

    async fn revoke_all(&self, owner: Owner) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let mut revoked = 0;
        for row in rows
            .iter_mut()
            .filter(|row| row.live() && row.record.owner == owner)
        {
            row.deleted_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn touch_last_used(&self, uuid: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.live() && row.record.uuid == uuid)
        {
            row.record.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
