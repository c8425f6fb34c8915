use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of principal a token belongs to.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
}

impl OwnerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Self::User),
            other => Err(anyhow!("unknown owner kind: {other}")),
        }
    }
}

/// Owner reference of a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    User(Uuid),
}

impl Owner {
    #[must_use]
    pub const fn kind(&self) -> OwnerKind {
        match self {
            Self::User(_) => OwnerKind::User,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        match self {
            Self::User(id) => *id,
        }
    }

    /// Rebuild an owner from its persisted `(owner_type, owner_id)` columns.
    ///
    /// # Errors
    /// Returns an error for an unknown owner kind.
    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self> {
        match kind.parse::<OwnerKind>()? {
            OwnerKind::User => Ok(Self::User(id)),
        }
    }
}

/// Client metadata captured when a token pair is issued.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Persisted token record. Secrets are stored only as hashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub owner: Owner,
    pub access_token_hash: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewTokenRecord {
    pub uuid: Uuid,
    pub owner: Owner,
    pub access_token_hash: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub client: ClientInfo,
}

/// In-place rotation guarded by the previous uuid and refresh hash.
#[derive(Clone, Debug)]
pub struct Rotation {
    pub old_uuid: Uuid,
    pub prior_refresh_hash: String,
    pub new_uuid: Uuid,
    pub access_token_hash: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}
