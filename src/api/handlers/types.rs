//! Request and response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::token::{CredentialPair, TokenRecord};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpResponse {
    /// Opaque registration session key, echoed back on verification.
    pub key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl From<CredentialPair> for TokenPairResponse {
    fn from(pair: CredentialPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_token_expires_at: pair.access_expires_at,
            refresh_token_expires_at: pair.refresh_expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokedResponse {
    pub revoked: u64,
}

/// Token metadata safe to show its owner. Hashes never leave the store.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessTokenView {
    pub uuid: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Whether this is the token used for the current request.
    pub current: bool,
}

impl AccessTokenView {
    #[must_use]
    pub fn new(record: TokenRecord, current_uuid: Uuid) -> Self {
        Self {
            current: record.uuid == current_uuid,
            uuid: record.uuid,
            access_token_expires_at: record.access_token_expires_at,
            refresh_token_expires_at: record.refresh_token_expires_at,
            ip: record.ip,
            user_agent: record.user_agent,
            last_used_at: record.last_used_at,
            created_at: record.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessTokenList {
    pub access_tokens: Vec<AccessTokenView>,
}
