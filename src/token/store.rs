//! Token store and validator.
//!
//! Flow Overview: a bearer secret is accepted only if its signature and claims
//! verify, a live record exists for the claimed uuid, the record belongs to the
//! expected owner kind, the presented secret matches the stored hash, and the
//! stored expiry has not passed. Checks run in that order.

use anyhow::anyhow;
use chrono::Utc;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    jwt::{CredentialPair, TokenError, TokenIssuer, TokenKind},
    models::{ClientInfo, NewTokenRecord, Owner, OwnerKind, Rotation, TokenRecord},
    repo::TokenRepository,
};
use crate::{
    error::{Error, Result},
    hash::Hasher,
};

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::InvalidSigningMethod => Self::InvalidSigningMethod,
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Signing(reason) => Self::Transient(anyhow!("token signing failed: {reason}")),
            TokenError::Config(reason) => Self::Configuration(reason),
        }
    }
}

pub struct TokenStore {
    issuer: Arc<TokenIssuer>,
    hasher: Hasher,
    repo: Arc<dyn TokenRepository>,
}

impl TokenStore {
    #[must_use]
    pub fn new(issuer: Arc<TokenIssuer>, hasher: Hasher, repo: Arc<dyn TokenRepository>) -> Self {
        Self {
            issuer,
            hasher,
            repo,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Database reachability, for health reporting.
    ///
    /// # Errors
    /// Returns an error if the repository cannot be reached.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.repo.ping().await
    }

    async fn hash(&self, secret: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|err| Error::Transient(anyhow!("hash task failed: {err}")))?
            .map_err(Error::Transient)
    }

    async fn verify_hash(&self, secret: &str, stored: &str) -> Result<bool> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();
        let stored = stored.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored))
            .await
            .map_err(|err| Error::Transient(anyhow!("hash task failed: {err}")))?
            .map_err(Error::Transient)
    }

    /// Persist a freshly minted pair for `owner`, storing only hashes.
    ///
    /// # Errors
    /// [`Error::Transient`] if hashing or persistence fails.
    #[instrument(skip(self, pair, client), fields(token = %pair.uuid))]
    pub async fn create(
        &self,
        owner: Owner,
        pair: &CredentialPair,
        client: &ClientInfo,
    ) -> Result<TokenRecord> {
        let access_token_hash = self.hash(&pair.access_token).await?;
        let refresh_token_hash = self.hash(&pair.refresh_token).await?;

        self.repo
            .insert(NewTokenRecord {
                uuid: pair.uuid,
                owner,
                access_token_hash,
                access_token_expires_at: pair.access_expires_at,
                refresh_token_hash,
                refresh_token_expires_at: pair.refresh_expires_at,
                client: client.clone(),
            })
            .await
            .map_err(Error::Transient)
    }

    /// Resolve a presented secret of `kind` to its live record.
    ///
    /// # Errors
    /// Token errors from signature verification, [`Error::NotFound`] without a
    /// live record, [`Error::AuthenticationFailed`] on owner-kind or hash
    /// mismatch, [`Error::TokenExpired`] once the stored expiry has passed.
    #[instrument(skip(self, token))]
    pub async fn validate(
        &self,
        token: &str,
        kind: TokenKind,
        owner_kind: OwnerKind,
    ) -> Result<TokenRecord> {
        let claims = self.issuer.validate(token)?;
        if claims.typ != kind {
            return Err(Error::InvalidToken);
        }
        let uuid = claims.correlation_id()?;

        let record = self
            .repo
            .find_live(uuid)
            .await
            .map_err(Error::Transient)?
            .ok_or(Error::NotFound)?;

        if record.owner.kind() != owner_kind {
            return Err(Error::AuthenticationFailed);
        }

        let (stored_hash, expires_at) = match kind {
            TokenKind::Access => (&record.access_token_hash, record.access_token_expires_at),
            TokenKind::Refresh => (&record.refresh_token_hash, record.refresh_token_expires_at),
        };
        if !self.verify_hash(token, stored_hash).await? {
            return Err(Error::AuthenticationFailed);
        }

        if expires_at <= Utc::now() {
            return Err(Error::TokenExpired);
        }

        Ok(record)
    }

    /// Exchange a refresh token for a new pair, rotating the record in place.
    ///
    /// The previous pair stops validating as soon as this returns.
    ///
    /// # Errors
    /// [`Error::InvalidRefreshToken`] for any rejected token or a lost race,
    /// [`Error::Transient`] on infrastructure failure.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_tokens(
        &self,
        refresh_token: &str,
        owner_kind: OwnerKind,
    ) -> Result<CredentialPair> {
        let record = match self
            .validate(refresh_token, TokenKind::Refresh, owner_kind)
            .await
        {
            Ok(record) => record,
            Err(err @ Error::Transient(_)) => return Err(err),
            Err(err) => {
                warn!("Refresh token rejected: {err}");
                return Err(Error::InvalidRefreshToken);
            }
        };

        let pair = self.issuer.generate()?;
        let access_token_hash = self.hash(&pair.access_token).await?;
        let refresh_token_hash = self.hash(&pair.refresh_token).await?;

        let rotated = self
            .repo
            .rotate(Rotation {
                old_uuid: record.uuid,
                prior_refresh_hash: record.refresh_token_hash,
                new_uuid: pair.uuid,
                access_token_hash,
                access_token_expires_at: pair.access_expires_at,
                refresh_token_hash,
                refresh_token_expires_at: pair.refresh_expires_at,
            })
            .await
            .map_err(Error::Transient)?;
        if !rotated {
            warn!("Refresh token already rotated by a concurrent request");
            return Err(Error::InvalidRefreshToken);
        }

        Ok(pair)
    }

    /// Revoke one of `owner`'s records.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the uuid is unknown, revoked, or owned by someone else.
    #[instrument(skip(self))]
    pub async fn revoke_token_by_uuid(&self, uuid: Uuid, owner: Owner) -> Result<()> {
        if self
            .repo
            .revoke(uuid, owner)
            .await
            .map_err(Error::Transient)?
        {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Revoke every live record of `owner`.
    ///
    /// # Errors
    /// [`Error::Transient`] on persistence failure.
    #[instrument(skip(self))]
    pub async fn revoke_tokens(&self, owner: Owner) -> Result<u64> {
        self.repo.revoke_all(owner).await.map_err(Error::Transient)
    }

    /// Live records of `owner`, newest first.
    ///
    /// # Errors
    /// [`Error::Transient`] on persistence failure.
    #[instrument(skip(self))]
    pub async fn list_tokens(&self, owner: Owner) -> Result<Vec<TokenRecord>> {
        self.repo.list_live(owner).await.map_err(Error::Transient)
    }

    /// One live record of `owner`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the uuid is unknown, revoked, or owned by someone else.
    #[instrument(skip(self))]
    pub async fn find_token(&self, uuid: Uuid, owner: Owner) -> Result<TokenRecord> {
        self.repo
            .find_live(uuid)
            .await
            .map_err(Error::Transient)?
            .filter(|record| record.owner == owner)
            .ok_or(Error::NotFound)
    }

    /// Record that `record` was just used. Failures are logged, never returned.
    pub async fn update_last_used_at(&self, record: &TokenRecord) {
        if let Err(err) = self.repo.touch_last_used(record.uuid, Utc::now()).await {
            warn!("Failed to update last_used_at for token {}: {err:#}", record.uuid);
        }
    }
}
