//! Signing and verification of access/refresh token pairs.
//!
//! Both tokens of a pair carry the same correlation uuid in `sub`; the `typ`
//! claim tells them apart. Only the configured HMAC algorithm is accepted on
//! verification and no clock leeway is granted.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("unexpected signing method")]
    InvalidSigningMethod,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("invalid token configuration: {0}")]
    Config(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

impl Claims {
    /// Correlation uuid shared by both tokens of a pair.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] if `sub` is not a uuid.
    pub fn correlation_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

/// Freshly minted pair. Plaintext secrets exist only here and in the response.
#[derive(Clone)]
pub struct CredentialPair {
    pub uuid: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("uuid", &self.uuid)
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Parse an HMAC algorithm name (`HS256`, `HS384`, `HS512`).
///
/// # Errors
/// Returns [`TokenError::Config`] for unknown or asymmetric algorithms.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    match Algorithm::from_str(&name.trim().to_ascii_uppercase()) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(TokenError::Config(format!(
            "unsupported signing algorithm: {name}"
        ))),
    }
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    secret: SecretString,
    issuer: String,
    audience: String,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtConfig {
    #[must_use]
    pub fn new(secret: SecretString, issuer: String, audience: String) -> Self {
        Self {
            secret,
            issuer,
            audience,
            algorithm: Algorithm::HS256,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECONDS),
        }
    }

    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Mints and verifies signed token pairs.
pub struct TokenIssuer {
    config: JwtConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("algorithm", &self.config.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// # Errors
    /// Returns [`TokenError::Config`] for an empty secret or a non-HMAC algorithm.
    pub fn new(config: JwtConfig) -> Result<Self, TokenError> {
        if config.secret.expose_secret().is_empty() {
            return Err(TokenError::Config("signing secret is empty".to_string()));
        }
        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::Config(format!(
                "unsupported signing algorithm: {:?}",
                config.algorithm
            )));
        }

        let secret = config.secret.expose_secret().as_bytes();
        let encoding = EncodingKey::from_secret(secret);
        let decoding = DecodingKey::from_secret(secret);

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        Ok(Self {
            config,
            encoding,
            decoding,
            validation,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Mint a pair sharing one fresh correlation uuid.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn generate(&self) -> Result<CredentialPair, TokenError> {
        let now = Utc::now();
        let uuid = Uuid::new_v4();
        let access_expires_at = now + self.config.access_ttl;
        let refresh_expires_at = now + self.config.refresh_ttl;

        Ok(CredentialPair {
            uuid,
            access_token: self.sign(uuid, TokenKind::Access, now, access_expires_at)?,
            access_expires_at,
            refresh_token: self.sign(uuid, TokenKind::Refresh, now, refresh_expires_at)?,
            refresh_expires_at,
        })
    }

    fn sign(
        &self,
        uuid: Uuid,
        typ: TokenKind,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: uuid.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            typ,
        };
        encode(&Header::new(self.config.algorithm), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Verify signature, algorithm, issuer, audience and time window.
    ///
    /// # Errors
    /// [`TokenError::Expired`], [`TokenError::InvalidSigningMethod`] or [`TokenError::Invalid`].
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                JwtErrorKind::InvalidAlgorithm => TokenError::InvalidSigningMethod,
                _ => TokenError::Invalid,
            })
    }
}
