//! Two-phase OTP registration.
//!
//! `send_otp` validates the request, parks it in the cache under a random
//! session key and issues a code to the mobile number. `verify_otp` exchanges
//! the session key and code for a token pair, creating the user on first use.
//!
//! A missing, expired or malformed session is reported as
//! [`Error::NotFound`] in every case so callers cannot probe for live keys.

pub mod validation;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    cache::Cache,
    error::{Error, Result},
    otp::OtpService,
    token::{ClientInfo, CredentialPair, Owner, TokenStore},
    users::{CreateUserOutcome, NewUser, User, UserRepository},
};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 120;
const SESSION_KEY_PREFIX: &str = "register-";

/// What happens to a pending session after a wrong code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Keep the session; the caller may retry with the right code until it expires.
    #[default]
    Reusable,
    /// Drop the session; the caller must start over with `send_otp`.
    SingleAttempt,
}

impl SessionPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reusable => "reusable",
            Self::SingleAttempt => "single-attempt",
        }
    }
}

impl fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reusable" => Ok(Self::Reusable),
            "single-attempt" => Ok(Self::SingleAttempt),
            other => Err(anyhow::anyhow!("unknown registration session policy: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RegistrationConfig {
    session_ttl: Duration,
    policy: SessionPolicy,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            policy: SessionPolicy::Reusable,
        }
    }

    #[must_use]
    pub const fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub const fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegisterRequest {
    #[schema(example = "09123456789")]
    pub mobile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "0499370899")]
    pub national_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug)]
pub struct VerifyRegisterRequest {
    pub key: String,
    #[schema(example = "48291")]
    pub otp: String,
}

fn session_key(key: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{key}")
}

pub struct RegistrationService {
    cache: Arc<dyn Cache>,
    otp: Arc<OtpService>,
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenStore>,
    config: RegistrationConfig,
}

impl RegistrationService {
    #[must_use]
    pub fn new(
        cache: Arc<dyn Cache>,
        otp: Arc<OtpService>,
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenStore>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            cache,
            otp,
            users,
            tokens,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Start a registration and send a code. Returns the opaque session key.
    ///
    /// # Errors
    /// [`Error::Validation`] for malformed input, [`Error::OtpExists`] while a
    /// code for the number is live, [`Error::FailedToSendOtp`] or
    /// [`Error::Transient`] on delivery or cache failure.
    #[instrument(skip(self, request), fields(mobile = %request.mobile))]
    pub async fn send_otp(&self, request: RegisterRequest) -> Result<String> {
        let errors = validation::validate(&request.mobile, request.national_id.as_deref());
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }
        let request = RegisterRequest {
            mobile: request.mobile.trim().to_string(),
            national_id: request
                .national_id
                .as_deref()
                .map(validation::normalize_national_id),
        };

        let payload = serde_json::to_string(&request)
            .map_err(|err| Error::Transient(anyhow::Error::new(err)))?;
        let key = Uuid::new_v4().to_string();
        self.cache
            .set(&session_key(&key), &payload, self.config.session_ttl)
            .await
            .map_err(Error::Transient)?;

        if let Err(err) = self.otp.request_otp(&request.mobile).await {
            if let Err(cleanup) = self.cache.delete(&session_key(&key)).await {
                warn!("Failed to remove registration session after otp failure: {cleanup:#}");
            }
            return Err(err);
        }

        Ok(key)
    }

    async fn load_session(&self, key: &str) -> Result<RegisterRequest> {
        if Uuid::parse_str(key).is_err() {
            return Err(Error::NotFound);
        }
        let raw = self
            .cache
            .get(&session_key(key))
            .await
            .map_err(Error::Transient)?
            .ok_or(Error::NotFound)?;
        serde_json::from_str(&raw).map_err(|err| {
            warn!("Discarding malformed registration session: {err}");
            Error::NotFound
        })
    }

    async fn find_or_create_user(&self, request: &RegisterRequest) -> Result<User> {
        if let Some(user) = self.lookup_user(request).await? {
            return Ok(user);
        }

        let outcome = self
            .users
            .create(NewUser {
                mobile: request.mobile.clone(),
                national_id: request.national_id.clone(),
            })
            .await
            .map_err(Error::Transient)?;
        match outcome {
            CreateUserOutcome::Created(user) => Ok(user),
            // A concurrent verification may have created the same user.
            CreateUserOutcome::Conflict => {
                self.lookup_user(request).await?.ok_or(Error::UserExists)
            }
        }
    }

    async fn lookup_user(&self, request: &RegisterRequest) -> Result<Option<User>> {
        let found = match &request.national_id {
            Some(national_id) => self.users.find_by_national_id(national_id).await,
            None => self.users.find_by_mobile(&request.mobile).await,
        };
        found.map_err(Error::Transient)
    }

    /// Complete a registration and issue a token pair.
    ///
    /// # Errors
    /// [`Error::NotFound`] for an unknown, expired or consumed session,
    /// [`Error::OtpInvalid`] for a wrong code, [`Error::UserExists`] when the
    /// identity clashes with another user, [`Error::Transient`] on infrastructure failure.
    #[instrument(skip(self, code, client))]
    pub async fn verify_otp(
        &self,
        key: &str,
        code: &str,
        client: &ClientInfo,
    ) -> Result<CredentialPair> {
        let request = self.load_session(key).await?;

        if !self.otp.verify_otp(&request.mobile, code).await? {
            if self.config.policy == SessionPolicy::SingleAttempt {
                self.cache
                    .delete(&session_key(key))
                    .await
                    .map_err(Error::Transient)?;
            }
            return Err(Error::OtpInvalid);
        }

        // The code is consumed; the session must not outlive it.
        if let Err(err) = self.cache.delete(&session_key(key)).await {
            warn!("Failed to remove completed registration session: {err:#}");
        }

        let user = self.find_or_create_user(&request).await?;
        debug!(user = %user.id, "registration verified");

        let pair = self.tokens.issuer().generate()?;
        self.tokens
            .create(Owner::User(user.id), &pair, client)
            .await?;
        Ok(pair)
    }
}
