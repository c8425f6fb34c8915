//! Shared request state and its assembly from configuration.

use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

use crate::{
    api::handlers::utils::TrustedProxies,
    cache::Cache,
    error::{Error, Result},
    hash::{HashConfig, Hasher},
    otp::{LogOtpSender, OtpConfig, OtpSender, OtpService, WebhookOtpSender},
    rate_limit::{CacheRateLimiter, RateLimitConfig, RateLimiter},
    registration::{RegistrationConfig, RegistrationService},
    token::{JwtConfig, TokenIssuer, TokenRepository, TokenStore},
    users::UserRepository,
};

const OTP_WEBHOOK_TIMEOUT_SECONDS: u64 = 5;

/// Everything needed to build the services, independent of the backends.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub otp: OtpConfig,
    pub registration: RegistrationConfig,
    pub rate_limit: RateLimitConfig,
    pub otp_webhook_url: Option<Url>,
    pub trusted_proxies: TrustedProxies,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(jwt: JwtConfig, hash: HashConfig) -> Self {
        Self {
            jwt,
            hash,
            otp: OtpConfig::new(),
            registration: RegistrationConfig::new(),
            rate_limit: RateLimitConfig::new(),
            otp_webhook_url: None,
            trusted_proxies: TrustedProxies::default(),
        }
    }

    /// Delivery channel selected by `otp_webhook_url`.
    ///
    /// # Errors
    /// [`Error::Configuration`] if the webhook client cannot be built.
    pub fn otp_sender(&self) -> Result<Arc<dyn OtpSender>> {
        match &self.otp_webhook_url {
            Some(url) => {
                info!("Delivering OTP codes through webhook {url}");
                let sender =
                    WebhookOtpSender::new(url.clone(), Duration::from_secs(OTP_WEBHOOK_TIMEOUT_SECONDS))
                        .map_err(|err| Error::Configuration(format!("{err:#}")))?;
                Ok(Arc::new(sender))
            }
            None => {
                info!("No OTP webhook configured, codes are only logged");
                Ok(Arc::new(LogOtpSender))
            }
        }
    }
}

/// Handles shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    registration: Arc<RegistrationService>,
    tokens: Arc<TokenStore>,
    users: Arc<dyn UserRepository>,
    cache: Arc<dyn Cache>,
    rate_limiter: Arc<dyn RateLimiter>,
    trusted_proxies: TrustedProxies,
}

impl AppState {
    /// Wire the services on top of the given backends.
    ///
    /// # Errors
    /// [`Error::Configuration`] for invalid signing, hashing or OTP settings.
    pub fn assemble(
        config: ServiceConfig,
        cache: Arc<dyn Cache>,
        token_repo: Arc<dyn TokenRepository>,
        users: Arc<dyn UserRepository>,
        sender: Arc<dyn OtpSender>,
    ) -> Result<Self> {
        let issuer = Arc::new(TokenIssuer::new(config.jwt)?);
        let hasher =
            Hasher::new(config.hash).map_err(|err| Error::Configuration(format!("{err:#}")))?;
        let tokens = Arc::new(TokenStore::new(issuer, hasher, token_repo));
        let otp = Arc::new(OtpService::new(cache.clone(), sender, config.otp)?);
        let registration = Arc::new(RegistrationService::new(
            cache.clone(),
            otp,
            users.clone(),
            tokens.clone(),
            config.registration,
        ));
        let rate_limiter = Arc::new(CacheRateLimiter::new(cache.clone(), config.rate_limit));

        Ok(Self {
            registration,
            tokens,
            users,
            cache,
            rate_limiter,
            trusted_proxies: config.trusted_proxies,
        })
    }

    /// Replace the rate limiter, e.g. with [`crate::rate_limit::NoopRateLimiter`].
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    #[must_use]
    pub fn registration(&self) -> &RegistrationService {
        &self.registration
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    #[must_use]
    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    #[must_use]
    pub const fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted_proxies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCache,
        hash::HashDriver,
        token::MemoryTokenRepository,
        users::MemoryUserRepository,
    };
    use secrecy::SecretString;

    fn config(secret: &str) -> ServiceConfig {
        ServiceConfig::new(
            JwtConfig::new(
                SecretString::from(secret),
                "otpgate".to_string(),
                "localhost".to_string(),
            ),
            HashConfig::new(HashDriver::Sha256),
        )
    }

    fn assemble(config: ServiceConfig) -> Result<AppState> {
        AppState::assemble(
            config,
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryTokenRepository::new()),
            Arc::new(MemoryUserRepository::new()),
            Arc::new(LogOtpSender),
        )
    }

    #[test]
    fn assemble_rejects_bad_settings() {
        assert!(matches!(assemble(config("")), Err(Error::Configuration(_))));

        let mut zero_length = config("secret");
        zero_length.otp = OtpConfig::new().with_length(0);
        assert!(matches!(assemble(zero_length), Err(Error::Configuration(_))));

        let mut weak_bcrypt = config("secret");
        weak_bcrypt.hash = HashConfig::new(HashDriver::Bcrypt).with_bcrypt_cost(3);
        assert!(matches!(assemble(weak_bcrypt), Err(Error::Configuration(_))));

        assert!(assemble(config("secret")).is_ok());
    }

    #[test]
    fn webhook_url_selects_sender() -> anyhow::Result<()> {
        let mut config = config("secret");
        assert!(config.otp_sender().is_ok());
        config.otp_webhook_url = Some(Url::parse("http://127.0.0.1:9/otp")?);
        assert!(config.otp_sender().is_ok());
        Ok(())
    }
}
