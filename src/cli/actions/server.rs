use crate::{
    api::{self, ServiceConfig, TrustedProxies},
    cli::{
        commands::{auth, hash, rate_limit},
        telemetry,
    },
    hash::{HashConfig, HashDriver},
    otp::OtpConfig,
    rate_limit::RateLimitConfig,
    registration::{RegistrationConfig, SessionPolicy},
    token::{jwt::parse_algorithm, JwtConfig},
};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub cache_url: String,
    pub cache_timeout_seconds: u64,
    pub trusted_proxies: Option<String>,
    pub auth: auth::Options,
    pub hash: hash::Options,
    pub rate_limit: rate_limit::Options,
}

impl Args {
    /// Turn the parsed options into the typed service configuration.
    ///
    /// # Errors
    /// Returns an error for an unknown algorithm, hash driver or session policy,
    /// or an unparsable webhook URL or proxy address.
    pub fn service_config(&self) -> Result<ServiceConfig> {
        let auth = &self.auth;
        let algorithm = parse_algorithm(&auth.jwt_algorithm)?;
        let jwt = JwtConfig::new(
            auth.jwt_secret.clone(),
            auth.jwt_issuer.clone(),
            auth.jwt_audience.clone(),
        )
        .with_algorithm(algorithm)
        .with_access_ttl_seconds(auth.access_token_ttl_seconds)
        .with_refresh_ttl_seconds(auth.refresh_token_ttl_seconds);

        let hash = &self.hash;
        let driver: HashDriver = hash.driver.parse()?;
        let hash_config = HashConfig::new(driver)
            .with_argon2(
                hash.argon2_memory_kib,
                hash.argon2_iterations,
                hash.argon2_parallelism,
            )
            .with_pbkdf2_iterations(hash.pbkdf2_iterations)
            .with_bcrypt_cost(hash.bcrypt_cost)
            .with_scrypt(hash.scrypt_log_n, hash.scrypt_r, hash.scrypt_p);

        let policy: SessionPolicy = auth.registration_session_policy.parse()?;
        let otp_webhook_url = auth
            .otp_webhook_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("invalid OTPGATE_OTP_WEBHOOK_URL")?;
        let trusted_proxies = self
            .trusted_proxies
            .as_deref()
            .map(str::parse::<TrustedProxies>)
            .transpose()
            .context("invalid OTPGATE_TRUSTED_PROXIES")?
            .unwrap_or_default();

        let mut config = ServiceConfig::new(jwt, hash_config);
        config.otp = OtpConfig::new()
            .with_length(auth.otp_length)
            .with_ttl_seconds(auth.otp_ttl_seconds);
        config.registration = RegistrationConfig::new()
            .with_session_ttl_seconds(auth.registration_session_ttl_seconds)
            .with_policy(policy);
        config.rate_limit = RateLimitConfig::new()
            .with_default(
                self.rate_limit.default_limit,
                self.rate_limit.default_period_seconds,
            )
            .with_critical(
                self.rate_limit.critical_limit,
                self.rate_limit.critical_period_seconds,
            );
        config.otp_webhook_url = otp_webhook_url;
        config.trusted_proxies = trusted_proxies;

        Ok(config)
    }
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        cache_timeout_seconds = args.cache_timeout_seconds,
        hash_driver = %args.hash.driver,
        jwt_algorithm = %args.auth.jwt_algorithm,
        registration_session_policy = %args.auth.registration_session_policy,
        "Startup arguments"
    );
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = args.service_config()?;
    info!(
        "Starting {} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );

    let result = api::new(
        args.port,
        args.dsn,
        args.cache_url,
        Duration::from_secs(args.cache_timeout_seconds),
        config,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
