//! Single-use numeric codes bound to a mobile number.
//!
//! A code lives in the shared cache under `otp-<mobile>` until it is consumed
//! or its TTL lapses. While it is live, new requests for the same number are
//! rejected, and only an exact match consumes it. The cache holds a SHA-256
//! digest of the code, never the code itself.

mod sender;

pub use sender::{LogOtpSender, OtpSender, WebhookOtpSender};

use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

use crate::{
    cache::Cache,
    error::{Error, Result},
};

const DEFAULT_CODE_LENGTH: usize = 5;
const DEFAULT_TTL_SECONDS: u64 = 120;

#[derive(Clone, Copy, Debug)]
pub struct OtpConfig {
    length: usize,
    ttl: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OtpConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
        }
    }

    #[must_use]
    pub const fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    #[must_use]
    pub const fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Cache key holding the live code for `mobile`.
#[must_use]
pub fn otp_key(mobile: &str) -> String {
    format!("otp-{mobile}")
}

/// Cached form of a code.
#[must_use]
pub fn code_digest(code: &str) -> String {
    Base64::encode_string(&Sha256::digest(code.as_bytes()))
}

fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub struct OtpService {
    cache: Arc<dyn Cache>,
    sender: Arc<dyn OtpSender>,
    config: OtpConfig,
}

impl OtpService {
    /// # Errors
    /// Returns a configuration error for a zero-length code or a zero TTL.
    pub fn new(cache: Arc<dyn Cache>, sender: Arc<dyn OtpSender>, config: OtpConfig) -> Result<Self> {
        if config.length == 0 {
            return Err(Error::Configuration("otp length must be at least 1".to_string()));
        }
        if config.ttl.is_zero() {
            return Err(Error::Configuration("otp ttl must be positive".to_string()));
        }
        Ok(Self {
            cache,
            sender,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a code for `mobile` and hand it to the delivery channel.
    ///
    /// # Errors
    /// [`Error::OtpExists`] while a previous code is live,
    /// [`Error::FailedToSendOtp`] if delivery fails, [`Error::Transient`] on cache failure.
    #[instrument(skip(self))]
    pub async fn request_otp(&self, mobile: &str) -> Result<()> {
        let key = otp_key(mobile);
        let code = generate_code(self.config.length);
        let digest = code_digest(&code);

        let reserved = self
            .cache
            .set_if_absent(&key, &digest, self.config.ttl)
            .await
            .map_err(Error::Transient)?;
        if !reserved {
            debug!("otp already issued and still live");
            return Err(Error::OtpExists);
        }

        if let Err(err) = self.sender.send(mobile, &code).await {
            if let Err(cleanup) = self.cache.compare_and_delete(&key, &digest).await {
                warn!("Failed to release otp reservation after delivery failure: {cleanup:#}");
            }
            return Err(Error::FailedToSendOtp(err));
        }

        Ok(())
    }

    /// Consume the live code for `mobile` if `code` matches it.
    ///
    /// Returns `Ok(false)` when there is no live code or it differs; a wrong
    /// guess leaves the live code untouched.
    ///
    /// # Errors
    /// [`Error::Transient`] on cache failure.
    #[instrument(skip(self, code))]
    pub async fn verify_otp(&self, mobile: &str, code: &str) -> Result<bool> {
        if code.is_empty() {
            return Ok(false);
        }
        self.cache
            .compare_and_delete(&otp_key(mobile), &code_digest(code))
            .await
            .map_err(Error::Transient)
    }
}
