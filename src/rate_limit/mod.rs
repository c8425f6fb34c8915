//! Fixed-window rate limiting backed by the shared cache.
//!
//! Counters live under `ratelimit:<key>`, so every replica sharing the cache
//! shares the budget. Key derivation and the exceed policy are kept here,
//! independent of the HTTP layer that applies them.

use anyhow::Result;
use async_trait::async_trait;
use axum::http::Method;
use chrono::Utc;
use std::{sync::Arc, time::Duration};

use crate::cache::Cache;

const DEFAULT_LIMIT: u64 = 60;
const DEFAULT_PERIOD_SECONDS: u64 = 60;
const CRITICAL_LIMIT: u64 = 3;
const CRITICAL_PERIOD_SECONDS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketKind {
    Default,
    Critical,
}

impl BucketKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    pub limit: u64,
    pub period: Duration,
}

impl Rate {
    #[must_use]
    pub const fn new(limit: u64, period_seconds: u64) -> Self {
        Self {
            limit,
            period: Duration::from_secs(period_seconds),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    default: Rate,
    critical: Rate,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default: Rate::new(DEFAULT_LIMIT, DEFAULT_PERIOD_SECONDS),
            critical: Rate::new(CRITICAL_LIMIT, CRITICAL_PERIOD_SECONDS),
        }
    }

    #[must_use]
    pub const fn with_default(mut self, limit: u64, period_seconds: u64) -> Self {
        self.default = Rate::new(limit, period_seconds);
        self
    }

    #[must_use]
    pub const fn with_critical(mut self, limit: u64, period_seconds: u64) -> Self {
        self.critical = Rate::new(limit, period_seconds);
        self
    }

    #[must_use]
    pub const fn rate(&self, bucket: BucketKind) -> Rate {
        match bucket {
            BucketKind::Default => self.default,
            BucketKind::Critical => self.critical,
        }
    }
}

/// Result of counting one request against a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at: i64,
    pub exceeded: bool,
}

/// How a route derives its limiter key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Per mobile number from the request body, falling back to the client ip.
    SendOtp,
    /// Per client ip, namespaced for OTP verification.
    VerifyOtp,
    /// Per client ip within the bucket's namespace.
    ClientIp,
}

/// Build the limiter key for a request.
#[must_use]
pub fn derive_key(
    strategy: KeyStrategy,
    bucket: BucketKind,
    mobile: Option<&str>,
    ip: &str,
) -> String {
    match strategy {
        KeyStrategy::SendOtp => match mobile.map(str::trim).filter(|m| !m.is_empty()) {
            Some(mobile) => format!("otp-{mobile}"),
            None => format!("otp-ip-{ip}"),
        },
        KeyStrategy::VerifyOtp => format!("verify-otp-{ip}"),
        KeyStrategy::ClientIp => format!("{}-{ip}", bucket.as_str()),
    }
}

/// What to do with a request once its bucket is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceedAction {
    /// Let it through and log.
    SoftAllow,
    /// Reject with 429.
    Block,
}

/// Reads and deletes are soft-allowed; writes are blocked.
#[must_use]
pub fn exceed_action(method: &Method) -> ExceedAction {
    if *method == Method::POST || *method == Method::PUT || *method == Method::PATCH {
        ExceedAction::Block
    } else {
        ExceedAction::SoftAllow
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key` against `bucket`.
    async fn hit(&self, bucket: BucketKind, key: &str) -> Result<Quota>;
}

#[derive(Clone)]
pub struct CacheRateLimiter {
    cache: Arc<dyn Cache>,
    config: RateLimitConfig,
}

impl CacheRateLimiter {
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }
}

#[async_trait]
impl RateLimiter for CacheRateLimiter {
    async fn hit(&self, bucket: BucketKind, key: &str) -> Result<Quota> {
        let rate = self.config.rate(bucket);
        let counter = self
            .cache
            .increment(&format!("ratelimit:{key}"), rate.period)
            .await?;
        let reset_in = i64::try_from(counter.reset_in.as_secs()).unwrap_or(i64::MAX);
        Ok(Quota {
            limit: rate.limit,
            remaining: rate.limit.saturating_sub(counter.count),
            reset_at: Utc::now().timestamp().saturating_add(reset_in),
            exceeded: counter.count > rate.limit,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn hit(&self, _bucket: BucketKind, _key: &str) -> Result<Quota> {
        Ok(Quota {
            limit: u64::MAX,
            remaining: u64::MAX,
            reset_at: Utc::now().timestamp(),
            exceeded: false,
        })
    }
}
