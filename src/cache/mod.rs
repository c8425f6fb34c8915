//! Shared key-value cache used for OTP records, registration sessions and
//! rate-limit counters.
//!
//! `redis://` and `rediss://` URLs connect to Redis; `memory://` selects a
//! single-process store intended for development and tests.

mod memory;
mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Result of bumping a fixed-window counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    /// Time left until the window resets.
    pub reset_in: Duration,
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Store `value` only if `key` is absent. Returns `false` when a live value exists.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically delete `key` if and only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Increment a counter, starting a new `window` when the key is absent.
    async fn increment(&self, key: &str, window: Duration) -> Result<Counter>;

    async fn ping(&self) -> Result<()>;
}

/// Connect to the cache named by `url`.
///
/// # Errors
/// Returns an error for unsupported schemes or if Redis cannot be reached.
pub async fn connect(url: &str, timeout: Duration) -> Result<Arc<dyn Cache>> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(MemoryCache::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisCache::connect(url, timeout).await?));
    }
    Err(anyhow!("unsupported cache url scheme: {url}"))
}
