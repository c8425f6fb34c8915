use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use subtle::ConstantTimeEq;
use tokio::{sync::Mutex, time::Instant};

use super::{Cache, Counter};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.live(now));
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|entry| entry.live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).is_some_and(|entry| entry.live(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let matched = entries
            .get(key)
            .is_some_and(|entry| {
                entry.live(now) && bool::from(entry.value.as_bytes().ct_eq(expected.as_bytes()))
            });
        if matched {
            entries.remove(key);
        }
        Ok(matched)
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<Counter> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if !entry.live(now) {
                    entry.value = "0".to_string();
                    entry.expires_at = now + window;
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: now + window,
            });
        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| anyhow!("counter {key} holds a non-numeric value"))?
            + 1;
        entry.value = count.to_string();
        Ok(Counter {
            count,
            reset_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
