use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::{future::Future, time::Duration};
use tracing::{info_span, Instrument};

use super::{Cache, Counter};

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const INCREMENT_WINDOW: &str = r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Redis-backed cache. Every command is bounded by the configured timeout.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisCache {
    /// Open a managed connection that reconnects on failure.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid redis url")?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow!("timed out connecting to redis"))?
            .context("Failed to connect to redis")?;
        Ok(Self { conn, timeout })
    }

    async fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        let span = info_span!("cache.command", db.system = "redis", db.operation = operation);
        tokio::time::timeout(self.timeout, future)
            .instrument(span)
            .await
            .map_err(|_| anyhow!("redis {operation} timed out after {:?}", self.timeout))?
            .with_context(|| format!("redis {operation} failed"))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.run("GET", async move {
            redis::cmd("GET").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        self.run("SET", async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(millis(ttl))
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .run("SET", async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .run("DEL", async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: u64 = self
            .run("EXISTS", async move {
                redis::cmd("EXISTS").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(found > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let script = Script::new(COMPARE_AND_DELETE);
        let removed: u64 = self
            .run("EVALSHA", async move {
                script.key(key).arg(expected).invoke_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<Counter> {
        let mut conn = self.conn.clone();
        let script = Script::new(INCREMENT_WINDOW);
        let window_ms = millis(window);
        let (count, ttl_ms): (u64, u64) = self
            .run("EVALSHA", async move {
                script.key(key).arg(window_ms).invoke_async(&mut conn).await
            })
            .await?;
        Ok(Counter {
            count,
            reset_in: Duration::from_millis(ttl_ms),
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
