//! Shared key-value store
//!
//! Narrow interface over the distributed KV that backs nonces, rate
//! counters, and the L2 cache layer. Atomic `pop` (get-and-delete) and
//! atomic `incr` are hard requirements of this interface: challenge
//! single-use and rate-limit correctness linearize on them.
//!
//! Production uses Redis; tests and dev mode use the in-memory map.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use super::error::{GatewayError, Result};

/// Narrow KV interface shared by every distributed concern.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Atomically increment the counter at `key`, creating it with `ttl`
    /// on first increment. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Atomically read and delete `key`. At most one concurrent caller
    /// observes a value.
    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
}

// ============================================================================
// Redis implementation
// ============================================================================

/// Redis-backed KV store
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::Kv(format!("redis client: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::Kv(format!("redis connect: {e}")))?;
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(kv_err)?;
        if pong != "PONG" {
            return Err(GatewayError::Kv("unexpected PING response".to_string()));
        }
        Ok(())
    }
}

fn kv_err(e: redis::RedisError) -> GatewayError {
    GatewayError::Kv(e.to_string())
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(kv_err)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(kv_err)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del(key).await.map_err(kv_err)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = conn.incr(key, 1).await.map_err(kv_err)?;
        if count == 1 {
            let _: () = conn
                .expire(key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(kv_err)?;
        }
        Ok(count)
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(kv_err)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        conn.mget(keys).await.map_err(kv_err)
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

/// In-memory KV store for tests and single-node dev mode.
///
/// Atomicity of `pop` and `incr` comes from holding the map's write lock
/// across the whole operation.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(e) if e.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.write().await;

        let current = match entries.get(key) {
            Some(e) if !e.expired() => std::str::from_utf8(&e.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| GatewayError::Kv("counter is not an integer".to_string()))?,
            _ => 0,
        };

        let next = current + 1;
        let expires_at = if current == 0 {
            Some(Instant::now() + ttl)
        } else {
            entries.get(key).and_then(|e| e.expires_at)
        };

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(e) if e.expired() => Ok(None),
            Some(e) => Ok(Some(e.value)),
            None => Ok(None),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
