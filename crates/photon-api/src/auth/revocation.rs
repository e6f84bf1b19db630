//! Key-value store for revoked tokens and cached principals
//!
//! Two kinds of keys live here, each with its own expiry:
//! - `black-list:{email}` holds the most recently revoked token for a user
//! - `user:{email}` holds a serialized principal snapshot
//!
//! A failing store is reported as [`StoreError`] and never read as "absent".

use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Revocation store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("Revocation store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Remote or in-process key-value store with per-key TTL
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;
}

pub fn blacklist_key(email: &str) -> String {
    format!("black-list:{email}")
}

pub fn user_key(email: &str) -> String {
    format!("user:{email}")
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed store shared by every request task
///
/// `ConnectionManager` multiplexes one connection and reconnects on its own,
/// so cloning the store is cheap.
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisRevocationStore {
    /// Connect to Redis, giving up after `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(url = %url, "Connected to Redis revocation store");

        Ok(Self { conn, timeout })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();

        tokio::time::timeout(self.timeout, conn.get::<_, Option<Vec<u8>>>(key))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs();

        // SET EX rejects a zero expiry; an entry that is already dead is a delete
        let call = async {
            if secs == 0 {
                conn.del::<_, ()>(key).await
            } else {
                conn.set_ex::<_, _, ()>(key, value, secs).await
            }
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

// ============================================================================
// In-process
// ============================================================================

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Single-process store on top of moka, for development and tests
///
/// Entries expire individually, exactly like Redis keys with `EX`.
#[derive(Clone)]
pub struct InMemoryRevocationStore {
    cache: Cache<String, Entry>,
}

impl InMemoryRevocationStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            self.cache.invalidate(key).await;
            return Ok(());
        }

        self.cache
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }
}
