/// Ephemeral Handshake State Store
///
/// TTL-keyed key/value storage for in-flight OAuth2 handshakes. Entries vanish
/// on their own once the TTL elapses; callers never delete them.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::AuthError;
use crate::clock::Clock;

#[async_trait]
pub trait EphemeralStateStore: Send + Sync {
    /// Store `value` under `key` for `ttl_seconds`
    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), AuthError>;

    /// Fetch a live entry; expired or unknown keys are `None`
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
}

/// Redis-backed store, shared by every instance that handles callbacks
#[derive(Clone)]
pub struct RedisStateStore {
    connection: MultiplexedConnection,
}

impl RedisStateStore {
    pub async fn connect(url: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        debug!("Connected handshake state store to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl EphemeralStateStore for RedisStateStore {
    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), AuthError> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Single-process store for tests and local development
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        purge(&mut entries, now)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn purge(entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) -> usize {
    let initial_count = entries.len();
    entries.retain(|_, entry| now < entry.expires_at);
    let removed = initial_count - entries.len();

    if removed > 0 {
        debug!("Purged {} expired handshake entries", removed);
    }

    removed
}

#[async_trait]
impl EphemeralStateStore for MemoryStateStore {
    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), AuthError> {
        let ttl = i64::try_from(ttl_seconds)
            .map_err(|_| AuthError::StateStore(format!("ttl out of range: {}", ttl_seconds)))?;
        let now = self.clock.now();
        let expires_at = Duration::try_seconds(ttl)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::StateStore(format!("ttl out of range: {}", ttl_seconds)))?;

        // Expired entries are swept on every write
        let mut entries = self.entries.write().await;
        purge(&mut entries, now);
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        Ok(entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone()))
    }
}
