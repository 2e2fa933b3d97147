//! Short-TTL cache in front of the reference store
//!
//! Entries are serialized JSON strings so the same trait covers the
//! in-process map and Redis. Staleness up to the configured TTL is
//! acceptable; ground truth lives in the relational store.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache store trait
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a cached value; expired entries are misses
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

/// Expired entries are swept opportunistically once the map grows past this
const SWEEP_THRESHOLD: usize = 4096;

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.len() >= SWEEP_THRESHOLD {
            let now = Instant::now();
            entries.retain(|_, e| e.expires_at > now);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }
}

/// Redis-backed cache for multi-node deployments
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RuntimeError::Cache(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| RuntimeError::Cache(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();

        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();

        cache.set("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_overwrite() {
        let cache = MemoryCache::new();

        cache.set("k", "v1", 60).await.unwrap();
        cache.set("k", "v2", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v2".to_string()));
    }
}
