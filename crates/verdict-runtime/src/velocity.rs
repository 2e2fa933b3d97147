//! Velocity counters
//!
//! Short-window per-key counters keyed by `(kind, keyed-hash, window)`.
//! Atomic increment with a TTL equal to the window length; no eviction logic
//! beyond TTL. The contract is identical whether the store is in-process or
//! external, so single-node deployments can skip Redis entirely.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use verdict_core::Window;

/// Velocity counter store
#[async_trait]
pub trait VelocityStore: Send + Sync {
    /// Atomically increment the counter for `(kind, key, window)` and return
    /// the post-increment value. The first write in a window arms a TTL of
    /// the window length.
    async fn bump(&self, kind: &str, key: &str, window: Window) -> Result<u64>;
}

fn counter_key(kind: &str, key: &str, window: Window) -> String {
    format!("vel:{}:{}:{}", kind, window.as_str(), key)
}

struct Counter {
    count: u64,
    expires_at: Instant,
}

/// In-process counter store
#[derive(Default)]
pub struct MemoryVelocityStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryVelocityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VelocityStore for MemoryVelocityStore {
    async fn bump(&self, kind: &str, key: &str, window: Window) -> Result<u64> {
        let full_key = counter_key(kind, key, window);
        let mut counters = self.counters.lock().await;
        let now = Instant::now();

        let counter = counters.entry(full_key).or_insert_with(|| Counter {
            count: 0,
            expires_at: now + Duration::from_secs(window.seconds()),
        });

        if counter.expires_at <= now {
            counter.count = 0;
            counter.expires_at = now + Duration::from_secs(window.seconds());
        }

        counter.count += 1;
        Ok(counter.count)
    }
}

/// Redis-backed counter store
pub struct RedisVelocityStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisVelocityStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl VelocityStore for RedisVelocityStore {
    async fn bump(&self, kind: &str, key: &str, window: Window) -> Result<u64> {
        let full_key = counter_key(kind, key, window);
        let mut conn = self.conn.clone();

        let count: u64 = redis::cmd("INCR")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RuntimeError::Velocity(e.to_string()))?;

        // TTL is armed only on the first write of the window; NX keeps
        // concurrent bumpers from extending it.
        redis::cmd("EXPIRE")
            .arg(&full_key)
            .arg(window.seconds())
            .arg("NX")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| RuntimeError::Velocity(e.to_string()))?;

        Ok(count)
    }
}
