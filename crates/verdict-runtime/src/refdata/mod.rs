//! Reference data layer
//!
//! Blocklists and classification tables consulted by the checks and mutated
//! only by refresh jobs or explicit admin action. Lookups go through a
//! short-TTL cache in front of the backing store; upserts are transactional
//! and merge on each table's natural key.

pub mod backend;
pub mod cache;
pub mod models;
mod service;

pub use backend::{MemoryReferenceBackend, PgReferenceBackend, ReferenceBackend, ReferenceTable};
pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use models::{
    AgentType, AsnRecord, AsnType, BlacklistEntry, BlacklistKind, DisposableEmailDomain,
    KnownUserAgent, TorExitNode,
};
pub use service::ReferenceData;
