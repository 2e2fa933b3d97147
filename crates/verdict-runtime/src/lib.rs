//! VERDICT Runtime - Risk evaluation engine
//!
//! This crate provides the evaluation engine behind the VERDICT service:
//! - Keyed hashing and reversible encryption of sensitive input
//! - The IP/CIDR toolkit and reference data layer
//! - Velocity counters
//! - The six signal checks, weighted scorer and decision mapper
//! - The evaluator orchestrating one request
//! - The data-source refresh pipeline

pub mod audit;
pub mod checks;
pub mod collab;
pub mod config;
pub mod crypto;
pub mod error;
pub mod evaluator;
pub mod net;
pub mod phone;
pub mod refdata;
pub mod refresh;
pub mod scorer;
pub mod velocity;

// Re-export main types
pub use audit::{AuditStore, MemoryAuditStore, PgAuditStore};
pub use checks::{registry, Check, CheckContext};
pub use config::EngineConfig;
pub use crypto::{FieldHasher, SensitiveVault};
pub use error::{Result, RuntimeError};
pub use evaluator::Evaluator;
pub use refdata::{
    CacheStore, MemoryCache, MemoryReferenceBackend, PgReferenceBackend, RedisCache,
    ReferenceBackend, ReferenceData,
};
pub use refresh::{
    FeedFetcher, HttpFeedFetcher, MockFeedFetcher, RefreshReport, RefreshService, RefreshSource,
    SourceOutcome,
};
pub use scorer::RiskScorer;
pub use velocity::{MemoryVelocityStore, RedisVelocityStore, VelocityStore};
