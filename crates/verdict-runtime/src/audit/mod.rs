//! Audit records
//!
//! One record per evaluation: created pending inside the evaluation's
//! transaction, finalized in the same transaction on completion. Sensitive
//! fields are stored as keyed hashes (for correlation and reputation) plus
//! reversible ciphertexts (for operator disclosure); plaintext never reaches
//! the store. Records older than the retention window are deleted by the
//! cleanup job.

mod memory;
mod postgres;

pub use memory::MemoryAuditStore;
pub use postgres::PgAuditStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verdict_core::Decision;

/// Audit record lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Completed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Completed => "completed",
        }
    }
}

/// Audit record as inserted at the start of an evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,

    pub email_hash: Option<String>,
    pub email_cipher: Option<String>,
    pub ip_hash: Option<String>,
    pub ip_cipher: Option<String>,
    pub card_hash: Option<String>,
    pub card_cipher: Option<String>,
    pub phone_hash: Option<String>,
    pub phone_cipher: Option<String>,

    pub user_agent: Option<String>,
    pub domain: Option<String>,

    /// Selected request headers as JSON
    pub headers: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

/// Fields written when an evaluation completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCompletion {
    pub risk_score: i16,
    pub check_results: serde_json::Value,
    pub failed_checks: Vec<String>,
    pub passed_checks: Vec<String>,
    pub decision: Decision,
    pub processing_time_ms: i64,
}

/// Key for historical reputation lookups
#[derive(Debug, Clone)]
pub enum ReputationKey {
    /// Keyed hash of an email address
    EmailHash(String),
    /// Plain lowercased domain
    Domain(String),
}

/// Aggregate over a key's completed evaluations in a window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReputationSummary {
    pub evaluations: i64,
    pub avg_score: f64,
    pub block_count: i64,
}

/// Transaction spanning one evaluation's audit writes
#[async_trait]
pub trait AuditTxn: Send {
    /// Insert the pending record
    async fn insert_pending(&mut self, record: &AuditRecord) -> Result<()>;

    /// Write the completion fields onto the pending record
    async fn finalize(&mut self, id: Uuid, completion: &AuditCompletion) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Audit record store
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Open a transaction for one evaluation
    async fn begin(&self) -> Result<Box<dyn AuditTxn>>;

    /// Aggregate completed evaluations for a key since `since`
    async fn reputation(
        &self,
        key: ReputationKey,
        since: DateTime<Utc>,
    ) -> Result<ReputationSummary>;

    /// Retention cleanup; returns deleted row count
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
