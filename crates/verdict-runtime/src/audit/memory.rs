//! In-memory audit store
//!
//! Buffered transactions: writes accumulate in the transaction and reach the
//! shared log only on commit, mirroring the relational backend's visibility.

use super::{
    AuditCompletion, AuditRecord, AuditStatus, AuditStore, AuditTxn, ReputationKey,
    ReputationSummary,
};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use verdict_core::Decision;

#[derive(Debug, Clone)]
pub(super) struct StoredRecord {
    pub record: AuditRecord,
    pub status: AuditStatus,
    pub completion: Option<AuditCompletion>,
}

/// Memory-backed audit store
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Arc<RwLock<Vec<StoredRecord>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records; test helper
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Fetch a committed record by id; test helper
    pub async fn completion_of(&self, id: Uuid) -> Option<AuditCompletion> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.record.id == id)
            .and_then(|r| r.completion.clone())
    }
}

enum TxnOp {
    Insert(AuditRecord),
    Finalize(Uuid, AuditCompletion),
}

struct MemoryTxn {
    records: Arc<RwLock<Vec<StoredRecord>>>,
    ops: Vec<TxnOp>,
}

#[async_trait]
impl AuditTxn for MemoryTxn {
    async fn insert_pending(&mut self, record: &AuditRecord) -> Result<()> {
        self.ops.push(TxnOp::Insert(record.clone()));
        Ok(())
    }

    async fn finalize(&mut self, id: Uuid, completion: &AuditCompletion) -> Result<()> {
        self.ops.push(TxnOp::Finalize(id, completion.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut records = self.records.write().await;
        for op in self.ops {
            match op {
                TxnOp::Insert(record) => records.push(StoredRecord {
                    record,
                    status: AuditStatus::Pending,
                    completion: None,
                }),
                TxnOp::Finalize(id, completion) => {
                    let stored = records
                        .iter_mut()
                        .find(|r| r.record.id == id)
                        .ok_or_else(|| {
                            RuntimeError::Store(format!("no pending record {}", id))
                        })?;
                    stored.status = AuditStatus::Completed;
                    stored.completion = Some(completion);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn begin(&self) -> Result<Box<dyn AuditTxn>> {
        Ok(Box::new(MemoryTxn {
            records: Arc::clone(&self.records),
            ops: Vec::new(),
        }))
    }

    async fn reputation(
        &self,
        key: ReputationKey,
        since: DateTime<Utc>,
    ) -> Result<ReputationSummary> {
        let records = self.records.read().await;

        let mut summary = ReputationSummary::default();
        let mut score_sum = 0i64;

        for stored in records.iter() {
            if stored.status != AuditStatus::Completed || stored.record.created_at < since {
                continue;
            }
            let matches = match &key {
                ReputationKey::EmailHash(hash) => {
                    stored.record.email_hash.as_deref() == Some(hash.as_str())
                }
                ReputationKey::Domain(domain) => {
                    stored.record.domain.as_deref() == Some(domain.as_str())
                }
            };
            if !matches {
                continue;
            }

            let Some(completion) = &stored.completion else {
                continue;
            };
            summary.evaluations += 1;
            score_sum += completion.risk_score as i64;
            if completion.decision == Decision::Block {
                summary.block_count += 1;
            }
        }

        if summary.evaluations > 0 {
            summary.avg_score = score_sum as f64 / summary.evaluations as f64;
        }
        Ok(summary)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.record.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(email_hash: Option<&str>) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            user_id: None,
            api_key_id: None,
            email_hash: email_hash.map(|s| s.to_string()),
            email_cipher: None,
            ip_hash: None,
            ip_cipher: None,
            card_hash: None,
            card_cipher: None,
            phone_hash: None,
            phone_cipher: None,
            user_agent: None,
            domain: Some("example.com".to_string()),
            headers: json!({}),
            created_at: Utc::now(),
        }
    }

    fn completion(score: i16, decision: Decision) -> AuditCompletion {
        AuditCompletion {
            risk_score: score,
            check_results: json!({}),
            failed_checks: vec![],
            passed_checks: vec![],
            decision,
            processing_time_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_commit_applies_ops() {
        let store = MemoryAuditStore::new();
        let rec = record(Some("h1"));
        let id = rec.id;

        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&rec).await.unwrap();
        txn.finalize(id, &completion(80, Decision::Block)).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.completion_of(id).await.unwrap().risk_score, 80);
    }

    #[tokio::test]
    async fn test_rollback_discards_ops() {
        let store = MemoryAuditStore::new();

        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&record(Some("h1"))).await.unwrap();
        txn.rollback().await.unwrap();

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reputation_aggregates() {
        let store = MemoryAuditStore::new();

        for (score, decision) in [(90, Decision::Block), (70, Decision::Review), (80, Decision::Block)] {
            let rec = record(Some("h1"));
            let id = rec.id;
            let mut txn = store.begin().await.unwrap();
            txn.insert_pending(&rec).await.unwrap();
            txn.finalize(id, &completion(score, decision)).await.unwrap();
            txn.commit().await.unwrap();
        }

        // A record for a different hash never counts
        let rec = record(Some("other"));
        let id = rec.id;
        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&rec).await.unwrap();
        txn.finalize(id, &completion(100, Decision::Block)).await.unwrap();
        txn.commit().await.unwrap();

        let since = Utc::now() - chrono::Duration::days(180);
        let summary = store
            .reputation(ReputationKey::EmailHash("h1".to_string()), since)
            .await
            .unwrap();

        assert_eq!(summary.evaluations, 3);
        assert_eq!(summary.block_count, 2);
        assert!((summary.avg_score - 80.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reputation_by_domain() {
        let store = MemoryAuditStore::new();
        let rec = record(None);
        let id = rec.id;
        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&rec).await.unwrap();
        txn.finalize(id, &completion(60, Decision::Review)).await.unwrap();
        txn.commit().await.unwrap();

        let since = Utc::now() - chrono::Duration::days(180);
        let summary = store
            .reputation(ReputationKey::Domain("example.com".to_string()), since)
            .await
            .unwrap();
        assert_eq!(summary.evaluations, 1);
    }

    #[tokio::test]
    async fn test_pending_records_do_not_count() {
        let store = MemoryAuditStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&record(Some("h1"))).await.unwrap();
        txn.commit().await.unwrap();

        let since = Utc::now() - chrono::Duration::days(180);
        let summary = store
            .reputation(ReputationKey::EmailHash("h1".to_string()), since)
            .await
            .unwrap();
        assert_eq!(summary.evaluations, 0);
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let store = MemoryAuditStore::new();
        let mut old = record(None);
        old.created_at = Utc::now() - chrono::Duration::days(400);
        let mut txn = store.begin().await.unwrap();
        txn.insert_pending(&old).await.unwrap();
        txn.insert_pending(&record(None)).await.unwrap();
        txn.commit().await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(365);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}
