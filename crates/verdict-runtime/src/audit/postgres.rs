//! PostgreSQL audit store

use super::{
    AuditCompletion, AuditRecord, AuditStore, AuditTxn, ReputationKey, ReputationSummary,
};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed audit store over the `fraud_checks` table
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AuditTxn for PgTxn {
    async fn insert_pending(&mut self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO fraud_checks \
                 (id, user_id, api_key_id, email_hash, email_cipher, ip_hash, ip_cipher, \
                  card_hash, card_cipher, phone_hash, phone_cipher, user_agent, domain, \
                  headers, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                     'pending', $15)",
        )
        .bind(record.id)
        .bind(record.user_id.as_deref())
        .bind(record.api_key_id.as_deref())
        .bind(record.email_hash.as_deref())
        .bind(record.email_cipher.as_deref())
        .bind(record.ip_hash.as_deref())
        .bind(record.ip_cipher.as_deref())
        .bind(record.card_hash.as_deref())
        .bind(record.card_cipher.as_deref())
        .bind(record.phone_hash.as_deref())
        .bind(record.phone_cipher.as_deref())
        .bind(record.user_agent.as_deref())
        .bind(record.domain.as_deref())
        .bind(&record.headers)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn finalize(&mut self, id: Uuid, completion: &AuditCompletion) -> Result<()> {
        let failed = serde_json::to_value(&completion.failed_checks)
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        let passed = serde_json::to_value(&completion.passed_checks)
            .map_err(|e| RuntimeError::Store(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE fraud_checks SET \
                 risk_score = $2, \
                 check_results = $3, \
                 failed_checks = $4, \
                 passed_checks = $5, \
                 decision = $6, \
                 processing_time_ms = $7, \
                 status = 'completed' \
             WHERE id = $1",
        )
        .bind(id)
        .bind(completion.risk_score)
        .bind(&completion.check_results)
        .bind(failed)
        .bind(passed)
        .bind(completion.decision.as_str())
        .bind(completion.processing_time_ms)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RuntimeError::Store(format!("no pending record {}", id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn begin(&self) -> Result<Box<dyn AuditTxn>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTxn { tx }))
    }

    async fn reputation(
        &self,
        key: ReputationKey,
        since: DateTime<Utc>,
    ) -> Result<ReputationSummary> {
        let (column, value) = match &key {
            ReputationKey::EmailHash(hash) => ("email_hash", hash.as_str()),
            ReputationKey::Domain(domain) => ("domain", domain.as_str()),
        };

        let query = format!(
            "SELECT COUNT(*) AS evaluations, \
                    COALESCE(AVG(risk_score), 0)::float8 AS avg_score, \
                    COUNT(*) FILTER (WHERE decision = 'block') AS block_count \
             FROM fraud_checks \
             WHERE {} = $1 AND status = 'completed' AND created_at >= $2",
            column
        );

        let row = sqlx::query(&query)
            .bind(value)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(ReputationSummary {
            evaluations: row.get("evaluations"),
            avg_score: row.get("avg_score"),
            block_count: row.get("block_count"),
        })
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fraud_checks WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
