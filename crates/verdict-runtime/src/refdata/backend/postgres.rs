//! PostgreSQL reference backend

use super::{ReferenceBackend, ReferenceTable};
use crate::error::{Result, RuntimeError};
use crate::net::Cidr;
use crate::refdata::models::{
    AgentType, AsnRecord, AsnType, BlacklistEntry, BlacklistKind, DisposableEmailDomain,
    KnownUserAgent, TorExitNode,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::net::IpAddr;

/// PostgreSQL-backed reference store.
///
/// All natural keys are primary keys, so upserts are `ON CONFLICT ... DO
/// UPDATE` and every batch runs inside one transaction.
pub struct PgReferenceBackend {
    pool: PgPool,
}

impl PgReferenceBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn tor_node_from_row(row: &PgRow) -> TorExitNode {
        TorExitNode {
            ip_address: row.get("ip_address"),
            ip_version: row.get("ip_version"),
            node_id: row.get("node_id"),
            nickname: row.get("nickname"),
            is_active: row.get("is_active"),
            last_seen_at: row.get("last_seen_at"),
            risk_weight: row.get("risk_weight"),
        }
    }

    fn asn_from_row(row: &PgRow) -> Result<AsnRecord> {
        let asn_type: String = row.get("asn_type");
        let ip_ranges: serde_json::Value = row.get("ip_ranges");
        let ip_ranges: Vec<String> = serde_json::from_value(ip_ranges)
            .map_err(|e| RuntimeError::Store(format!("bad ip_ranges column: {}", e)))?;

        Ok(AsnRecord {
            asn: row.get("asn"),
            organization: row.get("organization"),
            country_code: row.get("country_code"),
            asn_type: AsnType::parse(&asn_type),
            is_hosting: row.get("is_hosting"),
            is_vpn: row.get("is_vpn"),
            is_proxy: row.get("is_proxy"),
            ip_ranges,
            risk_weight: row.get("risk_weight"),
            is_active: row.get("is_active"),
        })
    }
}

#[async_trait::async_trait]
impl ReferenceBackend for PgReferenceBackend {
    async fn tor_node(&self, ip: &str) -> Result<Option<TorExitNode>> {
        let row = sqlx::query(
            "SELECT ip_address, ip_version, node_id, nickname, is_active, last_seen_at, risk_weight \
             FROM tor_exit_nodes WHERE ip_address = $1",
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::tor_node_from_row))
    }

    async fn disposable_domain(&self, domain: &str) -> Result<Option<DisposableEmailDomain>> {
        let row = sqlx::query(
            "SELECT domain, source, risk_weight, is_active \
             FROM disposable_email_domains WHERE domain = $1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DisposableEmailDomain {
            domain: r.get("domain"),
            source: r.get("source"),
            risk_weight: r.get("risk_weight"),
            is_active: r.get("is_active"),
        }))
    }

    async fn asn(&self, asn: i64) -> Result<Option<AsnRecord>> {
        let row = sqlx::query(
            "SELECT asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, \
                    ip_ranges, risk_weight, is_active \
             FROM asns WHERE asn = $1",
        )
        .bind(asn)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::asn_from_row).transpose()
    }

    async fn asn_for_ip(&self, ip: &IpAddr) -> Result<Option<AsnRecord>> {
        // Range-bearing rows are rare relative to the table; fetch them and
        // scan with the CIDR toolkit.
        let rows = sqlx::query(
            "SELECT asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, \
                    ip_ranges, risk_weight, is_active \
             FROM asns WHERE is_active AND jsonb_array_length(ip_ranges) > 0",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let record = Self::asn_from_row(row)?;
            for range in &record.ip_ranges {
                if let Ok(cidr) = Cidr::parse(range) {
                    if cidr.contains(ip) {
                        return Ok(Some(record));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn known_user_agent(&self, ua_hash: &str) -> Result<Option<KnownUserAgent>> {
        let row = sqlx::query(
            "SELECT user_agent_hash, agent_type, name, version, risk_weight, is_outdated, \
                    eol_date, is_active \
             FROM known_user_agents WHERE user_agent_hash = $1",
        )
        .bind(ua_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let agent_type: String = r.get("agent_type");
            KnownUserAgent {
                user_agent_hash: r.get("user_agent_hash"),
                agent_type: AgentType::parse(&agent_type),
                name: r.get("name"),
                version: r.get("version"),
                risk_weight: r.get("risk_weight"),
                is_outdated: r.get("is_outdated"),
                eol_date: r.get("eol_date"),
                is_active: r.get("is_active"),
            }
        }))
    }

    async fn blacklist_entry(
        &self,
        kind: BlacklistKind,
        value_hash: &str,
    ) -> Result<Option<BlacklistEntry>> {
        let query = format!(
            "SELECT value_hash, reason, risk_weight, report_count, last_seen_at \
             FROM {} WHERE value_hash = $1",
            kind.table_name()
        );

        let row = sqlx::query(&query)
            .bind(value_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| BlacklistEntry {
            value_hash: r.get("value_hash"),
            kind,
            reason: r.get("reason"),
            risk_weight: r.get("risk_weight"),
            report_count: r.get("report_count"),
            last_seen_at: r.get("last_seen_at"),
        }))
    }

    async fn upsert_tor_nodes(&self, batch: &[TorExitNode]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for node in batch {
            sqlx::query(
                "INSERT INTO tor_exit_nodes \
                     (ip_address, ip_version, node_id, nickname, is_active, last_seen_at, \
                      risk_weight, updated_at) \
                 VALUES ($1, $2, $3, $4, TRUE, NOW(), $5, NOW()) \
                 ON CONFLICT (ip_address) DO UPDATE SET \
                     ip_version = EXCLUDED.ip_version, \
                     node_id = COALESCE(EXCLUDED.node_id, tor_exit_nodes.node_id), \
                     nickname = COALESCE(EXCLUDED.nickname, tor_exit_nodes.nickname), \
                     is_active = TRUE, \
                     last_seen_at = NOW(), \
                     risk_weight = EXCLUDED.risk_weight, \
                     updated_at = NOW()",
            )
            .bind(&node.ip_address)
            .bind(node.ip_version)
            .bind(node.node_id.as_deref())
            .bind(node.nickname.as_deref())
            .bind(node.risk_weight)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len() as u64)
    }

    async fn upsert_disposable_domains(&self, batch: &[DisposableEmailDomain]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in batch {
            sqlx::query(
                "INSERT INTO disposable_email_domains \
                     (domain, source, risk_weight, is_active, updated_at) \
                 VALUES ($1, $2, $3, TRUE, NOW()) \
                 ON CONFLICT (domain) DO UPDATE SET \
                     source = EXCLUDED.source, \
                     risk_weight = EXCLUDED.risk_weight, \
                     is_active = TRUE, \
                     updated_at = NOW()",
            )
            .bind(&row.domain)
            .bind(&row.source)
            .bind(row.risk_weight)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len() as u64)
    }

    async fn upsert_asns(&self, batch: &[AsnRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in batch {
            let ip_ranges = serde_json::to_value(&row.ip_ranges)
                .map_err(|e| RuntimeError::Store(format!("serialize ip_ranges: {}", e)))?;

            sqlx::query(
                "INSERT INTO asns \
                     (asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, \
                      ip_ranges, risk_weight, is_active, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, NOW()) \
                 ON CONFLICT (asn) DO UPDATE SET \
                     organization = EXCLUDED.organization, \
                     country_code = EXCLUDED.country_code, \
                     asn_type = EXCLUDED.asn_type, \
                     is_hosting = EXCLUDED.is_hosting, \
                     is_vpn = EXCLUDED.is_vpn, \
                     is_proxy = EXCLUDED.is_proxy, \
                     ip_ranges = CASE WHEN jsonb_array_length(EXCLUDED.ip_ranges) > 0 \
                                      THEN EXCLUDED.ip_ranges ELSE asns.ip_ranges END, \
                     risk_weight = EXCLUDED.risk_weight, \
                     is_active = TRUE, \
                     updated_at = NOW()",
            )
            .bind(row.asn)
            .bind(&row.organization)
            .bind(row.country_code.as_deref())
            .bind(row.asn_type.as_str())
            .bind(row.is_hosting)
            .bind(row.is_vpn)
            .bind(row.is_proxy)
            .bind(ip_ranges)
            .bind(row.risk_weight)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len() as u64)
    }

    async fn upsert_known_user_agents(&self, batch: &[KnownUserAgent]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in batch {
            sqlx::query(
                "INSERT INTO known_user_agents \
                     (user_agent_hash, agent_type, name, version, risk_weight, is_outdated, \
                      eol_date, is_active, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, NOW()) \
                 ON CONFLICT (user_agent_hash) DO UPDATE SET \
                     agent_type = EXCLUDED.agent_type, \
                     name = COALESCE(EXCLUDED.name, known_user_agents.name), \
                     version = COALESCE(EXCLUDED.version, known_user_agents.version), \
                     risk_weight = EXCLUDED.risk_weight, \
                     is_outdated = EXCLUDED.is_outdated, \
                     eol_date = EXCLUDED.eol_date, \
                     is_active = TRUE, \
                     updated_at = NOW()",
            )
            .bind(&row.user_agent_hash)
            .bind(row.agent_type.as_str())
            .bind(row.name.as_deref())
            .bind(row.version.as_deref())
            .bind(row.risk_weight)
            .bind(row.is_outdated)
            .bind(row.eol_date)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len() as u64)
    }

    async fn upsert_blacklist_entries(&self, batch: &[BlacklistEntry]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in batch {
            let query = format!(
                "INSERT INTO {} (value_hash, reason, risk_weight, report_count, last_seen_at, updated_at) \
                 VALUES ($1, $2, $3, $4, NOW(), NOW()) \
                 ON CONFLICT (value_hash) DO UPDATE SET \
                     reason = COALESCE(EXCLUDED.reason, {0}.reason), \
                     risk_weight = EXCLUDED.risk_weight, \
                     report_count = {0}.report_count + EXCLUDED.report_count, \
                     last_seen_at = NOW(), \
                     updated_at = NOW()",
                row.kind.table_name()
            );

            sqlx::query(&query)
                .bind(&row.value_hash)
                .bind(row.reason.as_deref())
                .bind(row.risk_weight)
                .bind(row.report_count)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(batch.len() as u64)
    }

    async fn deactivate_all(&self, table: ReferenceTable) -> Result<u64> {
        let query = format!("UPDATE {} SET is_active = FALSE", table.name());
        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn prune_inactive(&self, table: ReferenceTable, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = format!(
            "DELETE FROM {} WHERE is_active = FALSE AND updated_at < $1",
            table.name()
        );
        let result = sqlx::query(&query).bind(cutoff).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
