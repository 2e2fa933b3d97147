//! In-memory reference backend
//!
//! Used for single-node deployments and tests. Rows carry the same
//! `is_active`/`updated_at` bookkeeping as the relational backend so refresh
//! semantics can be exercised without a database.

use super::{ReferenceBackend, ReferenceTable};
use crate::error::Result;
use crate::net::Cidr;
use crate::refdata::models::{
    AsnRecord, BlacklistEntry, BlacklistKind, DisposableEmailDomain, KnownUserAgent, TorExitNode,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Tracked<T> {
    row: T,
    updated_at: DateTime<Utc>,
}

impl<T> Tracked<T> {
    fn new(row: T) -> Self {
        Self {
            row,
            updated_at: Utc::now(),
        }
    }
}

/// Memory-backed reference store
#[derive(Default)]
pub struct MemoryReferenceBackend {
    tor_nodes: RwLock<HashMap<String, Tracked<TorExitNode>>>,
    disposable_domains: RwLock<HashMap<String, Tracked<DisposableEmailDomain>>>,
    asns: RwLock<HashMap<i64, Tracked<AsnRecord>>>,
    user_agents: RwLock<HashMap<String, Tracked<KnownUserAgent>>>,
    blacklists: RwLock<HashMap<(BlacklistKind, String), Tracked<BlacklistEntry>>>,
}

impl MemoryReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently active in a table; test helper
    pub async fn active_count(&self, table: ReferenceTable) -> usize {
        match table {
            ReferenceTable::TorExitNodes => self
                .tor_nodes
                .read()
                .await
                .values()
                .filter(|t| t.row.is_active)
                .count(),
            ReferenceTable::DisposableEmailDomains => self
                .disposable_domains
                .read()
                .await
                .values()
                .filter(|t| t.row.is_active)
                .count(),
            ReferenceTable::Asns => self
                .asns
                .read()
                .await
                .values()
                .filter(|t| t.row.is_active)
                .count(),
            ReferenceTable::KnownUserAgents => self
                .user_agents
                .read()
                .await
                .values()
                .filter(|t| t.row.is_active)
                .count(),
        }
    }
}

#[async_trait::async_trait]
impl ReferenceBackend for MemoryReferenceBackend {
    async fn tor_node(&self, ip: &str) -> Result<Option<TorExitNode>> {
        Ok(self.tor_nodes.read().await.get(ip).map(|t| t.row.clone()))
    }

    async fn disposable_domain(&self, domain: &str) -> Result<Option<DisposableEmailDomain>> {
        Ok(self
            .disposable_domains
            .read()
            .await
            .get(domain)
            .map(|t| t.row.clone()))
    }

    async fn asn(&self, asn: i64) -> Result<Option<AsnRecord>> {
        Ok(self.asns.read().await.get(&asn).map(|t| t.row.clone()))
    }

    async fn asn_for_ip(&self, ip: &IpAddr) -> Result<Option<AsnRecord>> {
        let asns = self.asns.read().await;
        for tracked in asns.values() {
            if !tracked.row.is_active {
                continue;
            }
            for range in &tracked.row.ip_ranges {
                if let Ok(cidr) = Cidr::parse(range) {
                    if cidr.contains(ip) {
                        return Ok(Some(tracked.row.clone()));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn known_user_agent(&self, ua_hash: &str) -> Result<Option<KnownUserAgent>> {
        Ok(self
            .user_agents
            .read()
            .await
            .get(ua_hash)
            .map(|t| t.row.clone()))
    }

    async fn blacklist_entry(
        &self,
        kind: BlacklistKind,
        value_hash: &str,
    ) -> Result<Option<BlacklistEntry>> {
        Ok(self
            .blacklists
            .read()
            .await
            .get(&(kind, value_hash.to_string()))
            .map(|t| t.row.clone()))
    }

    async fn upsert_tor_nodes(&self, batch: &[TorExitNode]) -> Result<u64> {
        let mut nodes = self.tor_nodes.write().await;
        for row in batch {
            let mut row = row.clone();
            row.is_active = true;
            row.last_seen_at = Some(Utc::now());
            nodes.insert(row.ip_address.clone(), Tracked::new(row));
        }
        Ok(batch.len() as u64)
    }

    async fn upsert_disposable_domains(&self, batch: &[DisposableEmailDomain]) -> Result<u64> {
        let mut domains = self.disposable_domains.write().await;
        for row in batch {
            let mut row = row.clone();
            row.is_active = true;
            domains.insert(row.domain.clone(), Tracked::new(row));
        }
        Ok(batch.len() as u64)
    }

    async fn upsert_asns(&self, batch: &[AsnRecord]) -> Result<u64> {
        let mut asns = self.asns.write().await;
        for row in batch {
            let mut row = row.clone();
            row.is_active = true;
            asns.insert(row.asn, Tracked::new(row));
        }
        Ok(batch.len() as u64)
    }

    async fn upsert_known_user_agents(&self, batch: &[KnownUserAgent]) -> Result<u64> {
        let mut agents = self.user_agents.write().await;
        for row in batch {
            let mut row = row.clone();
            row.is_active = true;
            agents.insert(row.user_agent_hash.clone(), Tracked::new(row));
        }
        Ok(batch.len() as u64)
    }

    async fn upsert_blacklist_entries(&self, batch: &[BlacklistEntry]) -> Result<u64> {
        let mut blacklists = self.blacklists.write().await;
        for row in batch {
            let mut row = row.clone();
            row.last_seen_at = Some(Utc::now());
            blacklists.insert((row.kind, row.value_hash.clone()), Tracked::new(row));
        }
        Ok(batch.len() as u64)
    }

    async fn deactivate_all(&self, table: ReferenceTable) -> Result<u64> {
        let mut count = 0u64;
        match table {
            ReferenceTable::TorExitNodes => {
                for t in self.tor_nodes.write().await.values_mut() {
                    t.row.is_active = false;
                    count += 1;
                }
            }
            ReferenceTable::DisposableEmailDomains => {
                for t in self.disposable_domains.write().await.values_mut() {
                    t.row.is_active = false;
                    count += 1;
                }
            }
            ReferenceTable::Asns => {
                for t in self.asns.write().await.values_mut() {
                    t.row.is_active = false;
                    count += 1;
                }
            }
            ReferenceTable::KnownUserAgents => {
                for t in self.user_agents.write().await.values_mut() {
                    t.row.is_active = false;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn prune_inactive(&self, table: ReferenceTable, cutoff: DateTime<Utc>) -> Result<u64> {
        fn sweep<K: std::hash::Hash + Eq + Clone, T>(
            map: &mut HashMap<K, Tracked<T>>,
            cutoff: DateTime<Utc>,
            is_active: impl Fn(&T) -> bool,
        ) -> u64 {
            let before = map.len();
            map.retain(|_, t| is_active(&t.row) || t.updated_at >= cutoff);
            (before - map.len()) as u64
        }

        Ok(match table {
            ReferenceTable::TorExitNodes => sweep(
                &mut *self.tor_nodes.write().await,
                cutoff,
                |r: &TorExitNode| r.is_active,
            ),
            ReferenceTable::DisposableEmailDomains => sweep(
                &mut *self.disposable_domains.write().await,
                cutoff,
                |r: &DisposableEmailDomain| r.is_active,
            ),
            ReferenceTable::Asns => {
                sweep(&mut *self.asns.write().await, cutoff, |r: &AsnRecord| {
                    r.is_active
                })
            }
            ReferenceTable::KnownUserAgents => sweep(
                &mut *self.user_agents.write().await,
                cutoff,
                |r: &KnownUserAgent| r.is_active,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refdata::models::AsnType;

    #[tokio::test]
    async fn test_tor_node_roundtrip() {
        let backend = MemoryReferenceBackend::new();
        backend
            .upsert_tor_nodes(&[TorExitNode::from_ip("185.220.101.1".to_string(), 4)])
            .await
            .unwrap();

        let node = backend.tor_node("185.220.101.1").await.unwrap().unwrap();
        assert!(node.is_active);
        assert_eq!(node.risk_weight, 90);
        assert!(backend.tor_node("8.8.8.8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let backend = MemoryReferenceBackend::new();
        let batch = vec![TorExitNode::from_ip("185.220.101.1".to_string(), 4)];

        backend.upsert_tor_nodes(&batch).await.unwrap();
        backend.upsert_tor_nodes(&batch).await.unwrap();

        assert_eq!(backend.active_count(ReferenceTable::TorExitNodes).await, 1);
    }

    #[tokio::test]
    async fn test_asn_for_ip_scans_ranges() {
        let backend = MemoryReferenceBackend::new();
        backend
            .upsert_asns(&[AsnRecord {
                asn: 13335,
                organization: "Example Cloud".to_string(),
                country_code: Some("US".to_string()),
                asn_type: AsnType::Datacenter,
                is_hosting: true,
                is_vpn: false,
                is_proxy: false,
                ip_ranges: vec!["104.16.0.0/13".to_string()],
                risk_weight: 60,
                is_active: true,
            }])
            .await
            .unwrap();

        let found = backend
            .asn_for_ip(&"104.16.132.229".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(found.unwrap().asn, 13335);

        let missed = backend.asn_for_ip(&"8.8.8.8".parse().unwrap()).await.unwrap();
        assert!(missed.is_none());
    }

    #[tokio::test]
    async fn test_deactivate_then_upsert_reactivates() {
        let backend = MemoryReferenceBackend::new();
        let batch = vec![TorExitNode::from_ip("185.220.101.1".to_string(), 4)];
        backend.upsert_tor_nodes(&batch).await.unwrap();

        backend
            .deactivate_all(ReferenceTable::TorExitNodes)
            .await
            .unwrap();
        assert_eq!(backend.active_count(ReferenceTable::TorExitNodes).await, 0);

        backend.upsert_tor_nodes(&batch).await.unwrap();
        assert_eq!(backend.active_count(ReferenceTable::TorExitNodes).await, 1);
    }

    #[tokio::test]
    async fn test_prune_inactive_keeps_recent_rows() {
        let backend = MemoryReferenceBackend::new();
        backend
            .upsert_tor_nodes(&[TorExitNode::from_ip("185.220.101.1".to_string(), 4)])
            .await
            .unwrap();
        backend
            .deactivate_all(ReferenceTable::TorExitNodes)
            .await
            .unwrap();

        // Cutoff in the past: the row was updated after it, so it survives
        let cutoff = Utc::now() - chrono::Duration::days(7);
        let removed = backend
            .prune_inactive(ReferenceTable::TorExitNodes, cutoff)
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // Cutoff in the future: the inactive row is swept
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let removed = backend
            .prune_inactive(ReferenceTable::TorExitNodes, cutoff)
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_blacklist_keyed_by_kind_and_hash() {
        let backend = MemoryReferenceBackend::new();
        backend
            .upsert_blacklist_entries(&[BlacklistEntry {
                value_hash: "deadbeef".to_string(),
                kind: BlacklistKind::Email,
                reason: Some("fraud ring".to_string()),
                risk_weight: 100,
                report_count: 0,
                last_seen_at: None,
            }])
            .await
            .unwrap();

        assert!(backend
            .blacklist_entry(BlacklistKind::Email, "deadbeef")
            .await
            .unwrap()
            .is_some());
        assert!(backend
            .blacklist_entry(BlacklistKind::Ip, "deadbeef")
            .await
            .unwrap()
            .is_none());
    }
}
