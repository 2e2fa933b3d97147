//! Reference store backends
//!
//! Backends for storing and querying reference tables.

mod memory;
mod postgres;

pub use memory::MemoryReferenceBackend;
pub use postgres::PgReferenceBackend;

use crate::error::Result;
use crate::refdata::models::{
    AsnRecord, BlacklistEntry, BlacklistKind, DisposableEmailDomain, KnownUserAgent, TorExitNode,
};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Refreshable reference tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceTable {
    TorExitNodes,
    DisposableEmailDomains,
    Asns,
    KnownUserAgents,
}

impl ReferenceTable {
    pub fn name(&self) -> &'static str {
        match self {
            ReferenceTable::TorExitNodes => "tor_exit_nodes",
            ReferenceTable::DisposableEmailDomains => "disposable_email_domains",
            ReferenceTable::Asns => "asns",
            ReferenceTable::KnownUserAgents => "known_user_agents",
        }
    }
}

/// Trait for reference table storage backends.
///
/// Lookups key on each table's natural key. Upserts merge whole batches on
/// that key inside a single transaction and are idempotent; every upsert
/// marks the row active and refreshes its bookkeeping timestamps.
#[async_trait::async_trait]
pub trait ReferenceBackend: Send + Sync {
    /// Look up a Tor exit node by IP
    async fn tor_node(&self, ip: &str) -> Result<Option<TorExitNode>>;

    /// Look up a disposable email provider by lowercased domain
    async fn disposable_domain(&self, domain: &str) -> Result<Option<DisposableEmailDomain>>;

    /// Look up an autonomous system by number
    async fn asn(&self, asn: i64) -> Result<Option<AsnRecord>>;

    /// Find the active ASN whose stored ranges cover an address
    async fn asn_for_ip(&self, ip: &IpAddr) -> Result<Option<AsnRecord>>;

    /// Look up a catalogued user agent by SHA-256 of the UA string
    async fn known_user_agent(&self, ua_hash: &str) -> Result<Option<KnownUserAgent>>;

    /// Look up a blacklist entry by keyed-hash
    async fn blacklist_entry(
        &self,
        kind: BlacklistKind,
        value_hash: &str,
    ) -> Result<Option<BlacklistEntry>>;

    async fn upsert_tor_nodes(&self, batch: &[TorExitNode]) -> Result<u64>;

    async fn upsert_disposable_domains(&self, batch: &[DisposableEmailDomain]) -> Result<u64>;

    async fn upsert_asns(&self, batch: &[AsnRecord]) -> Result<u64>;

    async fn upsert_known_user_agents(&self, batch: &[KnownUserAgent]) -> Result<u64>;

    /// Admin entry point for blacklist maintenance
    async fn upsert_blacklist_entries(&self, batch: &[BlacklistEntry]) -> Result<u64>;

    /// Mark every row of a table inactive; run before a refresh's first batch
    /// so a completed run leaves a snapshot-consistent active set
    async fn deactivate_all(&self, table: ReferenceTable) -> Result<u64>;

    /// Delete rows that have stayed inactive since before `cutoff`
    async fn prune_inactive(&self, table: ReferenceTable, cutoff: DateTime<Utc>) -> Result<u64>;
}
