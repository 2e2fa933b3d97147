//! Engine configuration
//!
//! The full configuration surface of the evaluation engine: secrets, score
//! thresholds, per-check toggles, cache TTLs, refresh cadence and feed URLs.
//! Loaded by the server from file + environment; every knob carries a default
//! except the two secrets, whose absence is a fatal boot error.

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use verdict_core::{CheckKind, DecisionThresholds, RiskThresholds};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HMAC key for keyed hashing of sensitive input. Required.
    #[serde(default)]
    pub hash_key: String,

    /// Key material for reversible encryption of sensitive input. Required.
    #[serde(default)]
    pub encryption_key: String,

    /// Risk level bands
    #[serde(default)]
    pub risk_thresholds: RiskThresholds,

    /// Score-to-decision bands
    #[serde(default)]
    pub decision_thresholds: DecisionThresholds,

    /// Per-check feature toggles
    #[serde(default)]
    pub checks: CheckToggles,

    /// Cache TTLs per reference kind
    #[serde(default)]
    pub cache_ttls: CacheTtls,

    /// Per-evaluation deadline in milliseconds
    #[serde(default = "default_evaluation_deadline_ms")]
    pub evaluation_deadline_ms: u64,

    /// Audit record retention in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Refresh pipeline configuration
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Collaborator endpoints
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// BIN prefix sets for card classification
    #[serde(default)]
    pub card_bins: CardBinConfig,

    /// Phone prefixes known to belong to disposable-number providers
    #[serde(default)]
    pub disposable_phone_prefixes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_key: String::new(),
            encryption_key: String::new(),
            risk_thresholds: RiskThresholds::default(),
            decision_thresholds: DecisionThresholds::default(),
            checks: CheckToggles::default(),
            cache_ttls: CacheTtls::default(),
            evaluation_deadline_ms: default_evaluation_deadline_ms(),
            retention_days: default_retention_days(),
            refresh: RefreshConfig::default(),
            collaborators: CollaboratorConfig::default(),
            card_bins: CardBinConfig::default(),
            disposable_phone_prefixes: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration. The secrets are mandatory; everything else
    /// has a usable default.
    pub fn validate(&self) -> Result<()> {
        if self.hash_key.trim().is_empty() {
            return Err(RuntimeError::Config("hash_key must be set".to_string()));
        }
        if self.encryption_key.trim().is_empty() {
            return Err(RuntimeError::Config(
                "encryption_key must be set".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_evaluation_deadline_ms() -> u64 {
    5000
}

fn default_retention_days() -> u32 {
    365
}

/// Per-check feature toggles; all checks are on by default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckToggles {
    #[serde(default = "default_true")]
    pub email: bool,

    #[serde(default = "default_true")]
    pub domain: bool,

    #[serde(default = "default_true")]
    pub ip: bool,

    #[serde(default = "default_true")]
    pub credit_card: bool,

    #[serde(default = "default_true")]
    pub phone: bool,

    #[serde(default = "default_true")]
    pub user_agent: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CheckToggles {
    fn default() -> Self {
        Self {
            email: true,
            domain: true,
            ip: true,
            credit_card: true,
            phone: true,
            user_agent: true,
        }
    }
}

impl CheckToggles {
    /// Whether a check kind is enabled
    pub fn enabled(&self, kind: CheckKind) -> bool {
        match kind {
            CheckKind::Email => self.email,
            CheckKind::Domain => self.domain,
            CheckKind::Ip => self.ip,
            CheckKind::CreditCard => self.credit_card,
            CheckKind::Phone => self.phone,
            CheckKind::UserAgent => self.user_agent,
        }
    }
}

/// Cache TTLs per reference kind, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtls {
    #[serde(default = "default_blacklist_ttl")]
    pub blacklist: u64,

    #[serde(default = "default_disposable_ttl")]
    pub disposable_domain: u64,

    #[serde(default = "default_tor_ttl")]
    pub tor_node: u64,

    #[serde(default = "default_asn_ttl")]
    pub asn_info: u64,

    #[serde(default = "default_geo_ttl")]
    pub geolocation: u64,
}

fn default_blacklist_ttl() -> u64 {
    300
}

fn default_disposable_ttl() -> u64 {
    3600
}

fn default_tor_ttl() -> u64 {
    3600
}

fn default_asn_ttl() -> u64 {
    3600
}

fn default_geo_ttl() -> u64 {
    86400
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            blacklist: default_blacklist_ttl(),
            disposable_domain: default_disposable_ttl(),
            tor_node: default_tor_ttl(),
            asn_info: default_asn_ttl(),
            geolocation: default_geo_ttl(),
        }
    }
}

/// Refresh pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Minimum seconds between successful runs, per source
    #[serde(default)]
    pub min_intervals: RefreshIntervals,

    /// Scheduler cadence in seconds, per source
    #[serde(default)]
    pub schedules: RefreshIntervals,

    /// Per-job deadline in seconds
    #[serde(default = "default_refresh_deadline_secs")]
    pub deadline_secs: u64,

    /// Attempts for a job-global failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Upsert batch sizes per source
    #[serde(default)]
    pub batch_sizes: BatchSizes,

    /// Process memory limit in bytes; batches log a warning when resident
    /// memory exceeds `memory_warn_ratio` of this
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,

    /// Advisory warning ratio against `memory_limit_bytes`
    #[serde(default = "default_memory_warn_ratio")]
    pub memory_warn_ratio: f64,

    /// Rows left `is_active = false` for this many days are deleted after a run
    #[serde(default = "default_inactive_retention_days")]
    pub inactive_retention_days: u32,

    /// Feed URLs per source
    #[serde(default)]
    pub feeds: FeedUrls,
}

fn default_refresh_deadline_secs() -> u64 {
    1200
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_memory_limit_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_memory_warn_ratio() -> f64 {
    0.8
}

fn default_inactive_retention_days() -> u32 {
    7
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_intervals: RefreshIntervals::default(),
            schedules: RefreshIntervals::default(),
            deadline_secs: default_refresh_deadline_secs(),
            retry_attempts: default_retry_attempts(),
            batch_sizes: BatchSizes::default(),
            memory_limit_bytes: default_memory_limit_bytes(),
            memory_warn_ratio: default_memory_warn_ratio(),
            inactive_retention_days: default_inactive_retention_days(),
            feeds: FeedUrls::default(),
        }
    }
}

/// Per-source intervals in seconds. Used both for the minimum gap between
/// runs and for the scheduler cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshIntervals {
    /// Tor exit nodes: 6 hours
    #[serde(default = "default_tor_interval")]
    pub tor: u64,

    /// Disposable email domains: 24 hours
    #[serde(default = "default_disposable_interval")]
    pub disposable_emails: u64,

    /// ASN master list: 7 days
    #[serde(default = "default_asn_interval")]
    pub asn: u64,

    /// Known user agents: 24 hours
    #[serde(default = "default_user_agents_interval")]
    pub user_agents: u64,
}

fn default_tor_interval() -> u64 {
    6 * 3600
}

fn default_disposable_interval() -> u64 {
    86400
}

fn default_asn_interval() -> u64 {
    7 * 86400
}

fn default_user_agents_interval() -> u64 {
    86400
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            tor: default_tor_interval(),
            disposable_emails: default_disposable_interval(),
            asn: default_asn_interval(),
            user_agents: default_user_agents_interval(),
        }
    }
}

/// Upsert batch sizes per source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSizes {
    #[serde(default = "default_tor_batch")]
    pub tor: usize,

    #[serde(default = "default_disposable_batch")]
    pub disposable_emails: usize,

    #[serde(default = "default_asn_batch")]
    pub asn: usize,

    #[serde(default = "default_user_agents_batch")]
    pub user_agents: usize,
}

fn default_tor_batch() -> usize {
    500
}

fn default_disposable_batch() -> usize {
    1000
}

fn default_asn_batch() -> usize {
    1000
}

fn default_user_agents_batch() -> usize {
    100
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            tor: default_tor_batch(),
            disposable_emails: default_disposable_batch(),
            asn: default_asn_batch(),
            user_agents: default_user_agents_batch(),
        }
    }
}

/// External feed URLs per source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedUrls {
    /// Plain newline-delimited Tor exit lists
    #[serde(default = "default_tor_lists")]
    pub tor_lists: Vec<String>,

    /// Paginated JSON endpoint with per-relay metadata
    #[serde(default)]
    pub tor_detail: Option<String>,

    /// Disposable email domain lists (text or JSON array)
    #[serde(default = "default_disposable_lists")]
    pub disposable_emails: Vec<String>,

    /// Plain-text ASN master list
    #[serde(default = "default_asn_list")]
    pub asn: String,

    /// JSON bot user-agent lists
    #[serde(default = "default_user_agent_lists")]
    pub user_agents: Vec<String>,
}

fn default_tor_lists() -> Vec<String> {
    vec![
        "https://check.torproject.org/torbulkexitlist".to_string(),
        "https://www.dan.me.uk/torlist/?exit".to_string(),
    ]
}

fn default_disposable_lists() -> Vec<String> {
    vec![
        "https://raw.githubusercontent.com/disposable-email-domains/disposable-email-domains/master/disposable_email_blocklist.conf".to_string(),
        "https://raw.githubusercontent.com/disposable/disposable-email-domains/master/domains.json".to_string(),
    ]
}

fn default_asn_list() -> String {
    "https://ftp.ripe.net/ripe/asnames/asn.txt".to_string()
}

fn default_user_agent_lists() -> Vec<String> {
    vec![
        "https://raw.githubusercontent.com/monperrus/crawler-user-agents/master/crawler-user-agents.json".to_string(),
    ]
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self {
            tor_lists: default_tor_lists(),
            tor_detail: None,
            disposable_emails: default_disposable_lists(),
            asn: default_asn_list(),
            user_agents: default_user_agent_lists(),
        }
    }
}

/// Collaborator endpoints and client timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// UDP DNS resolver used for MX/A/TXT lookups
    #[serde(default = "default_dns_server")]
    pub dns_server: String,

    /// Geolocation API base URL; the IP is appended as a path segment
    #[serde(default)]
    pub geo_endpoint: Option<String>,

    /// IP-to-ASN API base URL; the IP is appended as a path segment
    #[serde(default)]
    pub asn_endpoint: Option<String>,

    /// RDAP base URL for domain registration lookups
    #[serde(default = "default_rdap_endpoint")]
    pub rdap_endpoint: String,

    /// Webhook receiving high-risk events
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Timeout applied to every collaborator HTTP call
    #[serde(default = "default_collaborator_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_dns_server() -> String {
    "1.1.1.1:53".to_string()
}

fn default_rdap_endpoint() -> String {
    "https://rdap.org/domain".to_string()
}

fn default_collaborator_timeout_ms() -> u64 {
    2000
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            dns_server: default_dns_server(),
            geo_endpoint: None,
            asn_endpoint: None,
            rdap_endpoint: default_rdap_endpoint(),
            webhook_url: None,
            http_timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

/// BIN prefix sets for card classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardBinConfig {
    /// BIN prefixes issued against prepaid programs
    #[serde(default)]
    pub prepaid: Vec<String>,

    /// BIN prefixes issued by virtual-card providers
    #[serde(default)]
    pub virtual_cards: Vec<String>,
}
