//! Data-source refresh pipeline
//!
//! One job per external source. Every job follows the same algorithm:
//! minimum-interval guard, stream the feed to disk, parse and validate line
//! by line, upsert in bounded batches, flip-then-prune the active set.
//! Jobs are serialized per source; a second invocation while one runs is a
//! no-op reported as skipped.

mod asn;
mod disposable;
pub mod feed;
mod tor;
mod user_agents;

pub use feed::{FeedFetcher, HttpFeedFetcher, MockFeedFetcher};

use crate::config::RefreshConfig;
use crate::error::{Result, RuntimeError};
use crate::refdata::ReferenceBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Refreshable sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSource {
    Tor,
    DisposableEmails,
    Asn,
    UserAgents,
}

impl RefreshSource {
    pub const ALL: [RefreshSource; 4] = [
        RefreshSource::Tor,
        RefreshSource::DisposableEmails,
        RefreshSource::Asn,
        RefreshSource::UserAgents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshSource::Tor => "tor",
            RefreshSource::DisposableEmails => "disposable_emails",
            RefreshSource::Asn => "asn",
            RefreshSource::UserAgents => "user_agents",
        }
    }
}

impl fmt::Display for RefreshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshSource {
    type Err = RuntimeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tor" => Ok(RefreshSource::Tor),
            "disposable_emails" => Ok(RefreshSource::DisposableEmails),
            "asn" => Ok(RefreshSource::Asn),
            "user_agents" => Ok(RefreshSource::UserAgents),
            other => Err(RuntimeError::Config(format!(
                "unknown refresh source: {}",
                other
            ))),
        }
    }
}

/// Outcome of one source's refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub success: bool,

    /// The run was a no-op: already running, or ran too recently
    #[serde(default)]
    pub skipped: bool,

    /// Rows upserted
    pub count: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceOutcome {
    fn skipped(reason: &str) -> Self {
        tracing::info!(reason, "Refresh skipped");
        Self {
            success: true,
            skipped: true,
            count: 0,
            error: None,
        }
    }
}

/// Report over one refresh invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    pub sources: BTreeMap<String, SourceOutcome>,
    pub total: u64,
}

/// Shared state handed to the per-source jobs
pub(crate) struct JobContext<'a> {
    pub backend: &'a Arc<dyn ReferenceBackend>,
    pub fetcher: &'a Arc<dyn FeedFetcher>,
    pub config: &'a RefreshConfig,
}

/// The refresh pipeline service
pub struct RefreshService {
    backend: Arc<dyn ReferenceBackend>,
    fetcher: Arc<dyn FeedFetcher>,
    config: RefreshConfig,
    last_success: Mutex<HashMap<RefreshSource, DateTime<Utc>>>,
    /// Per-source serialization; try_lock failure means "already running"
    running: HashMap<RefreshSource, Arc<Mutex<()>>>,
}

impl RefreshService {
    pub fn new(
        backend: Arc<dyn ReferenceBackend>,
        fetcher: Arc<dyn FeedFetcher>,
        config: RefreshConfig,
    ) -> Self {
        let running = RefreshSource::ALL
            .iter()
            .map(|source| (*source, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            backend,
            fetcher,
            config,
            last_success: Mutex::new(HashMap::new()),
            running,
        }
    }

    /// Refresh one source. Errors are folded into the outcome so a caller
    /// iterating sources never stops early.
    pub async fn refresh(&self, source: RefreshSource, force: bool) -> SourceOutcome {
        let lock = Arc::clone(&self.running[&source]);
        let Ok(_guard) = lock.try_lock() else {
            return SourceOutcome::skipped("already running");
        };

        if !force {
            let last_success = self.last_success.lock().await;
            if let Some(last) = last_success.get(&source) {
                let min = self.min_interval_secs(source) as i64;
                if (Utc::now() - *last).num_seconds() < min {
                    return SourceOutcome::skipped("ran recently");
                }
            }
        }

        tracing::info!(source = %source, force, "Refresh starting");
        match self.run_with_policy(source).await {
            Ok(count) => {
                self.last_success.lock().await.insert(source, Utc::now());
                tracing::info!(source = %source, count, "Refresh finished");
                SourceOutcome {
                    success: true,
                    skipped: false,
                    count,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(source = %source, "Refresh failed: {}", e);
                SourceOutcome {
                    success: false,
                    skipped: false,
                    count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Refresh every source; failures in one source never stop the others
    pub async fn refresh_all(&self, force: bool) -> RefreshReport {
        let mut sources = BTreeMap::new();
        let mut total = 0u64;
        for source in RefreshSource::ALL {
            let outcome = self.refresh(source, force).await;
            total += outcome.count;
            sources.insert(source.as_str().to_string(), outcome);
        }
        RefreshReport { sources, total }
    }

    fn min_interval_secs(&self, source: RefreshSource) -> u64 {
        let intervals = &self.config.min_intervals;
        match source {
            RefreshSource::Tor => intervals.tor,
            RefreshSource::DisposableEmails => intervals.disposable_emails,
            RefreshSource::Asn => intervals.asn,
            RefreshSource::UserAgents => intervals.user_agents,
        }
    }

    /// Job-global failures retry with exponential back-off under the job
    /// deadline
    async fn run_with_policy(&self, source: RefreshSource) -> Result<u64> {
        let attempts = self.config.retry_attempts.max(1);
        let deadline = Duration::from_secs(self.config.deadline_secs);

        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = Duration::from_secs(1u64 << (attempt - 1));
                tracing::warn!(source = %source, attempt, "Retrying refresh in {:?}", backoff);
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(deadline, self.run_job(source)).await {
                Ok(Ok(count)) => return Ok(count),
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => {
                    last_error = Some(RuntimeError::Deadline(deadline.as_millis() as u64));
                }
            }
        }
        Err(last_error.expect("at least one attempt ran"))
    }

    async fn run_job(&self, source: RefreshSource) -> Result<u64> {
        let ctx = JobContext {
            backend: &self.backend,
            fetcher: &self.fetcher,
            config: &self.config,
        };
        match source {
            RefreshSource::Tor => tor::run(&ctx).await,
            RefreshSource::DisposableEmails => disposable::run(&ctx).await,
            RefreshSource::Asn => asn::run(&ctx).await,
            RefreshSource::UserAgents => user_agents::run(&ctx).await,
        }
    }
}
