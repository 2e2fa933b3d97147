//! Background schedulers
//!
//! Per-source refresh loops on their configured cadence, and the daily
//! retention cleanup. Loops run for the life of the process; the refresh
//! service's own guards handle overlap and minimum intervals.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use verdict_runtime::audit::AuditStore;
use verdict_runtime::config::EngineConfig;
use verdict_runtime::{RefreshService, RefreshSource};

/// Retention cleanup cadence
const CLEANUP_INTERVAL_SECS: u64 = 86400;

/// Spawn one refresh loop per source
pub fn spawn_refresh_loops(refresh: Arc<RefreshService>, config: &EngineConfig) {
    let schedules = &config.refresh.schedules;
    for source in RefreshSource::ALL {
        let period = match source {
            RefreshSource::Tor => schedules.tor,
            RefreshSource::DisposableEmails => schedules.disposable_emails,
            RefreshSource::Asn => schedules.asn,
            RefreshSource::UserAgents => schedules.user_agents,
        };
        let refresh = Arc::clone(&refresh);
        info!(source = %source, period_secs = period, "Scheduling refresh loop");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(period));
            // The immediate first tick would race boot; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                refresh.refresh(source, false).await;
            }
        });
    }
}

/// Spawn the audit retention cleanup loop
pub fn spawn_retention_cleanup(audit: Arc<dyn AuditStore>, retention_days: u32) {
    info!(retention_days, "Scheduling audit retention cleanup");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - ChronoDuration::days(retention_days as i64);
            match audit.delete_older_than(cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "Audit retention cleanup removed records")
                }
                Ok(_) => {}
                Err(e) => error!("Audit retention cleanup failed: {}", e),
            }
        }
    });
}
