//! Service wiring
//!
//! Builds the evaluator and refresh pipeline out of the configured stores:
//! PostgreSQL and Redis when URLs are configured, in-process equivalents
//! otherwise. Shared by the server binary and the refresh CLI.

use crate::config::ServerConfig;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use verdict_runtime::audit::{AuditStore, MemoryAuditStore, PgAuditStore};
use verdict_runtime::collab::{
    AsnProvider, CachedGeoProvider, DisabledAsnProvider, DisabledGeoProvider, GeoProvider,
    HttpAsnProvider, HttpGeoProvider, HttpPageFetcher, NoopNotifier, RdapDomainAgeProvider,
    RiskNotifier, UdpDnsResolver, WebhookNotifier,
};
use verdict_runtime::crypto::{FieldHasher, SensitiveVault};
use verdict_runtime::refdata::{
    CacheStore, MemoryCache, MemoryReferenceBackend, PgReferenceBackend, RedisCache,
    ReferenceBackend, ReferenceData,
};
use verdict_runtime::velocity::{MemoryVelocityStore, RedisVelocityStore, VelocityStore};
use verdict_runtime::{CheckContext, Evaluator, HttpFeedFetcher, RefreshService};

/// Everything the binaries need
pub struct Services {
    pub evaluator: Arc<Evaluator>,
    pub refresh: Arc<RefreshService>,
    pub audit: Arc<dyn AuditStore>,
}

/// Build all services from configuration
pub async fn build(config: &ServerConfig) -> anyhow::Result<Services> {
    config
        .engine
        .validate()
        .context("engine configuration invalid")?;
    let engine = Arc::new(config.engine.clone());

    let hasher = Arc::new(FieldHasher::new(&engine.hash_key)?);
    let vault = Arc::new(SensitiveVault::new(&engine.encryption_key)?);

    let (backend, audit): (Arc<dyn ReferenceBackend>, Arc<dyn AuditStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connecting to PostgreSQL")?;
                info!("Connected to PostgreSQL");
                (
                    Arc::new(PgReferenceBackend::new(pool.clone())),
                    Arc::new(PgAuditStore::new(pool)),
                )
            }
            None => {
                warn!("No database_url configured, using in-process stores");
                (
                    Arc::new(MemoryReferenceBackend::new()),
                    Arc::new(MemoryAuditStore::new()),
                )
            }
        };

    let (cache, velocity): (Arc<dyn CacheStore>, Arc<dyn VelocityStore>) = match &config.redis_url
    {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("parsing redis url")?;
            let conn = redis::aio::ConnectionManager::new(client)
                .await
                .context("connecting to Redis")?;
            info!("Connected to Redis");
            (
                Arc::new(RedisCache::new(conn.clone())),
                Arc::new(RedisVelocityStore::new(conn)),
            )
        }
        None => {
            warn!("No redis_url configured, using in-process cache and counters");
            (
                Arc::new(MemoryCache::new()),
                Arc::new(MemoryVelocityStore::new()),
            )
        }
    };

    let timeout = Duration::from_millis(engine.collaborators.http_timeout_ms);

    let geo: Arc<dyn GeoProvider> = match &engine.collaborators.geo_endpoint {
        Some(endpoint) => Arc::new(CachedGeoProvider::new(
            Arc::new(HttpGeoProvider::new(endpoint.clone(), timeout)?),
            Arc::clone(&cache),
            engine.cache_ttls.geolocation,
        )),
        None => Arc::new(DisabledGeoProvider::new()),
    };
    let asn_api: Arc<dyn AsnProvider> = match &engine.collaborators.asn_endpoint {
        Some(endpoint) => Arc::new(HttpAsnProvider::new(endpoint.clone(), timeout)?),
        None => Arc::new(DisabledAsnProvider::new()),
    };
    let notifier: Arc<dyn RiskNotifier> = match &engine.collaborators.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), timeout)?),
        None => Arc::new(NoopNotifier::new()),
    };

    let refdata = Arc::new(ReferenceData::new(
        Arc::clone(&backend),
        cache,
        engine.cache_ttls.clone(),
    ));

    let ctx = Arc::new(CheckContext {
        config: Arc::clone(&engine),
        hasher,
        refdata,
        velocity,
        audit: Arc::clone(&audit),
        dns: Arc::new(UdpDnsResolver::new(
            engine.collaborators.dns_server.clone(),
            timeout,
        )),
        geo,
        asn_api,
        domain_age: Arc::new(RdapDomainAgeProvider::new(
            engine.collaborators.rdap_endpoint.clone(),
            timeout,
        )?),
        pages: Arc::new(HttpPageFetcher::new(timeout)?),
    });

    let evaluator = Arc::new(Evaluator::new(ctx, vault, notifier));
    let refresh = Arc::new(RefreshService::new(
        backend,
        Arc::new(HttpFeedFetcher::new(timeout)?),
        engine.refresh.clone(),
    ));

    Ok(Services {
        evaluator,
        refresh,
        audit,
    })
}
