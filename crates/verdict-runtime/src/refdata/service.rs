//! Cached reference data facade

use crate::config::CacheTtls;
use crate::error::Result;
use crate::refdata::backend::ReferenceBackend;
use crate::refdata::cache::CacheStore;
use crate::refdata::models::{
    AsnRecord, BlacklistEntry, BlacklistKind, DisposableEmailDomain, KnownUserAgent, TorExitNode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

/// Read facade over the reference store.
///
/// Every lookup first consults the short-TTL cache under a key derived from
/// the natural key, then falls through to the backend and populates the
/// cache. Negative results are cached too, so absent rows do not hammer the
/// store. Cache failures degrade to a store read; store failures propagate,
/// because serving a stale row past its TTL would make scores materially
/// wrong.
pub struct ReferenceData {
    backend: Arc<dyn ReferenceBackend>,
    cache: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl ReferenceData {
    pub fn new(
        backend: Arc<dyn ReferenceBackend>,
        cache: Arc<dyn CacheStore>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            backend,
            cache,
            ttls,
        }
    }

    /// Direct access to the backing store, for refresh jobs and admin tools
    pub fn backend(&self) -> &Arc<dyn ReferenceBackend> {
        &self.backend
    }

    async fn cached<T, F, Fut>(&self, key: String, ttl: u64, load: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<T>>>,
    {
        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(value) = serde_json::from_str::<Option<T>>(&raw) {
                    return Ok(value);
                }
                tracing::debug!(key = %key, "Discarding undecodable cache entry");
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(key = %key, "Cache read failed: {}", e),
        }

        let value = load().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, ttl).await {
                    tracing::debug!(key = %key, "Cache write failed: {}", e);
                }
            }
            Err(e) => tracing::debug!(key = %key, "Cache encode failed: {}", e),
        }

        Ok(value)
    }

    /// Tor exit node by IP
    pub async fn tor_node(&self, ip: &str) -> Result<Option<TorExitNode>> {
        let backend = Arc::clone(&self.backend);
        let ip_owned = ip.to_string();
        self.cached(
            format!("ref:tor:{}", ip),
            self.ttls.tor_node,
            move || async move { backend.tor_node(&ip_owned).await },
        )
        .await
    }

    /// Disposable email provider by lowercased domain
    pub async fn disposable_domain(&self, domain: &str) -> Result<Option<DisposableEmailDomain>> {
        let backend = Arc::clone(&self.backend);
        let domain_owned = domain.to_string();
        self.cached(
            format!("ref:disposable:{}", domain),
            self.ttls.disposable_domain,
            move || async move { backend.disposable_domain(&domain_owned).await },
        )
        .await
    }

    /// ASN record by number
    pub async fn asn(&self, asn: i64) -> Result<Option<AsnRecord>> {
        let backend = Arc::clone(&self.backend);
        self.cached(
            format!("ref:asn:{}", asn),
            self.ttls.asn_info,
            move || async move { backend.asn(asn).await },
        )
        .await
    }

    /// ASN covering an address, via stored ranges
    pub async fn asn_for_ip(&self, ip: &IpAddr) -> Result<Option<AsnRecord>> {
        let backend = Arc::clone(&self.backend);
        let ip = *ip;
        self.cached(
            format!("ref:asn-ip:{}", ip),
            self.ttls.asn_info,
            move || async move { backend.asn_for_ip(&ip).await },
        )
        .await
    }

    /// Catalogued user agent by SHA-256 of the UA string
    pub async fn known_user_agent(&self, ua_hash: &str) -> Result<Option<KnownUserAgent>> {
        let backend = Arc::clone(&self.backend);
        let hash_owned = ua_hash.to_string();
        self.cached(
            format!("ref:ua:{}", ua_hash),
            self.ttls.asn_info,
            move || async move { backend.known_user_agent(&hash_owned).await },
        )
        .await
    }

    /// Blacklist entry by keyed-hash
    pub async fn blacklist_entry(
        &self,
        kind: BlacklistKind,
        value_hash: &str,
    ) -> Result<Option<BlacklistEntry>> {
        let backend = Arc::clone(&self.backend);
        let hash_owned = value_hash.to_string();
        self.cached(
            format!("ref:bl:{}:{}", kind.as_str(), value_hash),
            self.ttls.blacklist,
            move || async move { backend.blacklist_entry(kind, &hash_owned).await },
        )
        .await
    }
}
