//! Shared harness for evaluator integration tests

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use verdict_runtime::audit::MemoryAuditStore;
use verdict_runtime::collab::{
    HighRiskEvent, MockAsnProvider, MockDnsResolver, MockDomainAgeProvider, MockGeoProvider,
    MockPageFetcher, RiskNotifier,
};
use verdict_runtime::crypto::{FieldHasher, SensitiveVault};
use verdict_runtime::refdata::{MemoryCache, MemoryReferenceBackend, ReferenceData};
use verdict_runtime::velocity::MemoryVelocityStore;
use verdict_runtime::{CheckContext, EngineConfig, Evaluator};

/// Notifier that records delivered events
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<HighRiskEvent>>,
}

#[async_trait]
impl RiskNotifier for RecordingNotifier {
    async fn notify(&self, event: &HighRiskEvent) -> verdict_runtime::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Builder over memory backends and mock collaborators
pub struct Harness {
    pub config: EngineConfig,
    pub backend: Arc<MemoryReferenceBackend>,
    pub audit: Arc<MemoryAuditStore>,
    pub velocity: Arc<MemoryVelocityStore>,
    pub dns: MockDnsResolver,
    pub geo: MockGeoProvider,
    pub asn_api: MockAsnProvider,
    pub domain_age: MockDomainAgeProvider,
    pub pages: MockPageFetcher,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                hash_key: "integration-hash-key".to_string(),
                encryption_key: "integration-encryption-key".to_string(),
                ..Default::default()
            },
            backend: Arc::new(MemoryReferenceBackend::new()),
            audit: Arc::new(MemoryAuditStore::new()),
            velocity: Arc::new(MemoryVelocityStore::new()),
            dns: MockDnsResolver::new(),
            geo: MockGeoProvider::new(),
            asn_api: MockAsnProvider::new(),
            domain_age: MockDomainAgeProvider::new(),
            pages: MockPageFetcher::new(),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    /// A hasher keyed like the evaluator's, for seeding blocklists
    pub fn hasher(&self) -> FieldHasher {
        FieldHasher::new(&self.config.hash_key).unwrap()
    }

    pub fn build(self) -> Evaluator {
        let config = Arc::new(self.config);
        let hasher = Arc::new(FieldHasher::new(&config.hash_key).unwrap());
        let vault = Arc::new(SensitiveVault::new(&config.encryption_key).unwrap());
        let refdata = Arc::new(ReferenceData::new(
            self.backend,
            Arc::new(MemoryCache::new()),
            config.cache_ttls.clone(),
        ));

        let ctx = Arc::new(CheckContext {
            config,
            hasher,
            refdata,
            velocity: self.velocity,
            audit: self.audit,
            dns: Arc::new(self.dns),
            geo: Arc::new(self.geo),
            asn_api: Arc::new(self.asn_api),
            domain_age: Arc::new(self.domain_age),
            pages: Arc::new(self.pages),
        });

        Evaluator::new(ctx, vault, self.notifier)
    }
}
