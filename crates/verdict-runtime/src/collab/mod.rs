//! External collaborators
//!
//! Everything the checks reach outside the process for: DNS resolution,
//! geolocation, IP-to-ASN lookup, domain registration age, bounded page
//! fetches and the high-risk webhook. Each collaborator is a trait with a
//! production implementation and a mock for tests; checks degrade silently
//! when a collaborator fails or times out.

pub mod asn;
pub mod dns;
pub mod domain_age;
pub mod geo;
pub mod notify;
pub mod pages;

pub use asn::{AsnHint, AsnProvider, DisabledAsnProvider, HttpAsnProvider, MockAsnProvider};
pub use dns::{DnsResolver, MockDnsResolver, UdpDnsResolver};
pub use domain_age::{DomainAgeProvider, MockDomainAgeProvider, RdapDomainAgeProvider};
pub use geo::{
    CachedGeoProvider, DisabledGeoProvider, GeoInfo, GeoProvider, HttpGeoProvider, MockGeoProvider,
};
pub use notify::{HighRiskEvent, NoopNotifier, RiskNotifier, WebhookNotifier};
pub use pages::{HttpPageFetcher, MockPageFetcher, PageFetcher};
