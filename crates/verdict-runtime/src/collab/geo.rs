//! Geolocation collaborator
//!
//! Resolves an IP to a country and UTC offset for the consistency sub-rules
//! of the IP check. Results are cached under the geolocation TTL by the
//! caller. Declared IANA zones are mapped to standard offsets with a static
//! table; the 3-hour mismatch threshold makes DST precision irrelevant.

use crate::error::{Result, RuntimeError};
use crate::refdata::CacheStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Geolocation result for an address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO-3166 alpha-2 country
    pub country_code: Option<String>,

    /// Offset from UTC in minutes
    pub utc_offset_minutes: Option<i32>,
}

/// Geolocation collaborator
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Locate an address; `None` when the provider has no data for it
    async fn locate(&self, ip: &IpAddr) -> Result<Option<GeoInfo>>;
}

/// HTTP geolocation client. Expects `GET {base}/{ip}` returning JSON with
/// `country_code` and either `utc_offset` (minutes) or `timezone` (IANA).
pub struct HttpGeoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeoProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    async fn locate(&self, ip: &IpAddr) -> Result<Option<GeoInfo>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        let country_code = body
            .get("country_code")
            .or_else(|| body.get("countryCode"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_uppercase());

        let utc_offset_minutes = body
            .get("utc_offset")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| {
                body.get("timezone")
                    .and_then(|v| v.as_str())
                    .and_then(zone_offset_minutes)
            });

        if country_code.is_none() && utc_offset_minutes.is_none() {
            return Ok(None);
        }

        Ok(Some(GeoInfo {
            country_code,
            utc_offset_minutes,
        }))
    }
}

/// Caching wrapper over a geolocation provider.
///
/// Locations change on the timescale of address reallocations, so they get
/// the longest TTL of any cached kind. Cache failures fall through to the
/// inner provider.
pub struct CachedGeoProvider {
    inner: Arc<dyn GeoProvider>,
    cache: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl CachedGeoProvider {
    pub fn new(inner: Arc<dyn GeoProvider>, cache: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }
}

#[async_trait]
impl GeoProvider for CachedGeoProvider {
    async fn locate(&self, ip: &IpAddr) -> Result<Option<GeoInfo>> {
        let key = format!("geo:{}", ip);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(cached) = serde_json::from_str::<Option<GeoInfo>>(&raw) {
                    return Ok(cached);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(key = %key, "Geo cache read failed: {}", e),
        }

        let located = self.inner.locate(ip).await?;

        if let Ok(raw) = serde_json::to_string(&located) {
            if let Err(e) = self.cache.set(&key, &raw, self.ttl_secs).await {
                tracing::debug!(key = %key, "Geo cache write failed: {}", e);
            }
        }
        Ok(located)
    }
}

/// Provider used when no geolocation endpoint is configured; every lookup
/// answers "no data" and the consistency sub-rules contribute nothing
#[derive(Default)]
pub struct DisabledGeoProvider;

impl DisabledGeoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GeoProvider for DisabledGeoProvider {
    async fn locate(&self, _ip: &IpAddr) -> Result<Option<GeoInfo>> {
        Ok(None)
    }
}

/// Scripted provider for tests
#[derive(Default)]
pub struct MockGeoProvider {
    results: HashMap<IpAddr, GeoInfo>,
}

impl MockGeoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(
        mut self,
        ip: &str,
        country: &str,
        utc_offset_minutes: i32,
    ) -> Self {
        self.results.insert(
            ip.parse().expect("valid ip in test fixture"),
            GeoInfo {
                country_code: Some(country.to_string()),
                utc_offset_minutes: Some(utc_offset_minutes),
            },
        );
        self
    }
}

#[async_trait]
impl GeoProvider for MockGeoProvider {
    async fn locate(&self, ip: &IpAddr) -> Result<Option<GeoInfo>> {
        Ok(self.results.get(ip).cloned())
    }
}

/// Standard offsets for commonly declared IANA zones, in minutes
const ZONE_OFFSETS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("Etc/UTC", 0),
    ("Europe/London", 0),
    ("Europe/Dublin", 0),
    ("Europe/Lisbon", 0),
    ("Europe/Paris", 60),
    ("Europe/Berlin", 60),
    ("Europe/Madrid", 60),
    ("Europe/Rome", 60),
    ("Europe/Amsterdam", 60),
    ("Europe/Brussels", 60),
    ("Europe/Vienna", 60),
    ("Europe/Zurich", 60),
    ("Europe/Stockholm", 60),
    ("Europe/Oslo", 60),
    ("Europe/Copenhagen", 60),
    ("Europe/Warsaw", 60),
    ("Europe/Prague", 60),
    ("Europe/Athens", 120),
    ("Europe/Helsinki", 120),
    ("Europe/Kyiv", 120),
    ("Europe/Istanbul", 180),
    ("Europe/Moscow", 180),
    ("America/New_York", -300),
    ("America/Toronto", -300),
    ("America/Chicago", -360),
    ("America/Mexico_City", -360),
    ("America/Denver", -420),
    ("America/Phoenix", -420),
    ("America/Los_Angeles", -480),
    ("America/Vancouver", -480),
    ("America/Anchorage", -540),
    ("America/Sao_Paulo", -180),
    ("America/Argentina/Buenos_Aires", -180),
    ("America/Bogota", -300),
    ("America/Lima", -300),
    ("Africa/Cairo", 120),
    ("Africa/Johannesburg", 120),
    ("Africa/Lagos", 60),
    ("Africa/Nairobi", 180),
    ("Asia/Jerusalem", 120),
    ("Asia/Dubai", 240),
    ("Asia/Riyadh", 180),
    ("Asia/Karachi", 300),
    ("Asia/Kolkata", 330),
    ("Asia/Dhaka", 360),
    ("Asia/Bangkok", 420),
    ("Asia/Jakarta", 420),
    ("Asia/Singapore", 480),
    ("Asia/Hong_Kong", 480),
    ("Asia/Shanghai", 480),
    ("Asia/Taipei", 480),
    ("Asia/Manila", 480),
    ("Asia/Seoul", 540),
    ("Asia/Tokyo", 540),
    ("Australia/Perth", 480),
    ("Australia/Sydney", 600),
    ("Australia/Melbourne", 600),
    ("Australia/Brisbane", 600),
    ("Pacific/Auckland", 720),
];

/// Standard offset for a declared IANA zone
pub fn zone_offset_minutes(zone: &str) -> Option<i32> {
    ZONE_OFFSETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, offset)| *offset)
}
