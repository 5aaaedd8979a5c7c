use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use tweetscout_common::GeoPoint;

use crate::traits::Geocoder;

const USER_AGENT: &str = "tweetscout/0.1";
const MAX_PLACE_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: String,
}

/// First usable hit of a Nominatim search response.
pub fn first_point(results: &[NominatimResult]) -> GeoPoint {
    results
        .first()
        .and_then(|r| Some((r.lat.parse().ok()?, r.lon.parse().ok()?)))
        .map(|(latitude, longitude)| GeoPoint::Resolved {
            latitude,
            longitude,
        })
        .unwrap_or(GeoPoint::Unresolved)
}

/// Free-text lookups against a Nominatim-compatible search endpoint.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }

    async fn lookup(&self, place: &str) -> anyhow::Result<GeoPoint> {
        if place.len() > MAX_PLACE_LEN {
            anyhow::bail!("Location input too long (max {MAX_PLACE_LEN} chars)");
        }
        let resp = self
            .client
            .get(&self.url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let results: Vec<NominatimResult> = resp.json().await?;
        Ok(first_point(&results))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, place: &str) -> GeoPoint {
        match self.lookup(place).await {
            Ok(point) => {
                debug!(place, resolved = point.is_resolved(), "Geocoded");
                point
            }
            Err(e) => {
                warn!(place, error = %e, "Geocoding failed");
                GeoPoint::Unresolved
            }
        }
    }
}

/// Memoises another geocoder by exact place string, misses included, so each
/// distinct place costs one lookup. Meant to live for one job.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Mutex<HashMap<String, GeoPoint>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, place: &str) -> Option<GeoPoint> {
        self.cache.lock().ok()?.get(place).copied()
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn resolve(&self, place: &str) -> GeoPoint {
        if let Some(point) = self.cached(place) {
            return point;
        }
        let point = self.inner.resolve(place).await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(place.to_string(), point);
        }
        point
    }
}
