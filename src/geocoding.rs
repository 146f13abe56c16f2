//! Address → coordinates, best effort.
//!
//! A [`ChainedGeocoder`] walks a list of query strings derived from the
//! address and asks each provider in turn; the first hit wins. Any
//! failure is logged and ends as "no coordinates", never as an error
//! for the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::USER_AGENT;
use crate::models::Address;

/// Timeout applied to every outbound lookup.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(7);

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response: {0}")]
    Malformed(String),
}

/// One geocoding backend answering free-text queries.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &Address) -> Option<GeoPoint>;
}

/// Shared HTTP client for outbound lookups.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

// ═══════════════════════════════════════════════════════════
// Query construction
// ═══════════════════════════════════════════════════════════

fn join_present(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Queries tried in order, most specific (postal code) first.
pub fn candidate_queries(address: &Address) -> Vec<String> {
    let postal = address.postal_code.trim();
    let line = join_present(&[&address.street, &address.city, &address.state], " ");
    let region = join_present(&[&address.city, &address.state], ", ");

    let mut queries = Vec::new();
    if !postal.is_empty() {
        queries.push(format!("{postal} India"));
        queries.push(postal.to_string());
    }
    if !line.is_empty() {
        queries.push(format!("{line} India"));
        queries.push(line);
    }
    if !region.is_empty() {
        queries.push(format!("{region}, India"));
    }
    queries.dedup();
    queries
}

/// Everything in one string, for the last-resort lookup.
pub fn fallback_query(address: &Address) -> Option<String> {
    let q = join_present(
        &[
            &address.postal_code,
            &address.street,
            &address.city,
            &address.state,
        ],
        " ",
    );
    (!q.is_empty()).then(|| format!("{q} India"))
}

// ═══════════════════════════════════════════════════════════
// Providers
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

pub(crate) fn parse_nominatim(body: &str) -> Result<Option<GeoPoint>, GeocodeError> {
    let hits: Vec<NominatimHit> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    let Some(first) = hits.first() else {
        return Ok(None);
    };
    let lat = first.lat.parse().map_err(|_| GeocodeError::Malformed(first.lat.clone()))?;
    let lng = first.lon.parse().map_err(|_| GeocodeError::Malformed(first.lon.clone()))?;
    Ok(Some(GeoPoint { lat, lng }))
}

pub struct Nominatim {
    http: reqwest::Client,
    base_url: String,
}

impl Nominatim {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: NOMINATIM_URL.to_string(),
        }
    }
}

#[async_trait]
impl GeocodeProvider for Nominatim {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn search(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let body = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "5"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_nominatim(&body)
    }
}

#[derive(Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Deserialize)]
struct OpenCageResult {
    geometry: OpenCageGeometry,
}

#[derive(Deserialize)]
struct OpenCageGeometry {
    lat: f64,
    lng: f64,
}

pub(crate) fn parse_opencage(body: &str) -> Result<Option<GeoPoint>, GeocodeError> {
    let response: OpenCageResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    Ok(response.results.first().map(|r| GeoPoint {
        lat: r.geometry.lat,
        lng: r.geometry.lng,
    }))
}

pub struct OpenCage {
    http: reqwest::Client,
    api_key: String,
}

impl OpenCage {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl GeocodeProvider for OpenCage {
    fn name(&self) -> &'static str {
        "opencage"
    }

    async fn search(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let body = self
            .http
            .get(OPENCAGE_URL)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("limit", "1"),
                ("no_annotations", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_opencage(&body)
    }
}

// ═══════════════════════════════════════════════════════════
// Chain
// ═══════════════════════════════════════════════════════════

pub struct ChainedGeocoder {
    providers: Vec<Box<dyn GeocodeProvider>>,
}

impl ChainedGeocoder {
    pub fn new(providers: Vec<Box<dyn GeocodeProvider>>) -> Self {
        Self { providers }
    }

    /// OpenCage first when a key is configured, Nominatim always.
    pub fn from_config(http: reqwest::Client, opencage_api_key: Option<String>) -> Self {
        let mut providers: Vec<Box<dyn GeocodeProvider>> = Vec::new();
        if let Some(key) = opencage_api_key {
            providers.push(Box::new(OpenCage::new(http.clone(), key)));
        }
        providers.push(Box::new(Nominatim::new(http)));
        Self::new(providers)
    }

    async fn first_hit(&self, query: &str) -> Option<GeoPoint> {
        for provider in &self.providers {
            match provider.search(query).await {
                Ok(Some(point)) => {
                    tracing::debug!(provider = provider.name(), query, "Geocode hit");
                    return Some(point);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = provider.name(), query, error = %e, "Geocode lookup failed");
                }
            }
        }
        None
    }
}

#[async_trait]
impl Geocoder for ChainedGeocoder {
    async fn locate(&self, address: &Address) -> Option<GeoPoint> {
        if !address.has_any() {
            return None;
        }
        for query in candidate_queries(address) {
            if let Some(point) = self.first_hit(&query).await {
                return Some(point);
            }
        }
        if let Some(query) = fallback_query(address) {
            if let Some(point) = self.first_hit(&query).await {
                return Some(point);
            }
        }
        tracing::warn!("Geocoding failed; continuing without coordinates");
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Never finds anything; keeps tests off the network.
    pub(crate) struct NoGeocoder;

    #[async_trait]
    impl Geocoder for NoGeocoder {
        async fn locate(&self, _address: &Address) -> Option<GeoPoint> {
            None
        }
    }

    /// Always answers with the same point.
    pub(crate) struct FixedGeocoder(pub GeoPoint);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn locate(&self, _address: &Address) -> Option<GeoPoint> {
            Some(self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ScriptedProvider {
        name: &'static str,
        answers: Vec<(&'static str, GeoPoint)>,
        fail: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GeocodeProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.seen.lock().unwrap().push(format!("{}:{query}", self.name));
            if self.fail {
                return Err(GeocodeError::Malformed("boom".into()));
            }
            Ok(self
                .answers
                .iter()
                .find(|(q, _)| *q == query)
                .map(|(_, p)| *p))
        }
    }

    fn pune() -> Address {
        Address {
            street: "Karve Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            postal_code: "411004".into(),
        }
    }

    #[test]
    fn queries_start_with_postal_code() {
        let queries = candidate_queries(&pune());
        assert_eq!(
            queries,
            vec![
                "411004 India",
                "411004",
                "Karve Road Pune Maharashtra India",
                "Karve Road Pune Maharashtra",
                "Pune, Maharashtra, India",
            ]
        );
    }

    #[test]
    fn queries_skip_missing_parts() {
        let address = Address {
            city: "Goa".into(),
            ..Default::default()
        };
        assert_eq!(candidate_queries(&address), vec!["Goa India", "Goa", "Goa, India"]);
        assert_eq!(fallback_query(&address).as_deref(), Some("Goa India"));
        assert_eq!(fallback_query(&Address::default()), None);
    }

    #[test]
    fn parses_nominatim_string_coordinates() {
        let body = r#"[{"lat":"18.5204","lon":"73.8567","display_name":"Pune"}]"#;
        let point = parse_nominatim(body).unwrap().unwrap();
        assert!((point.lat - 18.5204).abs() < 1e-9);
        assert!((point.lng - 73.8567).abs() < 1e-9);
        assert_eq!(parse_nominatim("[]").unwrap(), None);
        assert!(parse_nominatim("{}").is_err());
    }

    #[test]
    fn parses_opencage_geometry() {
        let body = r#"{"results":[{"geometry":{"lat":19.07,"lng":72.87}}],"status":{"code":200}}"#;
        assert_eq!(
            parse_opencage(body).unwrap(),
            Some(GeoPoint { lat: 19.07, lng: 72.87 })
        );
        assert_eq!(parse_opencage(r#"{"results":[]}"#).unwrap(), None);
    }

    #[tokio::test]
    async fn failing_provider_falls_through_to_next() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hit = GeoPoint { lat: 1.0, lng: 2.0 };
        let chain = ChainedGeocoder::new(vec![
            Box::new(ScriptedProvider {
                name: "first",
                answers: vec![],
                fail: true,
                seen: seen.clone(),
            }),
            Box::new(ScriptedProvider {
                name: "second",
                answers: vec![("411004 India", hit)],
                fail: false,
                seen: seen.clone(),
            }),
        ]);

        assert_eq!(chain.locate(&pune()).await, Some(hit));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:411004 India", "second:411004 India"]
        );
    }

    #[tokio::test]
    async fn last_resort_query_is_tried() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hit = GeoPoint { lat: 3.0, lng: 4.0 };
        let chain = ChainedGeocoder::new(vec![Box::new(ScriptedProvider {
            name: "only",
            answers: vec![("411004 Karve Road Pune Maharashtra India", hit)],
            fail: false,
            seen: seen.clone(),
        })]);

        assert_eq!(chain.locate(&pune()).await, Some(hit));
        assert_eq!(seen.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn empty_address_skips_lookups() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainedGeocoder::new(vec![Box::new(ScriptedProvider {
            name: "only",
            answers: vec![],
            fail: false,
            seen: seen.clone(),
        })]);
        assert_eq!(chain.locate(&Address::default()).await, None);
        assert!(seen.lock().unwrap().is_empty());
    }
}
