//! Hospitals around a point, from OpenStreetMap via the Overpass API.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::geocoding::{GeoPoint, GeocodeError};

pub const DEFAULT_RADIUS_M: u32 = 2_000;
pub const MIN_RADIUS_M: u32 = 100;
pub const MAX_RADIUS_M: u32 = 20_000;

const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
const EARTH_RADIUS_KM: f64 = 6_371.0;
const UNNAMED: &str = "Unnamed Hospital";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyHospital {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub distance_km: f64,
}

#[async_trait]
pub trait HospitalLocator: Send + Sync {
    async fn around(
        &self,
        origin: GeoPoint,
        radius_m: u32,
    ) -> Result<Vec<NearbyHospital>, GeocodeError>;
}

pub fn clamp_radius(radius_m: Option<u32>) -> u32 {
    radius_m
        .unwrap_or(DEFAULT_RADIUS_M)
        .clamp(MIN_RADIUS_M, MAX_RADIUS_M)
}

/// Overpass QL for hospital nodes, ways and relations within the radius.
pub fn overpass_query(origin: GeoPoint, radius_m: u32) -> String {
    let around = format!("(around:{radius_m},{},{})", origin.lat, origin.lng);
    format!(
        "[out:json];(node[\"amenity\"=\"hospital\"]{around};\
         way[\"amenity\"=\"hospital\"]{around};\
         relation[\"amenity\"=\"hospital\"]{around};);out center;"
    )
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

// ─── Response parsing ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

fn address_from_tags(tags: &HashMap<String, String>) -> Option<String> {
    let parts: Vec<&str> = [
        "addr:housenumber",
        "addr:street",
        "addr:place",
        "addr:city",
        "addr:state",
    ]
    .iter()
    .filter_map(|key| tags.get(*key).map(String::as_str))
    .filter(|v| !v.trim().is_empty())
    .collect();
    if !parts.is_empty() {
        return Some(parts.join(", "));
    }
    tags.get("addr:full")
        .or_else(|| tags.get("operator"))
        .filter(|v| !v.trim().is_empty())
        .cloned()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Map Overpass elements to hospitals sorted by distance from `origin`.
/// Ways and relations use their `center`; elements without a position are skipped.
pub fn parse_overpass(body: &str, origin: GeoPoint) -> Result<Vec<NearbyHospital>, GeocodeError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;

    let mut hospitals: Vec<NearbyHospital> = response
        .elements
        .into_iter()
        .filter_map(|el| {
            let point = match (el.lat, el.lon, &el.center) {
                (Some(lat), Some(lng), _) => GeoPoint { lat, lng },
                (_, _, Some(c)) => GeoPoint {
                    lat: c.lat,
                    lng: c.lon,
                },
                _ => return None,
            };
            Some(NearbyHospital {
                name: el
                    .tags
                    .get("name")
                    .filter(|n| !n.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| UNNAMED.to_string()),
                lat: point.lat,
                lng: point.lng,
                address: address_from_tags(&el.tags),
                distance_km: round2(haversine_km(origin, point)),
            })
        })
        .collect();

    hospitals.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(hospitals)
}

// ─── Overpass client ──────────────────────────────────────────────────────────

pub struct Overpass {
    http: reqwest::Client,
}

impl Overpass {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HospitalLocator for Overpass {
    async fn around(
        &self,
        origin: GeoPoint,
        radius_m: u32,
    ) -> Result<Vec<NearbyHospital>, GeocodeError> {
        let query = overpass_query(origin, radius_m);
        let body = self
            .http
            .post(OVERPASS_URL)
            .form(&[("data", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let hospitals = parse_overpass(&body, origin)?;
        tracing::debug!(count = hospitals.len(), radius_m, "Overpass lookup");
        Ok(hospitals)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Returns the same hospitals for every origin.
    #[derive(Default)]
    pub(crate) struct FixedLocator(pub Vec<NearbyHospital>);

    #[async_trait]
    impl HospitalLocator for FixedLocator {
        async fn around(
            &self,
            _origin: GeoPoint,
            _radius_m: u32,
        ) -> Result<Vec<NearbyHospital>, GeocodeError> {
            Ok(self.0.clone())
        }
    }
}
