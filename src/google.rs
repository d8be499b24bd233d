//! Google Maps backed [`Geocoder`] and [`PlaceSearch`].
//!
//! Geocoding uses the Geocoding API; text search uses Places API (New)
//! `places:searchText` with a circular location bias around the destination.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlacesError;
use crate::places::{Coordinates, Geocoder, PlaceSearch, PlaceSearchResult};

pub const API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

const GEOCODING_BASE_URL: &str = "https://maps.googleapis.com";
const PLACES_BASE_URL: &str = "https://places.googleapis.com";
const FIELD_MASK: &str =
    "places.name,places.id,places.displayName,places.formattedAddress,places.location";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RESULTS: u8 = 6;
/// Largest bias radius the Places API accepts.
const MAX_RADIUS_M: u32 = 50_000;

pub struct GooglePlacesClient {
    http: reqwest::Client,
    api_key: String,
    geocoding_base: String,
    places_base: String,
    max_results: u8,
}

impl fmt::Debug for GooglePlacesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GooglePlacesClient")
            .field("api_key", &"<redacted>")
            .field("geocoding_base", &self.geocoding_base)
            .field("places_base", &self.places_base)
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl GooglePlacesClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, PlacesError> {
        Self::with_base_urls(api_key, GEOCODING_BASE_URL, PLACES_BASE_URL)
    }

    /// Reads the key from `GOOGLE_MAPS_API_KEY`.
    pub fn from_env() -> Result<Self, PlacesError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Self::new(key.trim()),
            _ => Err(PlacesError::MissingApiKey),
        }
    }

    /// Point both APIs at other hosts, e.g. a local test server.
    pub fn with_base_urls(
        api_key: impl Into<String>,
        geocoding_base: impl Into<String>,
        places_base: impl Into<String>,
    ) -> Result<Self, PlacesError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PlacesError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(http_error)?;
        Ok(Self {
            http,
            api_key,
            geocoding_base: geocoding_base.into().trim_end_matches('/').to_string(),
            places_base: places_base.into().trim_end_matches('/').to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    /// Cap on results requested per text search (the API allows 1..=20).
    pub fn with_max_results(mut self, max_results: u8) -> Self {
        self.max_results = max_results.clamp(1, 20);
        self
    }
}

/// The geocoding URL carries the key in its query string; keep it out of errors and logs.
fn http_error(e: reqwest::Error) -> PlacesError {
    PlacesError::Http(e.without_url())
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl Geocoder for GooglePlacesClient {
    async fn geocode(&self, city: &str, country: &str) -> Result<Coordinates, PlacesError> {
        let address = format!("{}, {}", city, country);
        let response = self
            .http
            .get(format!("{}/maps/api/geocode/json", self.geocoding_base))
            .query(&[("address", address.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GeocodeResponse = response.json().await.map_err(http_error)?;
        match parsed.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(PlacesError::NotFound(address)),
            other => {
                warn!(status = other, "geocoding API refused request");
                return Err(PlacesError::Api {
                    status: status.as_u16(),
                    message: match parsed.error_message {
                        Some(detail) => format!("{}: {}", other, detail),
                        None => other.to_string(),
                    },
                });
            }
        }

        let location = parsed
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)
            .ok_or_else(|| PlacesError::NotFound(address.clone()))?;

        debug!(%address, lat = location.lat, lng = location.lng, "destination geocoded");
        Ok(Coordinates {
            latitude: location.lat,
            longitude: location.lng,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchTextRequest<'a> {
    text_query: &'a str,
    max_result_count: u8,
    location_bias: LocationBias,
}

#[derive(Serialize)]
struct LocationBias {
    circle: Circle,
}

#[derive(Serialize)]
struct Circle {
    center: Coordinates,
    radius: f64,
}

#[derive(Deserialize)]
struct SearchTextResponse {
    #[serde(default)]
    places: Vec<Place>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    /// Resource name, `places/<id>`.
    name: Option<String>,
    id: Option<String>,
    display_name: Option<LocalizedText>,
    formatted_address: Option<String>,
    location: Option<Coordinates>,
}

#[derive(Deserialize)]
struct LocalizedText {
    text: String,
}

impl Place {
    fn into_result(self) -> Option<PlaceSearchResult> {
        let place_id = self.name.or(self.id)?;
        let name = self.display_name?.text;
        Some(PlaceSearchResult {
            name,
            place_id,
            address: self.formatted_address,
            location: self.location,
        })
    }
}

#[async_trait]
impl PlaceSearch for GooglePlacesClient {
    async fn search_text(
        &self,
        query: &str,
        near: Coordinates,
        radius_m: u32,
    ) -> Result<Vec<PlaceSearchResult>, PlacesError> {
        let body = SearchTextRequest {
            text_query: query,
            max_result_count: self.max_results,
            location_bias: LocationBias {
                circle: Circle {
                    center: near,
                    radius: f64::from(radius_m.min(MAX_RADIUS_M)),
                },
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/places:searchText", self.places_base))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchTextResponse = response.json().await.map_err(http_error)?;
        let results: Vec<PlaceSearchResult> = parsed
            .places
            .into_iter()
            .filter_map(Place::into_result)
            .collect();
        debug!(query, hits = results.len(), "place text search");
        Ok(results)
    }
}
