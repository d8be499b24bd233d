//! Geocoding and place-search collaborators used during candidate resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlacesError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One hit from a place text search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSearchResult {
    pub name: String,
    /// Bare id or a `places/<id>` resource name.
    pub place_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
}

/// Turns a destination into coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, city: &str, country: &str) -> Result<Coordinates, PlacesError>;
}

/// Finds places matching free text near a point.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search_text(
        &self,
        query: &str,
        near: Coordinates,
        radius_m: u32,
    ) -> Result<Vec<PlaceSearchResult>, PlacesError>;
}
