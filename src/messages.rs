//! Payloads exchanged with the outside world.
//!
//! Two audiences:
//!
//! - the map view, which receives tagged JSON messages ([`MapMessage`])
//! - the shared store, which keeps one document per region ([`RegionDocument`])
//!   and one presence document per player ([`PresenceDocument`])
//!
//! Region geometry leaves the engine as GeoJSON: `[longitude, latitude]`
//! positions, closed rings, exterior ring first.

use serde::{Deserialize, Serialize};
use crate::geo_utils::normalize_ring;
use crate::{CaptureError, CaptureResult, GpsPoint, Position, Region, Team};

/// Regions to add or replace and ids to remove, produced by one commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDelta {
    pub upserted: Vec<Region>,
    pub removed: Vec<String>,
}

impl RegionDelta {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// GeoJSON
// ============================================================================

/// A GeoJSON `Polygon` geometry.
///
/// Positions are written as `[lng, lat]`. Extra values such as altitude are
/// accepted on read and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonPolygon {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

impl GeoJsonPolygon {
    pub fn new(exterior: &[GpsPoint], holes: &[Vec<GpsPoint>]) -> Self {
        let mut coordinates = Vec::with_capacity(1 + holes.len());
        coordinates.push(closed_ring(exterior));
        coordinates.extend(holes.iter().map(|h| closed_ring(h)));
        Self {
            kind: "Polygon".to_string(),
            coordinates,
        }
    }

    /// Open exterior ring and holes. Fails on anything but a non-empty `Polygon`.
    pub fn rings(&self) -> Result<(Vec<GpsPoint>, Vec<Vec<GpsPoint>>), String> {
        if self.kind != "Polygon" {
            return Err(format!("expected Polygon geometry, got {}", self.kind));
        }
        let mut rings = Vec::with_capacity(self.coordinates.len());
        for ring in &self.coordinates {
            let points = ring
                .iter()
                .map(|position| match position.as_slice() {
                    [lng, lat, ..] => Ok(GpsPoint::new(*lat, *lng)),
                    short => Err(format!("position has {} value(s), need at least 2", short.len())),
                })
                .collect::<Result<Vec<_>, String>>()?;
            rings.push(normalize_ring(&points));
        }

        let mut rings = rings.into_iter();
        let exterior = rings.next().ok_or_else(|| "polygon has no rings".to_string())?;
        Ok((exterior, rings.collect()))
    }
}

fn closed_ring(ring: &[GpsPoint]) -> Vec<Vec<f64>> {
    let ring = normalize_ring(ring);
    let mut coords: Vec<Vec<f64>> = ring.iter().map(|p| vec![p.longitude, p.latitude]).collect();
    if let Some(first) = coords.first().cloned() {
        coords.push(first);
    }
    coords
}

// ============================================================================
// Map Bridge
// ============================================================================

/// A region as drawn by the map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub id: String,
    #[serde(rename = "ownerTeam")]
    pub owner_team: Team,
    pub polygon: GeoJsonPolygon,
}

impl From<&Region> for MapRegion {
    fn from(region: &Region) -> Self {
        Self {
            id: region.id.clone(),
            owner_team: region.owner_team,
            polygon: GeoJsonPolygon::new(&region.polygon, &region.holes),
        }
    }
}

/// Messages between the engine and the map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MapMessage {
    /// Sent by the map once it can accept updates.
    MapReady,
    /// Player marker and recent trail.
    LocationUpdate {
        #[serde(rename = "userLocation")]
        user_location: GpsPoint,
        /// Most recent in-territory points, oldest first
        #[serde(rename = "userPath")]
        user_path: Vec<GpsPoint>,
        #[serde(rename = "userTeam")]
        team: Team,
    },
    /// Regions to draw or replace, and regions to erase.
    RegionDelta {
        upserted: Vec<MapRegion>,
        removed: Vec<String>,
    },
}

impl MapMessage {
    pub fn region_delta(delta: &RegionDelta) -> Self {
        MapMessage::RegionDelta {
            upserted: delta.upserted.iter().map(MapRegion::from).collect(),
            removed: delta.removed.clone(),
        }
    }

    pub fn to_json(&self) -> CaptureResult<String> {
        serde_json::to_string(self).map_err(|e| CaptureError::Message(e.to_string()))
    }

    pub fn from_json(json: &str) -> CaptureResult<Self> {
        serde_json::from_str(json).map_err(|e| CaptureError::Message(e.to_string()))
    }
}

// ============================================================================
// Store Documents
// ============================================================================

/// A region as kept in the shared store.
///
/// `polygonData` holds the GeoJSON polygon serialized to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDocument {
    /// Document key
    #[serde(default)]
    pub id: String,
    pub owner_team: Team,
    pub polygon_data: String,
    /// Milliseconds since the Unix epoch
    pub captured_at: i64,
    pub captured_by: String,
}

impl RegionDocument {
    pub fn from_region(region: &Region) -> CaptureResult<Self> {
        let geometry = GeoJsonPolygon::new(&region.polygon, &region.holes);
        let polygon_data = serde_json::to_string(&geometry).map_err(|e| CaptureError::Document {
            id: region.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id: region.id.clone(),
            owner_team: region.owner_team,
            polygon_data,
            captured_at: region.captured_at_ms,
            captured_by: region.captured_by.clone(),
        })
    }

    /// Decode the document. Geometry is checked later, when the region is loaded.
    pub fn to_region(&self) -> CaptureResult<Region> {
        let malformed = |reason: String| CaptureError::Document {
            id: self.id.clone(),
            reason,
        };
        let geometry: GeoJsonPolygon =
            serde_json::from_str(&self.polygon_data).map_err(|e| malformed(e.to_string()))?;
        let (polygon, holes) = geometry.rings().map_err(malformed)?;

        Ok(Region {
            id: self.id.clone(),
            owner_team: self.owner_team,
            polygon,
            holes,
            captured_at_ms: self.captured_at,
            captured_by: self.captured_by.clone(),
        })
    }
}

/// `{lat, lng}` pair as written to presence documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Last known location of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceDocument {
    pub last_location: LatLng,
    /// Milliseconds since the Unix epoch
    pub last_update: i64,
}

impl From<&Position> for PresenceDocument {
    fn from(p: &Position) -> Self {
        Self {
            last_location: LatLng {
                lat: p.latitude,
                lng: p.longitude,
            },
            last_update: p.timestamp_ms,
        }
    }
}
