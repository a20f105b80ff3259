//! # Capture Engine
//!
//! GPS capture engine for a walk-to-claim territory game.
//!
//! Players on one of several teams walk around a bounded real-world territory.
//! Walking a closed loop inside the territory claims the enclosed area for the
//! player's team; a newer capture takes contested ground away from other teams.
//!
//! This library provides:
//! - Anti-cheat filtering of raw GPS samples ([`GpsValidator`])
//! - Per-player loop detection ([`CaptureTracker`])
//! - A shared, thread-safe region registry with overlap resolution ([`RegionRegistry`])
//! - Per-team coverage scoring ([`Scoreboard`])
//!
//! ## Features
//!
//! - **`parallel`** - Compute per-team scores in parallel with rayon
//! - **`sync`** - In-memory shared region store with live subscriptions
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use capture_engine::{CaptureEngine, GpsPoint, Position, Team, Territory};
//!
//! let territory = Territory::new(&[
//!     GpsPoint::new(0.0, 0.0),
//!     GpsPoint::new(0.0, 0.02),
//!     GpsPoint::new(0.02, 0.02),
//!     GpsPoint::new(0.02, 0.0),
//! ]).unwrap();
//!
//! let engine = CaptureEngine::with_territory(territory);
//! let mut session = engine.session("player-1", Team::Red);
//!
//! let outcome = session.on_location_update(&Position::new(0.01, 0.01, 0));
//! assert!(outcome.in_territory);
//! assert!(!outcome.captured);
//! assert_eq!(engine.coverage_percent(Team::Red), 0.0);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use geo::Polygon;
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{CaptureError, CaptureResult, GeometryIssue};

pub mod geo_utils;

// Anti-cheat sample filter
pub mod validator;
pub use validator::{GpsValidator, RejectReason, ValidatorConfig, ValidatorStats, Verdict};

// Loop detection state machine
pub mod tracker;
pub use tracker::{CaptureConfig, CaptureProgress, CaptureTracker, ClosureRejection, TrackResult, TrackerState};

// Authoritative region set
pub mod registry;
pub use registry::{CommitReport, Region, RegionRegistry, RegistryConfig};

pub mod scoreboard;
pub use scoreboard::{compute_scoreboard, Scoreboard, TeamScore};

// Location cadence
pub mod source;
pub use source::{LocationThrottle, ThrottleConfig};

pub mod session;
pub use session::{CaptureEngine, LocationOutcome, PlayerSession};

// Map bridge payloads and store documents
pub mod messages;
pub use messages::{GeoJsonPolygon, MapMessage, MapRegion, PresenceDocument, RegionDelta, RegionDocument};

// Shared region store
#[cfg(feature = "sync")]
pub mod store;

#[cfg(feature = "sync")]
pub use store::{MemoryRegionStore, RegionStore, SyncedEngine};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("CaptureEngineRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use capture_engine::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a point falls inside the box (edges included).
    pub fn contains(&self, p: &GpsPoint) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lng
            && p.longitude <= self.max_lng
    }
}

/// A raw location sample as delivered by the device.
///
/// `speed_mps` and `accuracy_m` are optional because not every platform
/// reports them; missing values skip the corresponding validator rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
            speed_mps: None,
            accuracy_m: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Playing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Team {
    Red,
    Blue,
    Green,
}

impl Team {
    /// Every team, in display order.
    pub const ALL: [Team; 3] = [Team::Red, Team::Blue, Team::Green];

    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Red => "RED",
            Team::Blue => "BLUE",
            Team::Green => "GREEN",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Team {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Team::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CaptureError::Config(format!("unknown team '{}'", s)))
    }
}

/// The fixed playable area.
///
/// Validated once at startup and shared read-only between sessions.
#[derive(Debug, Clone)]
pub struct Territory {
    ring: Vec<GpsPoint>,
    bounds: Bounds,
    area_m2: f64,
    polygon: Polygon<f64>,
}

impl Territory {
    /// Build a territory from its boundary ring (open or closed).
    pub fn new(ring: &[GpsPoint]) -> CaptureResult<Self> {
        let ring = geo_utils::validate_ring(ring).map_err(CaptureError::InvalidTerritory)?;
        let bounds = Bounds::from_points(&ring)
            .ok_or(CaptureError::InvalidTerritory(GeometryIssue::TooFewVertices))?;
        let area_m2 = geo_utils::polygon_area(&ring);
        let polygon = geo_utils::to_geo_polygon(&ring, &[]);

        Ok(Self { ring, bounds, area_m2, polygon })
    }

    /// Boundary points count as inside.
    pub fn contains(&self, p: &GpsPoint) -> bool {
        self.bounds.contains(p) && geo_utils::point_in_polygon(p, &self.ring)
    }

    pub fn ring(&self) -> &[GpsPoint] {
        &self.ring
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn area_m2(&self) -> f64 {
        self.area_m2
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }
}

/// Startup configuration for a [`CaptureEngine`].
///
/// Every section falls back to its defaults when omitted, but a usable
/// configuration needs a territory ring.
///
/// ```
/// use capture_engine::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{
///     "territory": [
///         {"lat": 0.0, "lng": 0.0},
///         {"lat": 0.0, "lng": 0.01},
///         {"lat": 0.01, "lng": 0.01}
///     ],
///     "capture": {"closure_radius_m": 20.0}
/// }"#).unwrap();
///
/// assert_eq!(config.capture.closure_radius_m, 20.0);
/// assert_eq!(config.capture.min_loop_points, 10);
/// assert!(config.territory().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Territory boundary ring
    pub territory: Vec<GpsPoint>,
    pub validator: ValidatorConfig,
    pub capture: CaptureConfig,
    pub registry: RegistryConfig,
    pub throttle: ThrottleConfig,
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> CaptureResult<Self> {
        serde_json::from_str(json).map_err(|e| CaptureError::Config(e.to_string()))
    }

    /// Validate and build the configured territory.
    pub fn territory(&self) -> CaptureResult<Territory> {
        Territory::new(&self.territory)
    }
}

/// Wall clock in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use log::info;

    /// One player's handle on the engine, as seen from Kotlin/Swift.
    #[derive(uniffi::Object)]
    pub struct CaptureClient {
        session: Mutex<PlayerSession>,
    }

    impl CaptureClient {
        fn session(&self) -> MutexGuard<'_, PlayerSession> {
            self.session.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    #[uniffi::export]
    impl CaptureClient {
        /// Build an engine from a JSON configuration and open a session on it.
        #[uniffi::constructor]
        pub fn new(config_json: String, user_id: String, team: Team) -> Result<Arc<Self>, CaptureError> {
            init_logging();
            let config = EngineConfig::from_json(&config_json)?;
            let engine = CaptureEngine::from_config(config)?;
            info!("[CaptureEngineRust] Session opened for {} on {}", user_id, team);
            Ok(Arc::new(Self {
                session: Mutex::new(engine.session(&user_id, team)),
            }))
        }

        /// Feed a raw sample. Returns `None` when the sample was throttled.
        pub fn on_location_update(&self, raw: Position) -> Option<LocationOutcome> {
            self.session().offer_location(&raw)
        }

        /// Commit a captured loop for this player's team.
        pub fn on_capture_event(&self, polygon: Vec<GpsPoint>) -> Result<Region, CaptureError> {
            let report = self.session().on_capture_event(&polygon)?;
            info!(
                "[CaptureEngineRust] Captured region {} ({} shrunk, {} retired)",
                report.region.id,
                report.shrunk.len(),
                report.retired.len()
            );
            Ok(report.region)
        }

        pub fn coverage_percent(&self, team: Team) -> f64 {
            self.session().engine().coverage_percent(team)
        }

        pub fn region_count(&self, team: Team) -> u32 {
            self.session().engine().region_count(team) as u32
        }

        /// Replace the local region set with a snapshot from the shared store.
        pub fn apply_remote_regions(&self, regions: Vec<Region>) -> u32 {
            self.session().engine().apply_remote(regions) as u32
        }

        pub fn scoreboard(&self) -> Scoreboard {
            self.session().engine().scoreboard()
        }

        pub fn progress(&self) -> CaptureProgress {
            self.session().progress()
        }

        /// JSON `LOCATION_UPDATE` message for the map view, once a sample was accepted.
        pub fn map_update_json(&self) -> Option<String> {
            self.session()
                .location_message()
                .and_then(|m| serde_json::to_string(&m).ok())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
