//! # Region Registry
//!
//! The authoritative set of captured regions, shared by every player session.
//!
//! ## Overlap resolution
//!
//! A newer capture wins contested ground. When a committed polygon overlaps a
//! region owned by another team, that region becomes `old - new`:
//!
//! - nothing left: the region is retired
//! - one piece left: the region shrinks in place
//! - several pieces left: the largest piece keeps the region id, every other
//!   piece becomes a new region with a fresh id
//!
//! A piece whose outline touches itself at a vertex (a capture that meets the
//! old boundary at a single point) is split there, so every stored exterior is a
//! simple ring. Pieces smaller than [`RegistryConfig::min_remnant_area_m2`] are
//! slivers and are dropped. Regions of the committing team are left untouched; coverage is
//! computed on the union of a team's regions so duplicates are harmless.
//!
//! All mutations happen under a single lock, so resolution always sees a
//! consistent snapshot. Concurrent commits are applied in lock order.

use std::sync::{Mutex, MutexGuard, PoisonError};
use geo::{BooleanOps, Polygon};
use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::geo_utils::{
    from_geo_polygon, multipolygon_area, point_in_polygon, shape_area, simple_parts,
    to_geo_polygon, to_multi, validate_ring,
};
use crate::messages::RegionDelta;
use crate::{now_ms, scoreboard, Bounds, CaptureError, CaptureResult, GpsPoint, Team, Territory};

/// Overlap resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RegistryConfig {
    /// Remnants smaller than this are discarded after a region is cut.
    /// Default: 1.0 m²
    pub min_remnant_area_m2: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { min_remnant_area_m2: 1.0 }
    }
}

/// A team-owned captured area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Region {
    /// UUID v4 string
    pub id: String,
    pub owner_team: Team,
    /// Exterior ring, open (first vertex not repeated)
    pub polygon: Vec<GpsPoint>,
    /// Interior rings left behind by later captures inside this region
    #[serde(default)]
    pub holes: Vec<Vec<GpsPoint>>,
    pub captured_at_ms: i64,
    pub captured_by: String,
}

impl Region {
    /// Area of the region (exterior minus holes) in m².
    pub fn area_m2(&self) -> f64 {
        shape_area(&self.polygon, &self.holes)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.polygon)
    }

    pub fn to_geo(&self) -> Polygon<f64> {
        to_geo_polygon(&self.polygon, &self.holes)
    }

    fn with_geometry(
        &self,
        id: String,
        polygon: Vec<GpsPoint>,
        holes: Vec<Vec<GpsPoint>>,
    ) -> Region {
        Region {
            id,
            owner_team: self.owner_team,
            polygon,
            holes,
            captured_at_ms: self.captured_at_ms,
            captured_by: self.captured_by.clone(),
        }
    }
}

/// Everything a commit changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    /// The newly inserted region
    pub region: Region,
    /// Existing regions that lost area, with their new geometry
    pub shrunk: Vec<Region>,
    /// New regions split off from existing ones
    pub split_off: Vec<Region>,
    /// Ids of regions that lost all their area
    pub retired: Vec<String>,
}

impl CommitReport {
    /// Delta to broadcast to the map and persist to the shared store.
    pub fn delta(&self) -> RegionDelta {
        let mut upserted = Vec::with_capacity(1 + self.shrunk.len() + self.split_off.len());
        upserted.push(self.region.clone());
        upserted.extend(self.shrunk.iter().cloned());
        upserted.extend(self.split_off.iter().cloned());
        RegionDelta {
            upserted,
            removed: self.retired.clone(),
        }
    }
}

// ============================================================================
// Spatial Index
// ============================================================================

/// Bounding box of the region stored at `slot`.
#[derive(Debug, Clone)]
struct RegionEnvelope {
    slot: usize,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.min_lng, self.min_lat],
            [self.max_lng, self.max_lat],
        )
    }
}

#[derive(Default)]
struct RegistryState {
    regions: Vec<Region>,
    index: RTree<RegionEnvelope>,
}

impl RegistryState {
    fn rebuild_index(&mut self) {
        let envelopes: Vec<RegionEnvelope> = self
            .regions
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| {
                r.bounds().map(|b| RegionEnvelope {
                    slot,
                    min_lat: b.min_lat,
                    max_lat: b.max_lat,
                    min_lng: b.min_lng,
                    max_lng: b.max_lng,
                })
            })
            .collect();
        self.index = RTree::bulk_load(envelopes);
    }

    /// Slots of regions whose bounding box touches `bounds`, in insertion order.
    fn candidates(&self, bounds: &Bounds) -> Vec<usize> {
        let search = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );
        let mut slots: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&search)
            .map(|e| e.slot)
            .collect();
        slots.sort_unstable();
        slots
    }
}

/// Hole rings of `region_id` that are valid and lie inside `exterior`.
///
/// Everything else is logged and dropped.
fn usable_holes(
    region_id: &str,
    exterior: &[GpsPoint],
    holes: Vec<Vec<GpsPoint>>,
) -> Vec<Vec<GpsPoint>> {
    holes
        .into_iter()
        .filter_map(|hole| match validate_ring(&hole) {
            Ok(ring) if ring.iter().all(|p| point_in_polygon(p, exterior)) => Some(ring),
            Ok(_) => {
                warn!("[Registry] Dropping hole outside region {}", region_id);
                None
            }
            Err(issue) => {
                warn!("[Registry] Dropping hole of region {}: {}", region_id, issue);
                None
            }
        })
        .collect()
}

/// What overlap resolution decided for one existing region.
enum Cut {
    Retire,
    Keep { kept: Region, split_off: Vec<Region> },
}

// ============================================================================
// Registry
// ============================================================================

/// Thread-safe region collection. Share it with `Arc<RegionRegistry>`.
pub struct RegionRegistry {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl RegionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a captured polygon, resolve overlaps and insert it.
    ///
    /// Returns [`CaptureError::InvalidGeometry`] without touching the registry
    /// when the polygon is degenerate.
    pub fn commit(&self, polygon: &[GpsPoint], team: Team, user_id: &str) -> CaptureResult<Region> {
        self.commit_with_report(polygon, team, user_id, now_ms())
            .map(|report| report.region)
    }

    /// Like [`commit`](Self::commit), also reporting every region the commit changed.
    pub fn commit_with_report(
        &self,
        polygon: &[GpsPoint],
        team: Team,
        user_id: &str,
        captured_at_ms: i64,
    ) -> CaptureResult<CommitReport> {
        let ring = validate_ring(polygon).map_err(CaptureError::InvalidGeometry)?;
        let bounds = Bounds::from_points(&ring)
            .ok_or(CaptureError::InvalidGeometry(crate::GeometryIssue::TooFewVertices))?;

        let region = Region {
            id: Uuid::new_v4().to_string(),
            owner_team: team,
            polygon: ring,
            holes: Vec::new(),
            captured_at_ms,
            captured_by: user_id.to_string(),
        };
        let incoming = to_multi(region.to_geo());

        let mut state = self.lock();

        let mut cuts: Vec<(usize, Cut)> = Vec::new();
        for slot in state.candidates(&bounds) {
            let existing = &state.regions[slot];
            if existing.owner_team == team {
                continue;
            }

            let current = to_multi(existing.to_geo());
            if multipolygon_area(&current.intersection(&incoming)) <= 0.0 {
                continue;
            }

            let mut pieces = self.remnants(&existing.id, &current.difference(&incoming).0);
            pieces.sort_by(|a, b| b.0.total_cmp(&a.0));

            let mut pieces = pieces.into_iter().map(|(_, ring, holes)| (ring, holes));
            let cut = match pieces.next() {
                None => Cut::Retire,
                Some((ring, holes)) => Cut::Keep {
                    kept: existing.with_geometry(existing.id.clone(), ring, holes),
                    split_off: pieces
                        .map(|(ring, holes)| {
                            existing.with_geometry(Uuid::new_v4().to_string(), ring, holes)
                        })
                        .collect(),
                },
            };
            cuts.push((slot, cut));
        }

        let mut report = CommitReport {
            region: region.clone(),
            shrunk: Vec::new(),
            split_off: Vec::new(),
            retired: Vec::new(),
        };

        // Apply in descending slot order so earlier slots stay valid
        for (slot, cut) in cuts.into_iter().rev() {
            match cut {
                Cut::Retire => {
                    let old = state.regions.remove(slot);
                    debug!("[Registry] Retired {} ({})", old.id, old.owner_team);
                    report.retired.push(old.id);
                }
                Cut::Keep { kept, split_off } => {
                    debug!(
                        "[Registry] Cut {} ({}) down to {:.0} m², {} piece(s) split off",
                        kept.id,
                        kept.owner_team,
                        kept.area_m2(),
                        split_off.len()
                    );
                    state.regions[slot] = kept.clone();
                    report.shrunk.push(kept);
                    report.split_off.extend(split_off);
                }
            }
        }
        report.retired.reverse();
        report.shrunk.reverse();

        state.regions.extend(report.split_off.iter().cloned());
        state.regions.push(region);
        state.rebuild_index();

        info!(
            "[Registry] {} captured {:.0} m² for {} ({} shrunk, {} split, {} retired, {} regions)",
            user_id,
            report.region.area_m2(),
            team,
            report.shrunk.len(),
            report.split_off.len(),
            report.retired.len(),
            state.regions.len()
        );

        Ok(report)
    }

    /// Turn what `difference` left of region `region_id` into storable pieces.
    ///
    /// Pinched outlines are split into simple rings first. Pieces whose exterior
    /// still fails validation, or whose area is below the remnant threshold, are
    /// dropped. Each piece comes with its area.
    fn remnants(
        &self,
        region_id: &str,
        remains: &[Polygon<f64>],
    ) -> Vec<(f64, Vec<GpsPoint>, Vec<Vec<GpsPoint>>)> {
        remains
            .iter()
            .flat_map(|polygon| {
                let (exterior, holes) = from_geo_polygon(polygon);
                simple_parts(&exterior, &holes)
            })
            .filter_map(|(exterior, holes)| match validate_ring(&exterior) {
                Ok(ring) => {
                    let holes = usable_holes(region_id, &ring, holes);
                    Some((shape_area(&ring, &holes), ring, holes))
                }
                Err(issue) => {
                    if shape_area(&exterior, &holes) >= self.config.min_remnant_area_m2 {
                        warn!("[Registry] Dropping unusable piece of {}: {}", region_id, issue);
                    }
                    None
                }
            })
            .filter(|(area, ..)| *area >= self.config.min_remnant_area_m2)
            .collect()
    }

    /// Percentage of the territory covered by `team`, in [0, 100], one decimal.
    pub fn coverage_percent(&self, team: Team, territory: &Territory) -> f64 {
        let regions = self.regions();
        scoreboard::team_coverage(&regions, team, territory).1
    }

    pub fn region_count(&self, team: Team) -> usize {
        self.lock().regions.iter().filter(|r| r.owner_team == team).count()
    }

    /// Snapshot of every region, in insertion order.
    pub fn regions(&self) -> Vec<Region> {
        self.lock().regions.clone()
    }

    pub fn region(&self, id: &str) -> Option<Region> {
        self.lock().regions.iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().regions.is_empty()
    }

    /// Replace the whole region set, e.g. from the shared store's live subscription.
    ///
    /// Regions with an unusable exterior are skipped, and holes that are invalid
    /// or outside their exterior are dropped. A repeated id keeps the last copy.
    /// Returns the number of regions loaded.
    pub fn load_snapshot(&self, regions: Vec<Region>) -> usize {
        let mut accepted: Vec<Region> = Vec::with_capacity(regions.len());
        for mut region in regions {
            match validate_ring(&region.polygon) {
                Ok(ring) => region.polygon = ring,
                Err(issue) => {
                    warn!("[Registry] Skipping region {} from snapshot: {}", region.id, issue);
                    continue;
                }
            }
            let holes = std::mem::take(&mut region.holes);
            region.holes = usable_holes(&region.id, &region.polygon, holes);
            if let Some(pos) = accepted.iter().position(|r| r.id == region.id) {
                accepted.remove(pos);
            }
            accepted.push(region);
        }

        let mut state = self.lock();
        state.regions = accepted;
        state.rebuild_index();
        debug!("[Registry] Loaded snapshot of {} regions", state.regions.len());
        state.regions.len()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use crate::geo_utils::{intersection_area, is_simple_ring, polygon_area};
    use crate::GeometryIssue;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn square(lat: f64, lng: f64, size: f64) -> Vec<GpsPoint> {
        vec![
            GpsPoint::new(lat, lng),
            GpsPoint::new(lat, lng + size),
            GpsPoint::new(lat + size, lng + size),
            GpsPoint::new(lat + size, lng),
        ]
    }

    fn rect(lat: f64, lng: f64, height: f64, width: f64) -> Vec<GpsPoint> {
        vec![
            GpsPoint::new(lat, lng),
            GpsPoint::new(lat, lng + width),
            GpsPoint::new(lat + height, lng + width),
            GpsPoint::new(lat + height, lng),
        ]
    }

    fn territory() -> Territory {
        Territory::new(&square(0.0, 0.0, 0.02)).unwrap()
    }

    fn team_area(registry: &RegionRegistry, team: Team) -> f64 {
        registry
            .regions()
            .iter()
            .filter(|r| r.owner_team == team)
            .map(Region::area_m2)
            .sum()
    }

    #[test]
    fn test_commit_inserts_region() {
        let registry = RegionRegistry::default();
        let region = registry.commit(&square(0.0, 0.0, 0.001), Team::Red, "alice").unwrap();

        assert_eq!(region.owner_team, Team::Red);
        assert_eq!(region.captured_by, "alice");
        assert_eq!(region.polygon.len(), 4);
        assert!(Uuid::parse_str(&region.id).is_ok());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.region(&region.id), Some(region));
    }

    #[test]
    fn test_invalid_geometry_leaves_registry_untouched() {
        let registry = RegionRegistry::default();
        registry.commit(&square(0.0, 0.0, 0.001), Team::Red, "alice").unwrap();
        let before = registry.regions();

        let two = [GpsPoint::new(0.0, 0.0), GpsPoint::new(0.001, 0.001)];
        assert_eq!(
            registry.commit(&two, Team::Blue, "bob").unwrap_err(),
            CaptureError::InvalidGeometry(GeometryIssue::TooFewVertices)
        );

        let bow_tie = [
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.001, 0.001),
            GpsPoint::new(0.0, 0.001),
            GpsPoint::new(0.001, 0.0),
        ];
        assert_eq!(
            registry.commit(&bow_tie, Team::Blue, "bob").unwrap_err(),
            CaptureError::InvalidGeometry(GeometryIssue::SelfIntersecting)
        );

        assert_eq!(registry.regions(), before);
    }

    #[test]
    fn test_newer_capture_shrinks_other_team() {
        let registry = RegionRegistry::default();
        let red = registry.commit(&square(0.0, 0.0, 0.002), Team::Red, "alice").unwrap();
        let report = registry
            .commit_with_report(&square(0.001, 0.001, 0.002), Team::Blue, "bob", 10)
            .unwrap();

        assert_eq!(report.shrunk.len(), 1);
        assert_eq!(report.shrunk[0].id, red.id);
        assert!(report.split_off.is_empty());
        assert!(report.retired.is_empty());

        // Red keeps three quarters of its square
        let expected = polygon_area(&square(0.0, 0.0, 0.002)) * 0.75;
        assert!(approx_eq(team_area(&registry, Team::Red), expected, 1.0));

        let shrunk = registry.region(&red.id).unwrap();
        assert!(approx_eq(intersection_area(&shrunk.polygon, &report.region.polygon), 0.0, 1e-3));
    }

    #[test]
    fn test_fully_covered_region_is_retired() {
        let registry = RegionRegistry::default();
        let blue = registry.commit(&square(0.001, 0.001, 0.001), Team::Blue, "bob").unwrap();
        let report = registry
            .commit_with_report(&square(0.0, 0.0, 0.003), Team::Red, "alice", 10)
            .unwrap();

        assert_eq!(report.retired, vec![blue.id.clone()]);
        assert!(registry.region(&blue.id).is_none());
        assert_eq!(registry.region_count(Team::Blue), 0);

        let delta = report.delta();
        assert_eq!(delta.removed, vec![blue.id]);
        assert_eq!(delta.upserted, vec![report.region.clone()]);
    }

    #[test]
    fn test_strip_across_region_splits_it() {
        let registry = RegionRegistry::default();
        let blue = registry.commit(&rect(0.0, 0.0, 0.001, 0.003), Team::Blue, "bob").unwrap();

        // Vertical strip through the middle third
        let report = registry
            .commit_with_report(&rect(-0.001, 0.001, 0.003, 0.001), Team::Red, "alice", 10)
            .unwrap();

        assert_eq!(report.shrunk.len(), 1);
        assert_eq!(report.shrunk[0].id, blue.id);
        assert_eq!(report.split_off.len(), 1);
        assert_ne!(report.split_off[0].id, blue.id);
        assert_eq!(report.split_off[0].owner_team, Team::Blue);
        assert_eq!(registry.region_count(Team::Blue), 2);

        let third = polygon_area(&square(0.0, 0.0, 0.001));
        assert!(approx_eq(report.shrunk[0].area_m2(), third, 1.0));
        assert!(approx_eq(report.split_off[0].area_m2(), third, 1.0));
        assert_eq!(report.delta().upserted.len(), 3);
    }

    #[test]
    fn test_capture_inside_region_leaves_hole() {
        let registry = RegionRegistry::default();
        let red = registry.commit(&square(0.0, 0.0, 0.003), Team::Red, "alice").unwrap();
        registry.commit(&square(0.001, 0.001, 0.001), Team::Blue, "bob").unwrap();

        let red = registry.region(&red.id).unwrap();
        assert_eq!(red.holes.len(), 1);
        let expected = polygon_area(&square(0.0, 0.0, 0.003)) - polygon_area(&square(0.0, 0.0, 0.001));
        assert!(approx_eq(red.area_m2(), expected, 1.0));
    }

    /// Every stored ring passes the checks a replica applies when loading.
    fn assert_storable(registry: &RegionRegistry) {
        for region in registry.regions() {
            assert_eq!(validate_ring(&region.polygon).as_ref(), Ok(&region.polygon), "{}", region.id);
            for hole in &region.holes {
                assert!(is_simple_ring(hole), "hole of {}", region.id);
            }
        }

        let replica = RegionRegistry::default();
        assert_eq!(replica.load_snapshot(registry.regions()), registry.len());
        assert_eq!(replica.regions(), registry.regions());
    }

    #[test]
    fn test_cut_touching_old_boundary_at_a_vertex() {
        let unit = polygon_area(&square(0.0, 0.0, 0.001));

        // Diamond inside Blue, its apex on Blue's top edge
        let registry = RegionRegistry::default();
        registry.commit(&square(0.0, 0.0, 0.004), Team::Blue, "bob").unwrap();
        let diamond = vec![
            GpsPoint::new(0.004, 0.002),
            GpsPoint::new(0.003, 0.003),
            GpsPoint::new(0.002, 0.002),
            GpsPoint::new(0.003, 0.001),
        ];
        registry.commit(&diamond, Team::Red, "alice").unwrap();

        assert_eq!(registry.region_count(Team::Blue), 1);
        assert!(approx_eq(team_area(&registry, Team::Blue), 14.0 * unit, 0.01 * unit));
        assert_storable(&registry);

        // Wedge from above whose tip touches Blue's bottom edge, leaving two
        // halves that meet at the tip
        let registry = RegionRegistry::default();
        registry.commit(&square(0.0, 0.0, 0.004), Team::Blue, "bob").unwrap();
        let wedge = vec![
            GpsPoint::new(0.0, 0.002),
            GpsPoint::new(0.005, 0.003),
            GpsPoint::new(0.005, 0.001),
        ];
        registry.commit(&wedge, Team::Red, "alice").unwrap();

        assert_eq!(registry.region_count(Team::Blue), 2);
        assert!(approx_eq(team_area(&registry, Team::Blue), 12.8 * unit, 0.01 * unit));
        assert_storable(&registry);
    }

    #[test]
    fn test_contested_commits_always_storable() {
        // Deterministic linear congruential sequence in [0, 1)
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };

        let registry = RegionRegistry::default();
        let mut corners: Vec<GpsPoint> = Vec::new();
        for i in 0..60 {
            let team = Team::ALL[(next() * 3.0) as usize % 3];
            let polygon = if i % 3 == 2 && !corners.is_empty() {
                // Square hanging off an earlier capture's corner
                let corner = corners[(next() * corners.len() as f64) as usize];
                square(corner.latitude, corner.longitude, 0.0005 + next() * 0.001)
            } else {
                // Rotated square
                let (lat, lng) = (0.001 + next() * 0.004, 0.001 + next() * 0.004);
                let radius = 0.0003 + next() * 0.001;
                let angle = next() * std::f64::consts::FRAC_PI_2;
                (0..4)
                    .map(|k| {
                        let a = angle + k as f64 * std::f64::consts::FRAC_PI_2;
                        GpsPoint::new(lat + radius * a.sin(), lng + radius * a.cos())
                    })
                    .collect()
            };
            corners.extend(polygon.iter().copied());
            registry.commit_with_report(&polygon, team, "walker", i as i64).unwrap();
        }

        assert_storable(&registry);

        let regions = registry.regions();
        for a in &regions {
            for b in regions.iter().filter(|b| b.owner_team != a.owner_team) {
                let shared = to_multi(a.to_geo()).intersection(&to_multi(b.to_geo()));
                assert!(multipolygon_area(&shared) < 1.0);
            }
        }
    }

    #[test]
    fn test_same_team_overlap_left_in_place() {
        let registry = RegionRegistry::default();
        let t = territory();
        registry.commit(&square(0.0, 0.0, 0.01), Team::Red, "alice").unwrap();
        let once = registry.coverage_percent(Team::Red, &t);

        registry.commit(&square(0.0, 0.0, 0.01), Team::Red, "carol").unwrap();
        assert_eq!(registry.region_count(Team::Red), 2);
        assert_eq!(registry.coverage_percent(Team::Red, &t), once);
        assert_eq!(once, 25.0);
    }

    #[test]
    fn test_coverage_bounds() {
        let registry = RegionRegistry::default();
        let t = territory();

        registry.commit(&square(0.0, 0.0, 0.01), Team::Red, "alice").unwrap();
        registry.commit(&square(0.005, 0.005, 0.01), Team::Blue, "bob").unwrap();
        // Mostly outside the territory
        registry.commit(&square(0.015, 0.015, 0.01), Team::Green, "carol").unwrap();

        let red = registry.coverage_percent(Team::Red, &t);
        let blue = registry.coverage_percent(Team::Blue, &t);
        let green = registry.coverage_percent(Team::Green, &t);

        assert!(approx_eq(red, 18.8, 0.11));
        assert!(approx_eq(blue, 25.0, 0.11));
        assert!(approx_eq(green, 6.3, 0.11));
        for pct in [red, blue, green] {
            assert!((0.0..=100.0).contains(&pct));
        }
        assert!(red + blue + green <= 100.0 + 0.15);
    }

    #[test]
    fn test_coverage_clamped_to_territory() {
        let registry = RegionRegistry::default();
        let t = territory();
        registry.commit(&square(-0.01, -0.01, 0.05), Team::Green, "carol").unwrap();
        assert_eq!(registry.coverage_percent(Team::Green, &t), 100.0);
        assert_eq!(registry.coverage_percent(Team::Red, &t), 0.0);
    }

    #[test]
    fn test_load_snapshot_skips_bad_regions() {
        let registry = RegionRegistry::default();
        registry.commit(&square(0.0, 0.0, 0.001), Team::Red, "alice").unwrap();

        let good = Region {
            id: "a".to_string(),
            owner_team: Team::Blue,
            polygon: square(0.002, 0.002, 0.001),
            holes: vec![],
            captured_at_ms: 1,
            captured_by: "bob".to_string(),
        };
        let bad = Region {
            id: "b".to_string(),
            polygon: vec![GpsPoint::new(0.0, 0.0)],
            ..good.clone()
        };
        let newer = Region { captured_at_ms: 2, ..good.clone() };

        assert_eq!(registry.load_snapshot(vec![good, bad, newer]), 1);
        assert_eq!(registry.region("a").map(|r| r.captured_at_ms), Some(2));
        assert_eq!(registry.region_count(Team::Red), 0);

        // Loaded regions take part in overlap resolution
        registry.commit(&square(0.0015, 0.0015, 0.002), Team::Red, "alice").unwrap();
        assert!(team_area(&registry, Team::Blue) < polygon_area(&square(0.0, 0.0, 0.001)));
    }

    #[test]
    fn test_load_snapshot_drops_unusable_holes() {
        let registry = RegionRegistry::default();
        let holed = Region {
            id: "c".to_string(),
            owner_team: Team::Green,
            polygon: square(0.0, 0.0, 0.003),
            holes: vec![
                square(0.001, 0.001, 0.001),
                // Degenerate
                vec![GpsPoint::new(0.001, 0.001), GpsPoint::new(0.002, 0.002)],
                // Outside the exterior
                square(0.01, 0.01, 0.001),
            ],
            captured_at_ms: 1,
            captured_by: "carol".to_string(),
        };

        assert_eq!(registry.load_snapshot(vec![holed]), 1);
        let holed = registry.region("c").unwrap();
        assert_eq!(holed.holes, vec![square(0.001, 0.001, 0.001)]);
        let expected = polygon_area(&square(0.0, 0.0, 0.003)) - polygon_area(&square(0.0, 0.0, 0.001));
        assert!(approx_eq(holed.area_m2(), expected, 1.0));
    }

    #[test]
    fn test_concurrent_commits_are_serialized() {
        let registry = Arc::new(RegionRegistry::default());
        let handles: Vec<_> = Team::ALL
            .into_iter()
            .enumerate()
            .map(|(row, team)| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for col in 0..10 {
                        let lat = row as f64 * 0.002;
                        let lng = col as f64 * 0.002;
                        registry.commit(&square(lat, lng, 0.001), team, "worker").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 30);
        for team in Team::ALL {
            assert_eq!(registry.region_count(team), 10);
        }
    }

    #[test]
    fn test_contested_commits_never_share_area() {
        let registry = Arc::new(RegionRegistry::default());
        let handles: Vec<_> = [(Team::Red, 0.0), (Team::Blue, 0.0005)]
            .into_iter()
            .map(|(team, offset)| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..5 {
                        let base = offset + i as f64 * 0.0001;
                        registry.commit(&square(base, base, 0.001), team, "worker").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let regions = registry.regions();
        for a in regions.iter().filter(|r| r.owner_team == Team::Red) {
            for b in regions.iter().filter(|r| r.owner_team == Team::Blue) {
                let shared = to_multi(a.to_geo()).intersection(&to_multi(b.to_geo()));
                assert!(multipolygon_area(&shared) < 1.0);
            }
        }
    }
}
