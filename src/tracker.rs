//! # Capture Tracker
//!
//! Per-player state machine that turns validated positions into capture events.
//!
//! ## States
//!
//! ```text
//!            enter territory               loop closes
//!   Idle ───────────────────▶ Tracking ───────────────────▶ Idle (capture)
//!    ▲                          │
//!    └──────── left territory ──┘ (path discarded)
//! ```
//!
//! ## Loop closure
//!
//! A loop closes when the newest point comes back within `closure_radius_m` of an
//! earlier point of the path. The most recent `trailing_window` points are never
//! candidates, and paths shorter than `min_loop_points` are never checked, so a
//! player standing still cannot close a loop on GPS jitter alone. A candidate
//! loop must also enclose at least `min_capture_area_m2` and must not cross
//! itself. Candidates are tried oldest first; the first one that passes wins.

use std::collections::VecDeque;
use std::sync::Arc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::geo_utils::{distance_meters, is_simple_ring, normalize_ring, path_length, polygon_area};
use crate::{GpsPoint, Position, Territory};

/// Tunable loop-closure parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CaptureConfig {
    /// Minimum path length (points) before closure is checked.
    /// Default: 10
    pub min_loop_points: u32,
    /// Maximum distance between the newest point and an earlier point to close a loop.
    /// Default: 15.0 meters
    pub closure_radius_m: f64,
    /// Number of most recent points (before the newest) that cannot close a loop.
    /// Default: 5
    pub trailing_window: u32,
    /// Oldest points are dropped beyond this many.
    /// Default: 500
    pub max_path_points: u32,
    /// Loops enclosing less than this are ignored.
    /// Default: 100.0 m²
    pub min_capture_area_m2: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_loop_points: 10,
            closure_radius_m: 15.0,
            trailing_window: 5,
            max_path_points: 500,
            min_capture_area_m2: 100.0,
        }
    }
}

/// Tracker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackerState {
    /// Outside the territory, no active path
    Idle,
    /// Inside the territory, accumulating a path
    Tracking,
}

/// Result of feeding one point to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackResult {
    pub in_territory: bool,
    pub captured: bool,
    /// The closed loop (open ring, oldest point first) when `captured` is true
    pub captured_path: Option<Vec<GpsPoint>>,
}

impl TrackResult {
    fn outside() -> Self {
        Self { in_territory: false, captured: false, captured_path: None }
    }

    fn inside() -> Self {
        Self { in_territory: true, captured: false, captured_path: None }
    }

    fn capture(ring: Vec<GpsPoint>) -> Self {
        Self { in_territory: true, captured: true, captured_path: Some(ring) }
    }
}

/// Why the most recent loop-closure candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClosureRejection {
    /// The loop enclosed less than the configured minimum.
    AreaTooSmall { area_m2: f64 },
    /// The loop crossed itself.
    SelfIntersecting,
}

/// Capture attempt progress, for HUD display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CaptureProgress {
    pub state: TrackerState,
    pub path_points: u32,
    /// Time since the current path started
    pub elapsed_ms: i64,
    /// Length of the retained path in meters
    pub distance_m: f64,
}

/// Loop detector for one player.
#[derive(Debug, Clone)]
pub struct CaptureTracker {
    config: CaptureConfig,
    territory: Arc<Territory>,
    state: TrackerState,
    path: VecDeque<Position>,
    tracking_since_ms: Option<i64>,
    last_rejection: Option<ClosureRejection>,
    out_of_order: u64,
}

impl CaptureTracker {
    pub fn new(territory: Arc<Territory>, config: CaptureConfig) -> Self {
        Self {
            config,
            territory,
            state: TrackerState::Idle,
            path: VecDeque::new(),
            tracking_since_ms: None,
            last_rejection: None,
            out_of_order: 0,
        }
    }

    /// Feed one validated position.
    pub fn add_point(&mut self, p: &Position) -> TrackResult {
        if !self.territory.contains(&p.point()) {
            if self.state == TrackerState::Tracking {
                info!("[Tracker] Left territory, discarding {} point path", self.path.len());
                self.reset();
            }
            return TrackResult::outside();
        }

        if self.state == TrackerState::Idle {
            debug!("[Tracker] Entered territory at ({:.6}, {:.6})", p.latitude, p.longitude);
            self.state = TrackerState::Tracking;
            self.path.clear();
            self.path.push_back(*p);
            self.tracking_since_ms = Some(p.timestamp_ms);
            return TrackResult::inside();
        }

        if let Some(last) = self.path.back() {
            if p.timestamp_ms <= last.timestamp_ms {
                debug!(
                    "[Tracker] Dropped out-of-order point t={} (last t={})",
                    p.timestamp_ms, last.timestamp_ms
                );
                self.out_of_order += 1;
                return TrackResult::inside();
            }
        }

        self.path.push_back(*p);
        while self.path.len() > (self.config.max_path_points as usize).max(1) {
            self.path.pop_front();
        }

        match self.detect_closure() {
            Some(ring) => {
                info!(
                    "[Tracker] Loop closed: {} vertices, {:.0} m²",
                    ring.len(),
                    polygon_area(&ring)
                );
                self.reset();
                TrackResult::capture(ring)
            }
            None => TrackResult::inside(),
        }
    }

    /// Force the tracker back to `Idle` and drop the path.
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
        self.path.clear();
        self.tracking_since_ms = None;
    }

    fn detect_closure(&mut self) -> Option<Vec<GpsPoint>> {
        let len = self.path.len();
        if len < (self.config.min_loop_points as usize).max(3) {
            return None;
        }

        let end = len.saturating_sub(self.config.trailing_window as usize + 1);
        if end == 0 {
            return None;
        }

        let points: Vec<GpsPoint> = self.path.iter().map(Position::point).collect();
        let newest = points[len - 1];
        let mut rejection = None;

        for start in 0..end {
            if distance_meters(&points[start], &newest) > self.config.closure_radius_m {
                continue;
            }

            let ring = normalize_ring(&points[start..]);
            let area = polygon_area(&ring);
            if area < self.config.min_capture_area_m2 {
                rejection.get_or_insert(ClosureRejection::AreaTooSmall { area_m2: area });
                continue;
            }
            if !is_simple_ring(&ring) {
                rejection.get_or_insert(ClosureRejection::SelfIntersecting);
                continue;
            }

            self.last_rejection = None;
            return Some(ring);
        }

        if let Some(r) = rejection {
            debug!("[Tracker] Closure candidate rejected: {:?}", r);
            self.last_rejection = Some(r);
        }
        None
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == TrackerState::Tracking
    }

    /// Current path as plain points, oldest first.
    pub fn path(&self) -> Vec<GpsPoint> {
        self.path.iter().map(Position::point).collect()
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn last_rejection(&self) -> Option<ClosureRejection> {
        self.last_rejection
    }

    /// Number of points dropped for not being newer than the path's last point.
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order
    }

    pub fn progress(&self) -> CaptureProgress {
        let elapsed_ms = match (self.tracking_since_ms, self.path.back()) {
            (Some(start), Some(last)) => last.timestamp_ms - start,
            _ => 0,
        };
        CaptureProgress {
            state: self.state,
            path_points: self.path.len() as u32,
            elapsed_ms,
            distance_m: path_length(&self.path()),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn territory() -> Arc<Territory> {
        let ring = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.02),
            GpsPoint::new(0.02, 0.02),
            GpsPoint::new(0.02, 0.0),
        ];
        Arc::new(Territory::new(&ring).unwrap())
    }

    fn feed(tracker: &mut CaptureTracker, coords: &[(f64, f64)], t0: i64) -> Vec<TrackResult> {
        coords
            .iter()
            .enumerate()
            .map(|(i, (lat, lng))| tracker.add_point(&Position::new(*lat, *lng, t0 + i as i64 * 5000)))
            .collect()
    }

    /// Walks the boundary of a ~67m square; the 11th point lands ~5.5m from the first.
    fn square_loop() -> Vec<(f64, f64)> {
        vec![
            (0.0100, 0.0100),
            (0.0100, 0.0103),
            (0.0100, 0.0106),
            (0.0103, 0.0106),
            (0.0106, 0.0106),
            (0.0106, 0.0103),
            (0.0106, 0.0100),
            (0.01045, 0.0100),
            (0.0103, 0.0100),
            (0.01018, 0.0100),
            (0.01005, 0.0100),
        ]
    }

    #[test]
    fn test_enter_territory_starts_tracking() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        assert_eq!(tracker.state(), TrackerState::Idle);

        let outside = tracker.add_point(&Position::new(-0.001, 0.001, 0));
        assert_eq!(outside, TrackResult { in_territory: false, captured: false, captured_path: None });
        assert_eq!(tracker.state(), TrackerState::Idle);

        let inside = tracker.add_point(&Position::new(0.001, 0.001, 5000));
        assert!(inside.in_territory);
        assert!(!inside.captured);
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert_eq!(tracker.path_len(), 1);
    }

    #[test]
    fn test_territory_exit_voids_path() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        let line: Vec<(f64, f64)> = (0..12).map(|i| (0.001 + i as f64 * 0.0002, 0.001)).collect();
        let results = feed(&mut tracker, &line, 0);
        assert!(results.iter().all(|r| r.in_territory && !r.captured));
        assert_eq!(tracker.path_len(), 12);

        let exit = tracker.add_point(&Position::new(-0.0005, 0.001, 100_000));
        assert!(!exit.in_territory);
        assert!(!exit.captured);
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.path_len(), 0);

        let back = tracker.add_point(&Position::new(0.0005, 0.001, 105_000));
        assert!(back.in_territory);
        assert_eq!(tracker.path_len(), 1);
        assert_eq!(tracker.path(), vec![GpsPoint::new(0.0005, 0.001)]);
    }

    #[test]
    fn test_loop_closure_fires() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        let results = feed(&mut tracker, &square_loop(), 0);

        assert!(results[..10].iter().all(|r| !r.captured));
        let last = &results[10];
        assert!(last.in_territory);
        assert!(last.captured);

        let ring = last.captured_path.as_ref().unwrap();
        assert_eq!(ring.len(), 11);
        assert_eq!(ring[0], GpsPoint::new(0.0100, 0.0100));
        assert!(polygon_area(ring) > 4000.0);

        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.path_len(), 0);

        // Next point starts a fresh path
        let next = tracker.add_point(&Position::new(0.0101, 0.0101, 60_000));
        assert!(next.in_territory);
        assert!(!next.captured);
        assert_eq!(tracker.path_len(), 1);
    }

    #[test]
    fn test_loop_closure_needs_minimum_points() {
        let config = CaptureConfig { min_loop_points: 20, ..CaptureConfig::default() };
        let mut tracker = CaptureTracker::new(territory(), config);
        let results = feed(&mut tracker, &square_loop(), 0);
        assert!(results.iter().all(|r| !r.captured));
    }

    #[test]
    fn test_no_false_closure_from_jitter() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        // 20 samples within ~3m of each other
        let offsets = [0.0, 0.00001, -0.00001, 0.00002, -0.00002];
        let jitter: Vec<(f64, f64)> = (0..20)
            .map(|i| (0.01 + offsets[i % 5], 0.01 + offsets[(i * 3) % 5]))
            .collect();

        let results = feed(&mut tracker, &jitter, 0);
        assert!(results.iter().all(|r| r.in_territory && !r.captured));
        assert_eq!(tracker.path_len(), 20);
        assert!(matches!(
            tracker.last_rejection(),
            Some(ClosureRejection::AreaTooSmall { .. })
        ));
    }

    #[test]
    fn test_small_loop_below_area_floor_ignored() {
        let config = CaptureConfig { min_capture_area_m2: 10_000.0, ..CaptureConfig::default() };
        let mut tracker = CaptureTracker::new(territory(), config);
        let results = feed(&mut tracker, &square_loop(), 0);
        assert!(results.iter().all(|r| !r.captured));
        assert!(tracker.is_tracking());
    }

    #[test]
    fn test_path_is_capped() {
        let config = CaptureConfig { max_path_points: 20, ..CaptureConfig::default() };
        let mut tracker = CaptureTracker::new(territory(), config);
        let line: Vec<(f64, f64)> = (0..30).map(|i| (0.001 + i as f64 * 0.0002, 0.001)).collect();
        feed(&mut tracker, &line, 0);

        let path = tracker.path();
        assert_eq!(path.len(), 20);
        assert_eq!(path[0], GpsPoint::new(0.001 + 10.0 * 0.0002, 0.001));
    }

    #[test]
    fn test_out_of_order_point_dropped() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        tracker.add_point(&Position::new(0.001, 0.001, 10_000));
        tracker.add_point(&Position::new(0.0012, 0.001, 15_000));

        let stale = tracker.add_point(&Position::new(0.0014, 0.001, 15_000));
        assert!(stale.in_territory);
        assert_eq!(tracker.path_len(), 2);
        assert_eq!(tracker.out_of_order_count(), 1);
    }

    #[test]
    fn test_reset_clears_path() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        feed(&mut tracker, &square_loop()[..5], 0);
        assert!(tracker.is_tracking());

        tracker.reset();
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.path_len(), 0);
        assert_eq!(tracker.progress().elapsed_ms, 0);
    }

    #[test]
    fn test_progress_reports_elapsed_and_distance() {
        let mut tracker = CaptureTracker::new(territory(), CaptureConfig::default());
        feed(&mut tracker, &square_loop()[..3], 1_000);

        let progress = tracker.progress();
        assert_eq!(progress.state, TrackerState::Tracking);
        assert_eq!(progress.path_points, 3);
        assert_eq!(progress.elapsed_ms, 10_000);
        assert!((progress.distance_m - 66.6).abs() < 0.01);
    }
}
