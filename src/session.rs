//! # Engine and Player Sessions
//!
//! [`CaptureEngine`] owns what all players share: the territory and the region
//! registry. It is cheap to clone and safe to use from many threads.
//!
//! [`PlayerSession`] owns what belongs to one player: the GPS validator, the
//! capture tracker, the location throttle and the recent trail shown on the map.
//! Sessions take `&mut self` and need no locking.
//!
//! ```
//! use capture_engine::{CaptureEngine, GpsPoint, Team, Territory};
//!
//! let territory = Territory::new(&[
//!     GpsPoint::new(0.0, 0.0),
//!     GpsPoint::new(0.0, 0.02),
//!     GpsPoint::new(0.02, 0.02),
//!     GpsPoint::new(0.02, 0.0),
//! ]).unwrap();
//! let engine = CaptureEngine::with_territory(territory);
//!
//! let loop_ring = vec![
//!     GpsPoint::new(0.0, 0.0),
//!     GpsPoint::new(0.0, 0.01),
//!     GpsPoint::new(0.01, 0.01),
//!     GpsPoint::new(0.01, 0.0),
//! ];
//! engine.on_capture_event(&loop_ring, Team::Blue, "bob").unwrap();
//! assert_eq!(engine.coverage_percent(Team::Blue), 25.0);
//! assert_eq!(engine.region_count(Team::Blue), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use log::info;
use serde::{Deserialize, Serialize};
use crate::messages::{MapMessage, PresenceDocument};
use crate::{
    compute_scoreboard, now_ms, CaptureConfig, CaptureProgress, CaptureResult, CaptureTracker,
    CommitReport, EngineConfig, GpsPoint, GpsValidator, LocationThrottle, Position, Region,
    RegionRegistry, RegistryConfig, RejectReason, Scoreboard, Team, Territory, ThrottleConfig,
    ValidatorConfig, ValidatorStats, Verdict,
};

/// Trail points kept for the map view.
const TRAIL_POINTS: usize = 50;

// ============================================================================
// Engine
// ============================================================================

/// Shared game state: territory plus region registry.
#[derive(Clone)]
pub struct CaptureEngine {
    territory: Arc<Territory>,
    registry: Arc<RegionRegistry>,
    validator: ValidatorConfig,
    capture: CaptureConfig,
    throttle: ThrottleConfig,
}

impl CaptureEngine {
    /// Build an engine from a startup configuration.
    pub fn from_config(config: EngineConfig) -> CaptureResult<Self> {
        let territory = config.territory()?;
        info!(
            "[Engine] Territory loaded: {} vertices, {:.0} m²",
            territory.ring().len(),
            territory.area_m2()
        );
        Ok(Self {
            territory: Arc::new(territory),
            registry: Arc::new(RegionRegistry::new(config.registry)),
            validator: config.validator,
            capture: config.capture,
            throttle: config.throttle,
        })
    }

    /// Engine with default thresholds.
    pub fn with_territory(territory: Territory) -> Self {
        Self {
            territory: Arc::new(territory),
            registry: Arc::new(RegionRegistry::new(RegistryConfig::default())),
            validator: ValidatorConfig::default(),
            capture: CaptureConfig::default(),
            throttle: ThrottleConfig::default(),
        }
    }

    /// Open a session for one player.
    pub fn session(&self, user_id: &str, team: Team) -> PlayerSession {
        PlayerSession {
            engine: self.clone(),
            user_id: user_id.to_string(),
            team,
            throttle: LocationThrottle::new(self.throttle.clone()),
            validator: GpsValidator::new(self.validator.clone()),
            tracker: CaptureTracker::new(Arc::clone(&self.territory), self.capture.clone()),
            trail: VecDeque::with_capacity(TRAIL_POINTS),
            last_accepted: None,
        }
    }

    /// Commit a captured polygon for `team`.
    pub fn on_capture_event(&self, polygon: &[GpsPoint], team: Team, user_id: &str) -> CaptureResult<Region> {
        self.registry.commit(polygon, team, user_id)
    }

    /// Commit a captured polygon, reporting every region it changed.
    pub fn commit(
        &self,
        polygon: &[GpsPoint],
        team: Team,
        user_id: &str,
        captured_at_ms: i64,
    ) -> CaptureResult<CommitReport> {
        self.registry.commit_with_report(polygon, team, user_id, captured_at_ms)
    }

    pub fn coverage_percent(&self, team: Team) -> f64 {
        self.registry.coverage_percent(team, &self.territory)
    }

    pub fn region_count(&self, team: Team) -> usize {
        self.registry.region_count(team)
    }

    pub fn scoreboard(&self) -> Scoreboard {
        compute_scoreboard(&self.registry.regions(), &self.territory)
    }

    /// Replace local regions with a snapshot from the shared store.
    pub fn apply_remote(&self, regions: Vec<Region>) -> usize {
        self.registry.load_snapshot(regions)
    }

    pub fn territory(&self) -> &Arc<Territory> {
        &self.territory
    }

    pub fn registry(&self) -> &Arc<RegionRegistry> {
        &self.registry
    }
}

// ============================================================================
// Player Session
// ============================================================================

/// What happened to one raw location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationOutcome {
    pub in_territory: bool,
    pub captured: bool,
    /// Closed loop to commit when `captured` is true
    pub captured_path: Option<Vec<GpsPoint>>,
    /// Set when the validator dropped the sample
    pub rejection: Option<RejectReason>,
}

/// One player's pipeline: throttle, validator, tracker.
pub struct PlayerSession {
    engine: CaptureEngine,
    user_id: String,
    team: Team,
    throttle: LocationThrottle,
    validator: GpsValidator,
    tracker: CaptureTracker,
    trail: VecDeque<GpsPoint>,
    last_accepted: Option<Position>,
}

impl PlayerSession {
    /// Throttle, then process the sample. `None` means the sample was throttled.
    pub fn offer_location(&mut self, raw: &Position) -> Option<LocationOutcome> {
        if !self.throttle.offer(raw) {
            return None;
        }
        Some(self.on_location_update(raw))
    }

    /// Validate a raw sample and feed it to the tracker.
    pub fn on_location_update(&mut self, raw: &Position) -> LocationOutcome {
        if let Verdict::Rejected(reason) = self.validator.check(raw) {
            return LocationOutcome {
                in_territory: self.tracker.is_tracking(),
                captured: false,
                captured_path: None,
                rejection: Some(reason),
            };
        }

        self.last_accepted = Some(*raw);
        let result = self.tracker.add_point(raw);
        if result.in_territory {
            if self.trail.len() == TRAIL_POINTS {
                self.trail.pop_front();
            }
            self.trail.push_back(raw.point());
        }

        LocationOutcome {
            in_territory: result.in_territory,
            captured: result.captured,
            captured_path: result.captured_path,
            rejection: None,
        }
    }

    /// Commit a captured loop for this player's team and reset the tracker.
    pub fn on_capture_event(&mut self, polygon: &[GpsPoint]) -> CaptureResult<CommitReport> {
        let captured_at_ms = self.last_accepted.map_or_else(now_ms, |p| p.timestamp_ms);
        let result = self.engine.commit(polygon, self.team, &self.user_id, captured_at_ms);
        self.tracker.reset();
        result
    }

    /// Map update for the player's marker and trail, once a sample was accepted.
    pub fn location_message(&self) -> Option<MapMessage> {
        self.last_accepted.map(|p| MapMessage::LocationUpdate {
            user_location: p.point(),
            user_path: self.trail.iter().copied().collect(),
            team: self.team,
        })
    }

    /// Presence document for the shared store, once a sample was accepted.
    pub fn presence(&self) -> Option<PresenceDocument> {
        self.last_accepted.as_ref().map(PresenceDocument::from)
    }

    pub fn progress(&self) -> CaptureProgress {
        self.tracker.progress()
    }

    pub fn validator_stats(&self) -> ValidatorStats {
        self.validator.stats()
    }

    pub fn tracker(&self) -> &CaptureTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.engine
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn team(&self) -> Team {
        self.team
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackerState;

    fn engine() -> CaptureEngine {
        let ring = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.02),
            GpsPoint::new(0.02, 0.02),
            GpsPoint::new(0.02, 0.0),
        ];
        CaptureEngine::with_territory(Territory::new(&ring).unwrap())
    }

    /// 60m square walked in 11 steps of roughly 20-30m, starting at (0.01, 0.01).
    fn walk() -> Vec<(f64, f64)> {
        vec![
            (0.0100, 0.0100),
            (0.0100, 0.0002 + 0.0100),
            (0.0100, 0.0004 + 0.0100),
            (0.0100, 0.0006 + 0.0100),
            (0.0102, 0.0106),
            (0.0104, 0.0106),
            (0.0106, 0.0106),
            (0.0106, 0.0104),
            (0.0106, 0.0102),
            (0.0106, 0.0100),
            (0.0104, 0.0100),
            (0.0102, 0.0100),
            (0.01005, 0.0100),
        ]
    }

    fn feed_walk(session: &mut PlayerSession, t0: i64) -> Vec<LocationOutcome> {
        walk()
            .into_iter()
            .enumerate()
            .map(|(i, (lat, lng))| session.on_location_update(&Position::new(lat, lng, t0 + i as i64 * 5000)))
            .collect()
    }

    #[test]
    fn test_walk_captures_and_commits() {
        let engine = engine();
        let mut session = engine.session("alice", Team::Red);

        let outcomes = feed_walk(&mut session, 0);
        let last = outcomes.last().unwrap();
        assert!(last.captured, "loop should close on the last step");
        assert!(outcomes[..outcomes.len() - 1].iter().all(|o| !o.captured));

        let ring = last.captured_path.clone().unwrap();
        let report = session.on_capture_event(&ring).unwrap();
        assert_eq!(report.region.owner_team, Team::Red);
        assert_eq!(report.region.captured_by, "alice");
        assert_eq!(report.region.captured_at_ms, 12 * 5000);

        assert_eq!(engine.region_count(Team::Red), 1);
        assert!(engine.coverage_percent(Team::Red) > 0.0);
        assert_eq!(session.tracker().state(), TrackerState::Idle);
    }

    #[test]
    fn test_rejected_sample_reports_reason() {
        let engine = engine();
        let mut session = engine.session("alice", Team::Red);

        let first = session.on_location_update(&Position::new(0.01, 0.01, 0));
        assert!(first.in_territory);
        assert_eq!(first.rejection, None);

        let jump = session.on_location_update(&Position::new(0.015, 0.01, 5000));
        assert_eq!(jump.rejection, Some(RejectReason::Jump));
        assert!(jump.in_territory);
        assert!(!jump.captured);

        let fast = session.on_location_update(&Position::new(0.0101, 0.01, 6000).with_speed(5.0));
        assert_eq!(fast.rejection, Some(RejectReason::TooFast));
        assert_eq!(session.validator_stats().rejected(), 2);
    }

    #[test]
    fn test_offer_location_throttles() {
        let engine = engine();
        let mut session = engine.session("alice", Team::Red);

        assert!(session.offer_location(&Position::new(0.01, 0.01, 0)).is_some());
        assert!(session.offer_location(&Position::new(0.01, 0.01, 1000)).is_none());
        assert!(session.offer_location(&Position::new(0.01, 0.01, 5000)).is_some());
    }

    #[test]
    fn test_trail_is_capped_for_map() {
        let engine = engine();
        let mut session = engine.session("alice", Team::Red);
        assert!(session.location_message().is_none());

        // Out and back along a line so no loop ever closes
        for i in 0..80 {
            let step = (i % 40) as f64;
            let lng = if i < 40 { 0.005 + step * 0.0001 } else { 0.009 - step * 0.0001 };
            session.on_location_update(&Position::new(0.01, lng, i as i64 * 5000));
        }

        match session.location_message() {
            Some(MapMessage::LocationUpdate { user_path, team, user_location }) => {
                assert_eq!(user_path.len(), 50);
                assert_eq!(team, Team::Red);
                assert_eq!(user_path.last(), Some(&user_location));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_sessions_share_registry() {
        let engine = engine();
        let mut red = engine.session("alice", Team::Red);
        let mut blue = engine.session("bob", Team::Blue);

        let square = |lat: f64, lng: f64, size: f64| vec![
            GpsPoint::new(lat, lng),
            GpsPoint::new(lat, lng + size),
            GpsPoint::new(lat + size, lng + size),
            GpsPoint::new(lat + size, lng),
        ];

        red.on_capture_event(&square(0.0, 0.0, 0.01)).unwrap();
        blue.on_capture_event(&square(0.005, 0.005, 0.01)).unwrap();

        let board = engine.scoreboard();
        assert_eq!(board.total_regions, 2);
        assert_eq!(board.leader, Some(Team::Blue));
        assert!((engine.coverage_percent(Team::Red) - 18.8).abs() < 0.11);
        assert_eq!(red.engine().coverage_percent(Team::Blue), 25.0);
    }

    #[test]
    fn test_presence_follows_last_accepted_sample() {
        let engine = engine();
        let mut session = engine.session("alice", Team::Green);
        session.on_location_update(&Position::new(0.01, 0.01, 7));
        session.on_location_update(&Position::new(0.01, 0.01, 8).with_accuracy(500.0));

        let presence = session.presence().unwrap();
        assert_eq!(presence.last_update, 7);
    }
}
