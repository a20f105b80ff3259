//! Anti-cheat GPS sample filter.
//!
//! Runs before anything touches capture geometry. Each rule either accepts the
//! sample (and remembers it as the reference for the next jump check) or rejects
//! it silently. Rejections are expected during normal play and are reported
//! through [`Verdict`] and [`ValidatorStats`], never as errors.

use log::debug;
use serde::{Deserialize, Serialize};
use crate::geo_utils::distance_meters;
use crate::Position;

/// Thresholds for the GPS validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ValidatorConfig {
    /// Reject fixes whose reported accuracy radius is worse than this.
    /// Default: 100.0 meters
    pub max_accuracy_m: f64,
    /// Reject samples moving faster than a brisk walk.
    /// Default: 7 km/h (~1.944 m/s)
    pub max_speed_mps: f64,
    /// Reject samples further than this from the last accepted sample.
    /// Default: 50.0 meters
    pub max_jump_m: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 100.0,
            max_speed_mps: 7.0 * 1000.0 / 3600.0,
            max_jump_m: 50.0,
        }
    }
}

/// Why a sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum RejectReason {
    /// Latitude/longitude missing, non-finite or out of range
    InvalidCoordinates,
    /// Reported accuracy radius too large
    LowAccuracy,
    /// Reported speed above walking pace
    TooFast,
    /// Implausible distance from the previous accepted sample
    Jump,
}

/// Outcome of validating one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(*reason),
        }
    }
}

/// Running counters, for telemetry and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStats {
    pub accepted: u64,
    pub invalid_coordinates: u64,
    pub low_accuracy: u64,
    pub too_fast: u64,
    pub jumps: u64,
}

impl ValidatorStats {
    pub fn rejected(&self) -> u64 {
        self.invalid_coordinates + self.low_accuracy + self.too_fast + self.jumps
    }

    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Accepted => self.accepted += 1,
            Verdict::Rejected(RejectReason::InvalidCoordinates) => self.invalid_coordinates += 1,
            Verdict::Rejected(RejectReason::LowAccuracy) => self.low_accuracy += 1,
            Verdict::Rejected(RejectReason::TooFast) => self.too_fast += 1,
            Verdict::Rejected(RejectReason::Jump) => self.jumps += 1,
        }
    }
}

/// Per-session GPS validator.
///
/// Holds only the last accepted sample; every player session owns its own.
#[derive(Debug, Clone, Default)]
pub struct GpsValidator {
    config: ValidatorConfig,
    last_accepted: Option<Position>,
    stats: ValidatorStats,
}

impl GpsValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            stats: ValidatorStats::default(),
        }
    }

    /// Validate a raw sample, returning whether it was accepted.
    pub fn validate(&mut self, raw: &Position) -> bool {
        self.check(raw).is_accepted()
    }

    /// Validate a raw sample and report why it was rejected.
    ///
    /// Rules run in order: coordinates, accuracy, speed, jump distance. Only an
    /// accepted sample replaces the jump reference.
    pub fn check(&mut self, raw: &Position) -> Verdict {
        let verdict = self.evaluate(raw);
        self.stats.record(verdict);

        match verdict {
            Verdict::Accepted => self.last_accepted = Some(*raw),
            Verdict::Rejected(reason) => {
                debug!(
                    "[Validator] Dropped sample at ({:.6}, {:.6}) t={}: {:?}",
                    raw.latitude, raw.longitude, raw.timestamp_ms, reason
                );
            }
        }

        verdict
    }

    fn evaluate(&self, raw: &Position) -> Verdict {
        if !raw.point().is_valid() {
            return Verdict::Rejected(RejectReason::InvalidCoordinates);
        }

        if let Some(accuracy) = raw.accuracy_m {
            if accuracy > self.config.max_accuracy_m {
                return Verdict::Rejected(RejectReason::LowAccuracy);
            }
        }

        if let Some(speed) = raw.speed_mps {
            if speed > self.config.max_speed_mps {
                return Verdict::Rejected(RejectReason::TooFast);
            }
        }

        if let Some(last) = &self.last_accepted {
            let jump = distance_meters(&last.point(), &raw.point());
            if jump > self.config.max_jump_m {
                return Verdict::Rejected(RejectReason::Jump);
            }
        }

        Verdict::Accepted
    }

    pub fn last_accepted(&self) -> Option<&Position> {
        self.last_accepted.as_ref()
    }

    pub fn stats(&self) -> ValidatorStats {
        self.stats
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Forget the jump reference, e.g. after the player paused the game.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
