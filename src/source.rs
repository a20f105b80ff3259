//! Location cadence control.
//!
//! Mobile location APIs are usually asked for "a fix every N seconds or every N
//! meters". [`LocationThrottle`] applies the same rule to sources that deliver
//! faster, so the validator's jump threshold stays meaningful.

use serde::{Deserialize, Serialize};
use crate::geo_utils::distance_meters;
use crate::Position;

/// Delivery cadence for raw location samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ThrottleConfig {
    /// Deliver a sample once this much time passed since the last delivered one.
    /// Default: 5000 ms
    pub interval_ms: i64,
    /// Deliver a sample once it moved this far from the last delivered one.
    /// Default: 5.0 meters
    pub min_distance_m: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            min_distance_m: 5.0,
        }
    }
}

/// Time-or-distance sample throttle.
#[derive(Debug, Clone, Default)]
pub struct LocationThrottle {
    config: ThrottleConfig,
    last_delivered: Option<Position>,
}

impl LocationThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config, last_delivered: None }
    }

    /// Returns true if `raw` should be passed on, remembering it if so.
    pub fn offer(&mut self, raw: &Position) -> bool {
        let deliver = match &self.last_delivered {
            None => true,
            Some(last) => {
                raw.timestamp_ms - last.timestamp_ms >= self.config.interval_ms
                    || distance_meters(&last.point(), &raw.point()) >= self.config.min_distance_m
            }
        };
        if deliver {
            self.last_delivered = Some(*raw);
        }
        deliver
    }

    pub fn reset(&mut self) {
        self.last_delivered = None;
    }
}
