//! Production-rate derivation from consecutive counter readings
//!
//! The calculator keeps exactly one previous reading. A rate can only be
//! derived once a baseline exists, and only when the device clock has moved
//! forward since that baseline.

use chrono::{DateTime, Utc};

/// Last accepted reading used as the baseline for the next rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub counter1: u64,
    pub timestamp: DateTime<Utc>,
}

/// Rate-calculator state: counter and timestamp are set together or not at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    baseline: Option<Baseline>,
}

impl RateState {
    /// State with no baseline, as after a process start
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_baseline(counter1: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            baseline: Some(Baseline {
                counter1,
                timestamp,
            }),
        }
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.baseline.is_none()
    }
}

/// Derive bags-per-minute from the previous state and a new reading.
///
/// Returns the rate (if computable) and the state to keep:
/// - no baseline: no rate, the reading becomes the baseline
/// - device clock did not advance: no rate, the old state is kept
/// - otherwise: `delta_count / delta_minutes` rounded to two decimals, the
///   reading becomes the baseline
///
/// A counter that went backwards (device reset) yields a negative rate.
pub fn compute_rate(
    current_count: u64,
    current_timestamp: DateTime<Utc>,
    state: &RateState,
) -> (Option<f64>, RateState) {
    let Some(previous) = state.baseline else {
        return (
            None,
            RateState::with_baseline(current_count, current_timestamp),
        );
    };

    let delta_ms = (current_timestamp - previous.timestamp).num_milliseconds();
    if delta_ms <= 0 {
        return (None, *state);
    }

    let delta_count = current_count as i128 - previous.counter1 as i128;
    let delta_minutes = delta_ms as f64 / 60_000.0;
    let rate = round_two_decimals(delta_count as f64 / delta_minutes);

    (
        Some(rate),
        RateState::with_baseline(current_count, current_timestamp),
    )
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Owner of the rate state for one bridge instance
///
/// Not shared: the production pipeline holds it by value and feeds it
/// readings in arrival order.
#[derive(Debug, Default)]
pub struct RateCalculator {
    state: RateState,
}

impl RateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the rate for a reading and commit the resulting state
    pub fn observe(&mut self, current_count: u64, current_timestamp: DateTime<Utc>) -> Option<f64> {
        let (rate, next) = compute_rate(current_count, current_timestamp, &self.state);
        self.state = next;
        rate
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }
}
