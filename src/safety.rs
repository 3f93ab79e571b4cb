use crate::types::{CutoffPolicy, SystemState, SAMPLE_STALE_MS};
use embassy_time::{Duration, Instant};
use log::{error, warn};

/// Watches the age of the newest scale sample. The monitor asks it for a
/// validated reading every tick; `None` means the sensor is stale or silent
/// and the cutoff policy decides what happens next.
pub struct SensorWatchdog {
    stale_window: Duration,
    outage_reported: bool,
}

impl SensorWatchdog {
    pub fn new() -> Self {
        Self {
            stale_window: Duration::from_millis(SAMPLE_STALE_MS),
            outage_reported: false,
        }
    }

    pub fn validate(&mut self, state: &SystemState, now: Instant) -> Option<f32> {
        let sample = match &state.scale_sample {
            Some(s) => s,
            None => {
                self.report_outage("no scale data received yet");
                return None;
            }
        };

        let age = now.duration_since(sample.received_at);
        if age > self.stale_window {
            self.report_outage("scale data stale");
            return None;
        }

        if self.outage_reported {
            warn!("Scale data resumed after outage ({:.2}g)", sample.grams);
            self.outage_reported = false;
        }
        Some(sample.grams)
    }

    // Log once per outage, not once per tick.
    fn report_outage(&mut self, reason: &str) {
        if !self.outage_reported {
            error!("SAFETY: {} - cutoff policy takes over", reason);
            self.outage_reported = true;
        }
    }
}

/// Resolve a possibly-missing reading against the configured policy.
/// Fail-closed returns `None` (hold whatever the relay is doing); fail-open
/// substitutes a below-limit reading, which reproduces the legacy behavior
/// of a frozen low weight keeping the relay energized.
pub fn apply_policy(reading: Option<f32>, policy: CutoffPolicy) -> Option<f32> {
    match (reading, policy) {
        (Some(w), _) => Some(w),
        (None, CutoffPolicy::FailClosed) => None,
        (None, CutoffPolicy::FailOpen) => Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SystemState, WeightSample};

    // Anchor "now" well past boot so sample ages can be subtracted freely.
    fn anchor() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn state_with_sample(now: Instant, age_ms: u64) -> SystemState {
        let mut state = SystemState::default();
        state.scale_sample = Some(WeightSample {
            grams: 42.0,
            raw_avg: 8400,
            received_at: now - Duration::from_millis(age_ms),
        });
        state
    }

    #[test]
    fn test_fresh_sample_passes() {
        let mut watchdog = SensorWatchdog::new();
        let now = anchor();
        let state = state_with_sample(now, 0);
        assert_eq!(watchdog.validate(&state, now), Some(42.0));
    }

    #[test]
    fn test_stale_sample_rejected() {
        let mut watchdog = SensorWatchdog::new();
        let now = anchor();
        let state = state_with_sample(now, SAMPLE_STALE_MS + 500);
        assert_eq!(watchdog.validate(&state, now), None);
    }

    #[test]
    fn test_boundary_age_still_valid() {
        let mut watchdog = SensorWatchdog::new();
        let now = anchor();
        let state = state_with_sample(now, SAMPLE_STALE_MS);
        assert_eq!(watchdog.validate(&state, now), Some(42.0));
    }

    #[test]
    fn test_missing_sample_rejected() {
        let mut watchdog = SensorWatchdog::new();
        assert_eq!(watchdog.validate(&SystemState::default(), anchor()), None);
    }

    #[test]
    fn test_recovery_after_outage() {
        let mut watchdog = SensorWatchdog::new();
        let now = anchor();

        assert_eq!(watchdog.validate(&SystemState::default(), now), None);
        let state = state_with_sample(now, 100);
        assert_eq!(watchdog.validate(&state, now), Some(42.0));
    }

    #[test]
    fn test_policy_resolution() {
        assert_eq!(apply_policy(Some(10.0), CutoffPolicy::FailClosed), Some(10.0));
        assert_eq!(apply_policy(None, CutoffPolicy::FailClosed), None);
        assert_eq!(apply_policy(None, CutoffPolicy::FailOpen), Some(0.0));
    }
}
