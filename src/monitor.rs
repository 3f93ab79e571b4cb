use crate::hardware::alarm::AlarmActuator;
use crate::safety::{apply_policy, SensorWatchdog};
use crate::state::StateManager;
use crate::types::{CutoffPolicy, MonitorState, ALARM_HALF_CYCLE_MS, MONITOR_TICK_MS};
use embassy_time::{Duration, Instant, Timer};
use log::{error, info};

/// Threshold machine for the cutoff relay. Strict comparison on both edges:
/// a reading >= limit enters cutoff, a reading < limit leaves it. A `None`
/// reading (stale sensor, policy already applied) holds the current state.
pub struct MonitorStateMachine {
    state: MonitorState,
}

impl MonitorStateMachine {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Normal,
        }
    }

    pub fn update(&mut self, reading: Option<f32>, limit_g: f32) -> Option<MonitorTransition> {
        let previous_state = self.state;

        match (self.state, reading) {
            (MonitorState::Normal, Some(w)) if w >= limit_g => {
                self.state = MonitorState::Cutoff;
            }
            (MonitorState::Cutoff, Some(w)) if w < limit_g => {
                self.state = MonitorState::Normal;
            }
            // Stale reading: never treated as below-limit, hold state.
            _ => {}
        }

        if self.state != previous_state {
            info!("Monitor transition: {:?} -> {:?}", previous_state, self.state);
            Some(MonitorTransition {
                from: previous_state,
                to: self.state,
            })
        } else {
            None
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorTransition {
    pub from: MonitorState,
    pub to: MonitorState,
}

/// Continuous weight watch. Runs for the lifetime of the process: 500ms
/// ticks while normal, 200ms buzzer half-cycles while cutoff so the alarm
/// pattern and the release check share the same cadence.
pub async fn run_monitor(state: StateManager, mut alarm: AlarmActuator, policy: CutoffPolicy) -> ! {
    info!("Monitor loop started (policy: {:?})", policy);

    let mut machine = MonitorStateMachine::new();
    let mut watchdog = SensorWatchdog::new();
    let mut buzzer_on = false;

    loop {
        let snapshot = state.get_full_state().await;
        let reading = apply_policy(watchdog.validate(&snapshot, Instant::now()), policy);
        let limit_g = snapshot.weight_limit_g;

        if let Some(transition) = machine.update(reading, limit_g) {
            let cutoff = transition.to == MonitorState::Cutoff;
            if let Err(e) = alarm.set_cutoff(cutoff) {
                error!("Failed to drive relay: {}", e);
                state.set_error(Some(format!("relay fault: {}", e))).await;
            }
            if !cutoff {
                if let Err(e) = alarm.silence() {
                    error!("Failed to silence buzzer: {}", e);
                }
                buzzer_on = false;
            }
            state.set_cutoff_active(cutoff).await;
        }

        match machine.state() {
            MonitorState::Normal => {
                Timer::after(Duration::from_millis(MONITOR_TICK_MS)).await;
            }
            MonitorState::Cutoff => {
                buzzer_on = !buzzer_on;
                if let Err(e) = alarm.set_buzzer(buzzer_on) {
                    error!("Failed to drive buzzer: {}", e);
                }
                Timer::after(Duration::from_millis(ALARM_HALF_CYCLE_MS)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_scenario_sequence() {
        // Boot with stored byte 20 -> 2000g limit; the documented sequence.
        let mut machine = MonitorStateMachine::new();
        let limit = 2000.0;

        let samples = [1500.0, 1999.0, 2000.0, 2500.0, 1800.0];
        let mut cutoffs = Vec::new();
        for w in samples {
            machine.update(Some(w), limit);
            cutoffs.push(machine.state() == MonitorState::Cutoff);
        }

        assert_eq!(cutoffs, vec![false, false, true, true, false]);
    }

    #[test]
    fn test_enters_cutoff_exactly_at_limit() {
        let mut machine = MonitorStateMachine::new();
        assert!(machine.update(Some(1199.9), 1200.0).is_none());
        let t = machine.update(Some(1200.0), 1200.0).unwrap();
        assert_eq!(t.to, MonitorState::Cutoff);
    }

    #[test]
    fn test_releases_below_limit_only() {
        let mut machine = MonitorStateMachine::new();
        machine.update(Some(1300.0), 1200.0);
        assert_eq!(machine.state(), MonitorState::Cutoff);

        // Exactly at the limit stays in cutoff; strictly below releases.
        assert!(machine.update(Some(1200.0), 1200.0).is_none());
        let t = machine.update(Some(1199.0), 1200.0).unwrap();
        assert_eq!(t.to, MonitorState::Normal);
    }

    #[test]
    fn test_stale_reading_holds_cutoff() {
        let mut machine = MonitorStateMachine::new();
        machine.update(Some(1500.0), 1200.0);
        assert_eq!(machine.state(), MonitorState::Cutoff);

        // Sensor outage must not release the relay.
        assert!(machine.update(None, 1200.0).is_none());
        assert_eq!(machine.state(), MonitorState::Cutoff);

        // First valid reading below the limit releases as usual.
        let t = machine.update(Some(100.0), 1200.0).unwrap();
        assert_eq!(t.to, MonitorState::Normal);
    }

    #[test]
    fn test_stale_reading_holds_normal() {
        let mut machine = MonitorStateMachine::new();
        assert!(machine.update(None, 1200.0).is_none());
        assert_eq!(machine.state(), MonitorState::Normal);
    }

    #[test]
    fn test_limit_change_applies_next_tick() {
        let mut machine = MonitorStateMachine::new();
        assert!(machine.update(Some(1500.0), 2000.0).is_none());

        // Operator lowers the limit below the standing weight.
        let t = machine.update(Some(1500.0), 1200.0).unwrap();
        assert_eq!(t.to, MonitorState::Cutoff);
    }
}
