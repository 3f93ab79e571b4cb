use crate::types::{SystemState, TareStatus, WeightSample};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use log::{debug, info};
use std::sync::Arc;

/// Owner of the shared state both activities cooperate through. The monitor
/// task and the menu dispatcher never call each other; everything they
/// exchange (current weight, limit, tare status, cutoff flag) goes via here.
pub struct StateManager {
    state: Arc<Mutex<CriticalSectionRawMutex, SystemState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SystemState::default())),
        }
    }

    /// A second view over the same shared state, for handing to tasks.
    pub fn from_handle(state: Arc<Mutex<CriticalSectionRawMutex, SystemState>>) -> Self {
        Self { state }
    }

    pub fn get_state_handle(&self) -> Arc<Mutex<CriticalSectionRawMutex, SystemState>> {
        Arc::clone(&self.state)
    }

    pub async fn update_scale_sample(&self, sample: WeightSample) {
        let mut state = self.state.lock().await;
        debug!("Scale sample: {:.2}g (raw avg {})", sample.grams, sample.raw_avg);
        state.scale_sample = Some(sample);
    }

    pub async fn set_weight_limit(&self, limit_g: f32) {
        let mut state = self.state.lock().await;
        if state.weight_limit_g != limit_g {
            info!("Weight limit changed: {:.0}g -> {:.0}g", state.weight_limit_g, limit_g);
            state.weight_limit_g = limit_g;
            Self::add_log_message(&mut state, format!("Limit: {:.0}g", limit_g));
        }
    }

    pub async fn set_calibration_factor(&self, factor: f32) {
        let mut state = self.state.lock().await;
        if state.calibration_factor != factor {
            info!(
                "Calibration factor changed: {:.1} -> {:.1}",
                state.calibration_factor, factor
            );
            state.calibration_factor = factor;
            Self::add_log_message(&mut state, format!("Cal factor: {:.1}", factor));
        }
    }

    pub async fn set_tare_status(&self, status: TareStatus) {
        let mut state = self.state.lock().await;
        if state.tare_status != status {
            info!("Tare status changed: {} -> {}", state.tare_status, status);
            state.tare_status = status;
            Self::add_log_message(&mut state, format!("Tare: {}", status));
        }
    }

    pub async fn set_cutoff_active(&self, active: bool) {
        let mut state = self.state.lock().await;
        if state.cutoff_active != active {
            info!("Cutoff state changed: {}", if active { "CUTOFF" } else { "NORMAL" });
            state.cutoff_active = active;
            Self::add_log_message(
                &mut state,
                format!("Cutoff: {}", if active { "ON" } else { "OFF" }),
            );
        }
    }

    pub async fn set_error(&self, error: Option<String>) {
        let mut state = self.state.lock().await;
        state.last_error = error.clone();
        if let Some(err) = error {
            Self::add_log_message(&mut state, format!("ERROR: {}", err));
        }
    }

    pub async fn add_log(&self, message: String) {
        let mut state = self.state.lock().await;
        Self::add_log_message(&mut state, message);
    }

    fn add_log_message(state: &mut SystemState, message: String) {
        state.log_seq = state.log_seq.wrapping_add(1);
        let log_entry = format!("[{}] {}", state.log_seq, message);

        if state.log_messages.len() >= 100 {
            state.log_messages.remove(0);
        }

        let _ = state.log_messages.push(log_entry);
    }

    pub async fn get_current_weight(&self) -> Option<f32> {
        let state = self.state.lock().await;
        state.scale_sample.as_ref().map(|s| s.grams)
    }

    pub async fn get_weight_limit(&self) -> f32 {
        let state = self.state.lock().await;
        state.weight_limit_g
    }

    pub async fn get_calibration_factor(&self) -> f32 {
        let state = self.state.lock().await;
        state.calibration_factor
    }

    pub async fn get_tare_status(&self) -> TareStatus {
        let state = self.state.lock().await;
        state.tare_status
    }

    pub async fn is_cutoff_active(&self) -> bool {
        let state = self.state.lock().await;
        state.cutoff_active
    }

    pub async fn get_full_state(&self) -> SystemState {
        let state = self.state.lock().await;
        state.clone()
    }
}
