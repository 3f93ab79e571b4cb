use embassy_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Normal,
    Cutoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuScreen {
    MainMenu,
    Taring,
    Calibrating,
    SettingLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TareStatus {
    NotOk,
    Ok,
}

impl TareStatus {
    pub fn is_ok(&self) -> bool {
        *self == TareStatus::Ok
    }
}

impl std::fmt::Display for TareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TareStatus::NotOk => write!(f, "Not OK"),
            TareStatus::Ok => write!(f, "OK"),
        }
    }
}

/// Discrete key event from the 4x4 keypad. A `Hold` is emitted once when a
/// key stays down past `HOLD_THRESHOLD_MS`; a release before that emits a
/// `Press`. The menu state machine treats the two as distinct inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(char),
    Hold(char),
}

impl KeyEvent {
    pub fn key(&self) -> char {
        match self {
            KeyEvent::Press(k) | KeyEvent::Hold(k) => *k,
        }
    }
}

/// Monitor behavior when the sensor goes stale. `FailClosed` holds the last
/// relay state until valid readings resume; `FailOpen` treats a stale sensor
/// as below-limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffPolicy {
    FailClosed,
    FailOpen,
}

#[derive(Debug, Clone)]
pub struct WeightSample {
    pub grams: f32,
    pub raw_avg: i32,
    pub received_at: Instant,
}

#[derive(Debug, Clone)]
pub struct SystemState {
    pub scale_sample: Option<WeightSample>,
    pub weight_limit_g: f32,
    pub calibration_factor: f32,
    pub tare_status: TareStatus,
    pub cutoff_active: bool,
    pub last_error: Option<String>,
    pub log_messages: heapless::Vec<String, 100>,
    pub log_seq: u32,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            scale_sample: None,
            weight_limit_g: DEFAULT_LIMIT_RAW as f32 * LIMIT_UNIT_G,
            calibration_factor: DEFAULT_CALIBRATION_FACTOR,
            tare_status: TareStatus::NotOk,
            cutoff_active: false,
            last_error: None,
            log_messages: heapless::Vec::new(),
            log_seq: 0,
        }
    }
}

// Load cell calibration. The factor is a divisor on raw counts and resets to
// the default every boot; only the weight limit survives power cycles.
pub const DEFAULT_CALIBRATION_FACTOR: f32 = 195.0;
pub const CALIBRATION_STEP: f32 = 2.0;

// Persisted limit: one raw byte, scaled to grams. A stored value <= 5 is
// treated as uninitialized flash and reset to the default.
pub const LIMIT_UNIT_G: f32 = 100.0;
pub const DEFAULT_LIMIT_RAW: u8 = 12;
pub const UNSET_LIMIT_MAX_RAW: u8 = 5;
pub const MAX_LIMIT_DIGITS: usize = 3;

// Sampling cadence and the staleness window for the sensor watchdog.
pub const SAMPLE_PERIOD_MS: u64 = 100;
pub const SAMPLE_STALE_MS: u64 = 2000;
pub const TARE_SAMPLES: usize = 15;
pub const LIVE_SAMPLES: usize = 2;

// Monitor timing: slow tick while normal, buzzer half-cycles while cutoff.
pub const MONITOR_TICK_MS: u64 = 500;
pub const ALARM_HALF_CYCLE_MS: u64 = 200;

// Periodic redraw of live views (calibration weight, main menu status).
pub const RENDER_TICK_MS: u64 = 500;

// Keypad timing.
pub const KEYPAD_SCAN_MS: u64 = 20;
pub const HOLD_THRESHOLD_MS: u64 = 500;
pub const POST_HOLD_DEBOUNCE_MS: u64 = 1000;

// Banner hold times, part of the observable UI contract.
pub const TARE_BANNER_MS: u64 = 2000;
pub const WARN_BANNER_MS: u64 = 1500;
pub const SAVED_BANNER_MS: u64 = 1500;
