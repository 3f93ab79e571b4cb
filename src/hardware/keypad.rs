//! 4x4 matrix keypad scanner. Rows are driven low one at a time
//! (GPIO 13/12/14/27), columns are pulled up and read back
//! (GPIO 26/25/33/32). One key per scan; the tracker turns raw key-down
//! readings into discrete press / hold events.

use crate::types::{KeyEvent, HOLD_THRESHOLD_MS, KEYPAD_SCAN_MS};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Instant, Timer};
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyIOPin, Input, Output, PinDriver, Pull};
use log::{debug, info, warn};
use std::sync::Arc;

pub type KeyEventChannel = Channel<CriticalSectionRawMutex, KeyEvent, 8>;

const KEYMAP: [[char; 4]; 4] = [
    ['1', '4', '7', '*'],
    ['2', '5', '8', '0'],
    ['3', '6', '9', '#'],
    ['A', 'B', 'C', 'D'],
];

pub struct KeypadScanner {
    rows: [PinDriver<'static, AnyIOPin, Output>; 4],
    cols: [PinDriver<'static, AnyIOPin, Input>; 4],
    tracker: KeyTracker,
}

impl KeypadScanner {
    pub fn new(row_pins: [AnyIOPin; 4], col_pins: [AnyIOPin; 4]) -> Result<Self, KeypadError> {
        let mut rows = Vec::new();
        for pin in row_pins {
            let mut driver = PinDriver::output(pin)
                .map_err(|e| KeypadError::GpioError(format!("row pin setup failed: {:?}", e)))?;
            driver
                .set_high()
                .map_err(|e| KeypadError::GpioError(format!("row pin idle failed: {:?}", e)))?;
            rows.push(driver);
        }

        let mut cols = Vec::new();
        for pin in col_pins {
            let mut driver = PinDriver::input(pin)
                .map_err(|e| KeypadError::GpioError(format!("col pin setup failed: {:?}", e)))?;
            driver
                .set_pull(Pull::Up)
                .map_err(|e| KeypadError::GpioError(format!("col pull-up failed: {:?}", e)))?;
            cols.push(driver);
        }

        info!("Keypad scanner initialized (4x4 matrix)");

        Ok(Self {
            rows: rows
                .try_into()
                .map_err(|_| KeypadError::GpioError("row pin count".to_string()))?,
            cols: cols
                .try_into()
                .map_err(|_| KeypadError::GpioError("col pin count".to_string()))?,
            tracker: KeyTracker::new(),
        })
    }

    /// One matrix pass; returns the first key found down, if any.
    fn scan_once(&mut self) -> Result<Option<char>, KeypadError> {
        let mut found = None;

        for (r, row) in self.rows.iter_mut().enumerate() {
            row.set_low()
                .map_err(|e| KeypadError::GpioError(format!("row drive failed: {:?}", e)))?;
            Ets::delay_us(10);

            for (c, col) in self.cols.iter().enumerate() {
                if col.is_low() && found.is_none() {
                    found = Some(KEYMAP[r][c]);
                }
            }

            row.set_high()
                .map_err(|e| KeypadError::GpioError(format!("row release failed: {:?}", e)))?;
        }

        Ok(found)
    }

    pub fn poll(&mut self) -> Result<Option<KeyEvent>, KeypadError> {
        let current = self.scan_once()?;
        Ok(self.tracker.update(current, Instant::now()))
    }
}

/// Turns per-scan key readings into events: a key released before the hold
/// threshold is a `Press`; crossing the threshold emits a single `Hold` and
/// swallows the eventual release. The 20ms scan period provides debounce.
pub struct KeyTracker {
    down: Option<(char, Instant)>,
    hold_sent: bool,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self {
            down: None,
            hold_sent: false,
        }
    }

    pub fn update(&mut self, current: Option<char>, now: Instant) -> Option<KeyEvent> {
        match (self.down, current) {
            (None, Some(key)) => {
                self.down = Some((key, now));
                self.hold_sent = false;
                None
            }
            (Some((key, down_at)), Some(cur)) if cur == key => {
                if !self.hold_sent
                    && now.duration_since(down_at) >= Duration::from_millis(HOLD_THRESHOLD_MS)
                {
                    self.hold_sent = true;
                    debug!("Key hold: {}", key);
                    return Some(KeyEvent::Hold(key));
                }
                None
            }
            (Some(_), Some(key)) => {
                // Rollover to a different key: restart tracking on the new one.
                self.down = Some((key, now));
                self.hold_sent = false;
                None
            }
            (Some((key, _)), None) => {
                let was_hold = self.hold_sent;
                self.down = None;
                self.hold_sent = false;
                if was_hold {
                    None
                } else {
                    debug!("Key press: {}", key);
                    Some(KeyEvent::Press(key))
                }
            }
            (None, None) => None,
        }
    }
}

/// Scan loop: polls the matrix and pushes events into the channel the menu
/// dispatcher consumes. Runs for the lifetime of the process.
pub async fn run_keypad(mut scanner: KeypadScanner, events: Arc<KeyEventChannel>) -> ! {
    info!("Keypad scan loop started");
    loop {
        match scanner.poll() {
            Ok(Some(event)) => {
                if events.try_send(event).is_err() {
                    warn!("Key event dropped - channel full");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Keypad scan failed: {}", e),
        }
        Timer::after(Duration::from_millis(KEYPAD_SCAN_MS)).await;
    }
}

#[derive(Debug, Clone)]
pub enum KeypadError {
    GpioError(String),
}

impl std::fmt::Display for KeypadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeypadError::GpioError(msg) => write!(f, "GPIO error: {}", msg),
        }
    }
}

impl std::error::Error for KeypadError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn test_short_press_on_release() {
        let mut tracker = KeyTracker::new();
        let t0 = Instant::now();

        assert_eq!(tracker.update(Some('5'), t0), None);
        assert_eq!(tracker.update(Some('5'), ms(t0, 100)), None);
        assert_eq!(tracker.update(None, ms(t0, 200)), Some(KeyEvent::Press('5')));
    }

    #[test]
    fn test_hold_emitted_once_release_swallowed() {
        let mut tracker = KeyTracker::new();
        let t0 = Instant::now();

        assert_eq!(tracker.update(Some('A'), t0), None);
        assert_eq!(
            tracker.update(Some('A'), ms(t0, HOLD_THRESHOLD_MS)),
            Some(KeyEvent::Hold('A'))
        );
        // Continuing to hold emits nothing further.
        assert_eq!(tracker.update(Some('A'), ms(t0, HOLD_THRESHOLD_MS + 300)), None);
        // Neither does the release.
        assert_eq!(tracker.update(None, ms(t0, HOLD_THRESHOLD_MS + 400)), None);
    }

    #[test]
    fn test_rollover_restarts_tracking() {
        let mut tracker = KeyTracker::new();
        let t0 = Instant::now();

        tracker.update(Some('1'), t0);
        assert_eq!(tracker.update(Some('2'), ms(t0, 100)), None);
        // The new key's hold clock starts at the rollover.
        assert_eq!(tracker.update(Some('2'), ms(t0, 300)), None);
        assert_eq!(
            tracker.update(Some('2'), ms(t0, 100 + HOLD_THRESHOLD_MS)),
            Some(KeyEvent::Hold('2'))
        );
    }
}
