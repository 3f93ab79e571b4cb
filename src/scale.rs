use log::warn;

/// Raw load cell interface. The HX711 driver implements this for the real
/// hardware; tests substitute a scripted cell.
pub trait RawLoadCell {
    /// One raw conversion. Bounded: implementations must time out rather
    /// than wait forever for the chip to become ready.
    fn read_raw(&mut self) -> Result<i32, ScaleError>;
}

/// Calibrated reader over a raw load cell: averages raw counts, subtracts
/// the tare offset and divides by the calibration factor.
pub struct LoadCellScale<C: RawLoadCell> {
    cell: C,
    calibration_factor: f32,
    tare_offset: i32,
    last_known: Option<f32>,
}

/// Result of a sampling round. `Stale` carries the last good value after a
/// sensor fault so callers can keep displaying something while the watchdog
/// window runs out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Fresh { grams: f32, raw_avg: i32 },
    Stale { grams: f32 },
}

impl SampleOutcome {
    pub fn grams(&self) -> f32 {
        match self {
            SampleOutcome::Fresh { grams, .. } | SampleOutcome::Stale { grams } => *grams,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, SampleOutcome::Fresh { .. })
    }
}

impl<C: RawLoadCell> LoadCellScale<C> {
    pub fn new(cell: C, calibration_factor: f32) -> Result<Self, ScaleError> {
        if !factor_is_usable(calibration_factor) {
            return Err(ScaleError::InvalidFactor(calibration_factor));
        }
        Ok(Self {
            cell,
            calibration_factor,
            tare_offset: 0,
            last_known: None,
        })
    }

    /// Average `n` raw readings and return the calibrated weight. A raw
    /// fault degrades to the last known value; only the very first sampling
    /// round can fail outright.
    pub fn sample(&mut self, n: usize) -> Result<SampleOutcome, ScaleError> {
        match self.read_average(n) {
            Ok(raw_avg) => {
                let grams = (raw_avg - self.tare_offset) as f32 / self.calibration_factor;
                self.last_known = Some(grams);
                Ok(SampleOutcome::Fresh { grams, raw_avg })
            }
            Err(e) => {
                warn!("Load cell read failed: {} - keeping last value", e);
                match self.last_known {
                    Some(grams) => Ok(SampleOutcome::Stale { grams }),
                    None => Err(ScaleError::NoReading),
                }
            }
        }
    }

    /// Capture the average of `n` raw readings as the new tare offset.
    /// Takes effect on the next `sample` call.
    pub fn tare(&mut self, n: usize) -> Result<i32, ScaleError> {
        let offset = self.read_average(n)?;
        self.tare_offset = offset;
        Ok(offset)
    }

    pub fn set_calibration_factor(&mut self, factor: f32) -> Result<(), ScaleError> {
        if !factor_is_usable(factor) {
            return Err(ScaleError::InvalidFactor(factor));
        }
        self.calibration_factor = factor;
        Ok(())
    }

    pub fn calibration_factor(&self) -> f32 {
        self.calibration_factor
    }

    pub fn tare_offset(&self) -> i32 {
        self.tare_offset
    }

    fn read_average(&mut self, n: usize) -> Result<i32, ScaleError> {
        let n = n.max(1);
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += self.cell.read_raw()? as i64;
        }
        Ok((sum / n as i64) as i32)
    }
}

// The factor is a divisor; a near-zero value would blow up every reading.
fn factor_is_usable(factor: f32) -> bool {
    factor.is_finite() && factor.abs() > f32::EPSILON
}

#[derive(Debug, Clone)]
pub enum ScaleError {
    Timeout,
    InvalidFactor(f32),
    NoReading,
    GpioError(String),
}

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::Timeout => write!(f, "load cell not ready within timeout"),
            ScaleError::InvalidFactor(v) => write!(f, "calibration factor {} is unusable", v),
            ScaleError::NoReading => write!(f, "no reading available yet"),
            ScaleError::GpioError(msg) => write!(f, "GPIO error: {}", msg),
        }
    }
}

impl std::error::Error for ScaleError {}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedCell {
        readings: Vec<Result<i32, ScaleError>>,
        pos: usize,
    }

    impl ScriptedCell {
        fn new(readings: Vec<Result<i32, ScaleError>>) -> Self {
            Self { readings, pos: 0 }
        }
    }

    impl RawLoadCell for ScriptedCell {
        fn read_raw(&mut self) -> Result<i32, ScaleError> {
            let r = self.readings[self.pos.min(self.readings.len() - 1)].clone();
            self.pos += 1;
            r
        }
    }

    #[test]
    fn test_calibrated_sample() {
        let cell = ScriptedCell::new(vec![Ok(1950), Ok(2050)]);
        let mut scale = LoadCellScale::new(cell, 200.0).unwrap();

        // avg 2000 / 200 = 10g
        let outcome = scale.sample(2).unwrap();
        assert_eq!(outcome.grams(), 10.0);
        assert!(outcome.is_fresh());
    }

    #[test]
    fn test_tare_offset_applies_to_next_sample() {
        let cell = ScriptedCell::new(vec![Ok(500), Ok(500), Ok(700)]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();

        let offset = scale.tare(2).unwrap();
        assert_eq!(offset, 500);

        let outcome = scale.sample(1).unwrap();
        assert_eq!(outcome.grams(), 2.0);
    }

    #[test]
    fn test_tare_idempotent_for_steady_load() {
        let cell = ScriptedCell::new(vec![Ok(1000); 10]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();

        let first = scale.tare(3).unwrap();
        let second = scale.tare(3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_factor_applies_before_next_read() {
        let cell = ScriptedCell::new(vec![Ok(400), Ok(400)]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();

        assert_eq!(scale.sample(1).unwrap().grams(), 4.0);
        scale.set_calibration_factor(200.0).unwrap();
        assert_eq!(scale.sample(1).unwrap().grams(), 2.0);
    }

    #[test]
    fn test_zero_factor_rejected() {
        let cell = ScriptedCell::new(vec![Ok(0)]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();
        assert!(matches!(
            scale.set_calibration_factor(0.0),
            Err(ScaleError::InvalidFactor(_))
        ));
        // Rejected factor leaves the old one in place.
        assert_eq!(scale.calibration_factor(), 100.0);
    }

    #[test]
    fn test_fault_degrades_to_last_known() {
        let cell = ScriptedCell::new(vec![Ok(300), Err(ScaleError::Timeout)]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();

        assert_eq!(scale.sample(1).unwrap().grams(), 3.0);
        let stale = scale.sample(1).unwrap();
        assert_eq!(stale, SampleOutcome::Stale { grams: 3.0 });
    }

    #[test]
    fn test_fault_with_no_history_is_an_error() {
        let cell = ScriptedCell::new(vec![Err(ScaleError::Timeout)]);
        let mut scale = LoadCellScale::new(cell, 100.0).unwrap();
        assert!(matches!(scale.sample(1), Err(ScaleError::NoReading)));
    }
}
