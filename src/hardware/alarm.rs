use esp_idf_svc::hal::gpio::{Gpio23, Gpio5, Output, PinDriver};
use log::{error, info};

/// Relay + buzzer outputs. The relay is wired so HIGH keeps the filling
/// mechanism energized; cutoff drives it LOW. The buzzer is pulsed by the
/// monitor loop while cutoff is active.
pub struct AlarmActuator {
    relay_pin: PinDriver<'static, Gpio23, Output>,
    buzzer_pin: PinDriver<'static, Gpio5, Output>,
    cutoff_active: bool,
    buzzer_active: bool,
}

impl AlarmActuator {
    pub fn new(gpio23: Gpio23, gpio5: Gpio5) -> Result<Self, AlarmError> {
        let mut relay_pin = PinDriver::output(gpio23)
            .map_err(|e| AlarmError::GpioError(format!("Failed to configure GPIO23: {:?}", e)))?;
        let mut buzzer_pin = PinDriver::output(gpio5)
            .map_err(|e| AlarmError::GpioError(format!("Failed to configure GPIO5: {:?}", e)))?;

        // Boot into the normal (energized) state, buzzer quiet.
        relay_pin.set_high().map_err(|e| {
            AlarmError::GpioError(format!("Failed to set initial relay state: {:?}", e))
        })?;
        buzzer_pin.set_low().map_err(|e| {
            AlarmError::GpioError(format!("Failed to set initial buzzer state: {:?}", e))
        })?;

        info!("Alarm actuator initialized: relay GPIO23 (HIGH=run), buzzer GPIO5");

        Ok(Self {
            relay_pin,
            buzzer_pin,
            cutoff_active: false,
            buzzer_active: false,
        })
    }

    /// Drive the relay into or out of the cutoff state. Idempotent.
    pub fn set_cutoff(&mut self, active: bool) -> Result<(), AlarmError> {
        if self.cutoff_active == active {
            return Ok(());
        }

        if active {
            self.relay_pin
                .set_low()
                .map_err(|e| AlarmError::GpioError(format!("Failed to set relay low: {:?}", e)))?;
            info!("Relay CUTOFF (GPIO23 LOW)");
        } else {
            self.relay_pin
                .set_high()
                .map_err(|e| AlarmError::GpioError(format!("Failed to set relay high: {:?}", e)))?;
            info!("Relay restored (GPIO23 HIGH)");
        }

        self.cutoff_active = active;
        Ok(())
    }

    pub fn set_buzzer(&mut self, on: bool) -> Result<(), AlarmError> {
        if self.buzzer_active == on {
            return Ok(());
        }

        if on {
            self.buzzer_pin
                .set_high()
                .map_err(|e| AlarmError::GpioError(format!("Failed to set buzzer high: {:?}", e)))?;
        } else {
            self.buzzer_pin
                .set_low()
                .map_err(|e| AlarmError::GpioError(format!("Failed to set buzzer low: {:?}", e)))?;
        }

        self.buzzer_active = on;
        Ok(())
    }

    pub fn silence(&mut self) -> Result<(), AlarmError> {
        self.set_buzzer(false)
    }

    pub fn is_cutoff(&self) -> bool {
        self.cutoff_active
    }

    /// Emergency path: force the relay into cutoff without the idempotence
    /// bookkeeping. Used if the monitor task ever dies mid-fault.
    pub fn cutoff_immediately(&mut self) -> Result<(), AlarmError> {
        match self.relay_pin.set_low() {
            Ok(_) => {
                error!("EMERGENCY: relay forced to cutoff (GPIO23 LOW)");
                self.cutoff_active = true;
                Ok(())
            }
            Err(e) => {
                error!("CRITICAL: failed to force relay cutoff: {:?}", e);
                Err(AlarmError::GpioError(format!("Emergency cutoff failed: {:?}", e)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum AlarmError {
    GpioError(String),
}

impl std::fmt::Display for AlarmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmError::GpioError(msg) => write!(f, "GPIO error: {}", msg),
        }
    }
}

impl std::error::Error for AlarmError {}
