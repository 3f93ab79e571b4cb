//! Bit-banged HX711 load cell ADC: DOUT on GPIO16, SCK on GPIO4. 24 data
//! pulses per conversion plus one gain pulse (channel A, gain 128).

use crate::scale::{RawLoadCell, ScaleError};
use embassy_time::{Duration, Instant};
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::gpio::{Gpio16, Gpio4, Input, Output, PinDriver};
use log::info;

const READY_TIMEOUT_MS: u64 = 500;

pub struct Hx711 {
    dout: PinDriver<'static, Gpio16, Input>,
    sck: PinDriver<'static, Gpio4, Output>,
}

impl Hx711 {
    pub fn new(gpio16: Gpio16, gpio4: Gpio4) -> Result<Self, ScaleError> {
        let dout = PinDriver::input(gpio16)
            .map_err(|e| ScaleError::GpioError(format!("Failed to configure GPIO16: {:?}", e)))?;
        let mut sck = PinDriver::output(gpio4)
            .map_err(|e| ScaleError::GpioError(format!("Failed to configure GPIO4: {:?}", e)))?;

        // SCK idles low; holding it high >60us would power the chip down.
        sck.set_low()
            .map_err(|e| ScaleError::GpioError(format!("Failed to lower SCK: {:?}", e)))?;

        info!("HX711 initialized (DOUT GPIO16, SCK GPIO4)");
        Ok(Self { dout, sck })
    }

    // DOUT going low signals a conversion is ready.
    fn wait_ready(&self) -> Result<(), ScaleError> {
        let deadline = Instant::now() + Duration::from_millis(READY_TIMEOUT_MS);
        while self.dout.is_high() {
            if Instant::now() > deadline {
                return Err(ScaleError::Timeout);
            }
            FreeRtos::delay_ms(1);
        }
        Ok(())
    }

    fn pulse(&mut self) -> Result<bool, ScaleError> {
        self.sck
            .set_high()
            .map_err(|e| ScaleError::GpioError(format!("SCK high failed: {:?}", e)))?;
        Ets::delay_us(1);
        let bit = self.dout.is_high();
        self.sck
            .set_low()
            .map_err(|e| ScaleError::GpioError(format!("SCK low failed: {:?}", e)))?;
        Ets::delay_us(1);
        Ok(bit)
    }
}

impl RawLoadCell for Hx711 {
    fn read_raw(&mut self) -> Result<i32, ScaleError> {
        self.wait_ready()?;

        let mut value: u32 = 0;
        for _ in 0..24 {
            value = (value << 1) | self.pulse()? as u32;
        }
        // 25th pulse selects channel A / gain 128 for the next conversion.
        self.pulse()?;

        Ok(sign_extend_24(value))
    }
}

// The HX711 emits 24-bit two's complement, MSB first.
fn sign_extend_24(value: u32) -> i32 {
    if value & 0x0080_0000 != 0 {
        (value | 0xFF00_0000) as i32
    } else {
        value as i32
    }
}
