//! SH1106 OLED render sink for the menu screens.
//! Using embedded-graphics for clean, efficient rendering

use crate::menu::Screen;
use crate::types::{SystemState, TareStatus};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, ascii::FONT_9X15, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use esp_idf_svc::hal::{
    gpio::{InputPin, OutputPin},
    i2c::{I2cConfig, I2cDriver},
    peripheral::Peripheral,
    prelude::*,
};
use log::{debug, info};
use sh1106::Builder;

/// Live values a screen may need; snapshot of the shared state taken by the
/// dispatcher right before rendering.
#[derive(Debug, Clone)]
pub struct DisplayView {
    pub weight_g: f32,
    pub limit_g: f32,
    pub calibration_factor: f32,
    pub tare_status: TareStatus,
}

impl DisplayView {
    pub fn from_state(state: &SystemState) -> Self {
        Self {
            weight_g: state.scale_sample.as_ref().map(|s| s.grams).unwrap_or(0.0),
            limit_g: state.weight_limit_g,
            calibration_factor: state.calibration_factor,
            tare_status: state.tare_status,
        }
    }
}

pub struct DisplayController<I2C>
where
    I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
{
    display: sh1106::mode::GraphicsMode<sh1106::interface::I2cInterface<I2C>>,
}

impl<I2C> DisplayController<I2C>
where
    I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    <I2C as embedded_hal::blocking::i2c::Write>::Error: std::fmt::Debug,
    <I2C as embedded_hal::blocking::i2c::WriteRead>::Error: std::fmt::Debug,
{
    pub fn new(i2c: I2C) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing SH1106 OLED display");

        let mut display: sh1106::mode::GraphicsMode<_> = Builder::new().connect_i2c(i2c).into();

        display
            .init()
            .map_err(|e| format!("Display init failed: {:?}", e))?;
        display.clear();
        display
            .flush()
            .map_err(|e| format!("Display flush failed: {:?}", e))?;

        info!("SH1106 display initialized successfully");

        Ok(Self { display })
    }

    /// Compose and flush one full frame for the given screen.
    pub fn render(&mut self, screen: &Screen, view: &DisplayView) -> Result<(), Box<dyn std::error::Error>> {
        debug!("Rendering screen: {:?}", screen);
        self.display.clear();

        match screen {
            Screen::MainMenu => {
                self.draw_text(40, 0, 1, "MAIN MENU")?;
                self.draw_text(30, 17, 1, &format!("Tare: {}", view.tare_status))?;
                self.draw_text(25, 28, 1, &format!("Limit: {:.1} Kg", view.limit_g / 1000.0))?;
                self.draw_text(20, 46, 1, "A:Tare, B:Calib")?;
                self.draw_text(16, 56, 1, "C: Set Limit Max")?;
            }
            Screen::TareInProgress => {
                self.draw_text(10, 25, 2, "Taring...")?;
            }
            Screen::TareDone => {
                self.draw_text(5, 25, 2, "Tare Done!")?;
            }
            Screen::TareFirst => {
                self.draw_text(4, 25, 2, "Tare First")?;
            }
            Screen::CalibrationView => {
                self.draw_text(13, 0, 1, "CALCULATING WEIGHT")?;
                self.draw_text(20, 25, 2, &format!("{:.2} ons", view.weight_g / 100.0))?;
                self.draw_text(18, 55, 1, &format!("Current: {:.1}", view.calibration_factor))?;
            }
            Screen::LimitEntry(digits) => {
                self.draw_text(9, 0, 1, "Input Limit Weight")?;
                self.draw_text(37, 23, 2, digits)?;
                self.draw_text(80, 26, 1, "ons")?;
                self.draw_text(20, 55, 1, "Press * to Save")?;
            }
            Screen::LimitSaved => {
                self.draw_text(30, 25, 2, "SAVED!")?;
            }
        }

        self.display
            .flush()
            .map_err(|e| format!("Display flush failed: {:?}", e))?;
        Ok(())
    }

    // Two size levels map to the two fonts the layout was designed around.
    fn draw_text(&mut self, x: i32, y: i32, size: u8, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        let style = match size {
            2 => MonoTextStyle::new(&FONT_9X15, BinaryColor::On),
            _ => MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
        };

        Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.display)
            .map_err(|e| format!("Display draw error: {:?}", e))?;
        Ok(())
    }

    pub fn show_splash(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Showing splash screen");

        self.display.clear();
        self.draw_text(10, 20, 2, "Hopper Scale")?;
        self.draw_text(20, 44, 1, "Initializing...")?;
        self.display
            .flush()
            .map_err(|e| format!("Display flush failed: {:?}", e))?;

        Ok(())
    }
}

/// Helper to create the display controller from the ESP32 I2C pins.
pub fn create_display_controller(
    sda: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
    scl: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
) -> Result<DisplayController<I2cDriver<'static>>, Box<dyn std::error::Error>> {
    info!("Setting up I2C for SH1106 display");

    let config = I2cConfig::new().baudrate(400.kHz().into());
    let i2c = I2cDriver::new(
        unsafe { esp_idf_svc::hal::i2c::I2C0::new() },
        sda,
        scl,
        &config,
    )?;

    DisplayController::new(i2c)
}
