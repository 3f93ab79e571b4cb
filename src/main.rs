use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_idf_svc::hal::gpio::IOPin;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use hopper_rs::controller::CutoffController;
use hopper_rs::hardware::alarm::AlarmActuator;
use hopper_rs::hardware::display::create_display_controller;
use hopper_rs::hardware::hx711::Hx711;
use hopper_rs::hardware::keypad::KeypadScanner;
use hopper_rs::scale::LoadCellScale;
use hopper_rs::storage::LimitStore;
use hopper_rs::types::{CutoffPolicy, DEFAULT_CALIBRATION_FACTOR, TARE_SAMPLES};
use log::{error, info, warn};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting hopper cutoff controller");

    let peripherals = Peripherals::take().unwrap();

    // Persisted weight limit; the store degrades to memory-only if NVS is unusable.
    let nvs = EspDefaultNvsPartition::take().ok();
    let storage = LimitStore::new(nvs);

    // A weighing cutoff without visible status must not run blind: display
    // init failure is fatal.
    let mut display =
        match create_display_controller(peripherals.pins.gpio21, peripherals.pins.gpio22) {
            Ok(display) => display,
            Err(e) => {
                error!("FATAL: display init failed: {} - halting", e);
                return;
            }
        };

    if let Err(e) = display.show_splash() {
        warn!("Splash render failed: {}", e);
    }
    Timer::after(Duration::from_secs(2)).await;

    let hx711 = match Hx711::new(peripherals.pins.gpio16, peripherals.pins.gpio4) {
        Ok(hx711) => hx711,
        Err(e) => {
            error!("Failed to initialize HX711: {}", e);
            return;
        }
    };

    let mut scale = match LoadCellScale::new(hx711, DEFAULT_CALIBRATION_FACTOR) {
        Ok(scale) => scale,
        Err(e) => {
            error!("Failed to create scale reader: {}", e);
            return;
        }
    };

    // Boot zero. The operator still has to tare before calibration counts.
    if let Err(e) = scale.tare(TARE_SAMPLES) {
        warn!("Boot tare failed: {} - scale starts with zero offset", e);
    }

    let alarm = match AlarmActuator::new(peripherals.pins.gpio23, peripherals.pins.gpio5) {
        Ok(alarm) => alarm,
        Err(e) => {
            error!("Failed to initialize relay/buzzer: {}", e);
            return;
        }
    };

    let keypad = match KeypadScanner::new(
        [
            peripherals.pins.gpio13.downgrade(),
            peripherals.pins.gpio12.downgrade(),
            peripherals.pins.gpio14.downgrade(),
            peripherals.pins.gpio27.downgrade(),
        ],
        [
            peripherals.pins.gpio26.downgrade(),
            peripherals.pins.gpio25.downgrade(),
            peripherals.pins.gpio33.downgrade(),
            peripherals.pins.gpio32.downgrade(),
        ],
    ) {
        Ok(keypad) => keypad,
        Err(e) => {
            error!("Failed to initialize keypad: {}", e);
            return;
        }
    };

    let mut controller = CutoffController::new(display, storage, CutoffPolicy::FailClosed);

    info!("Controller created successfully, starting...");

    if let Err(e) = controller.start(spawner, scale, keypad, alarm).await {
        error!("Controller start failed: {:?}", e);
    }
}
