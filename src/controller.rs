use crate::{
    hardware::alarm::AlarmActuator,
    hardware::display::{DisplayController, DisplayView},
    hardware::hx711::Hx711,
    hardware::keypad::{run_keypad, KeyEventChannel, KeypadScanner},
    menu::{MenuCommand, MenuEvent, MenuStateMachine, Screen},
    monitor::run_monitor,
    scale::{LoadCellScale, SampleOutcome},
    state::StateManager,
    storage::{effective_limit_g, LimitStore},
    types::{
        CutoffPolicy, KeyEvent, TareStatus, WeightSample, LIVE_SAMPLES, POST_HOLD_DEBOUNCE_MS,
        RENDER_TICK_MS, SAMPLE_PERIOD_MS, SAVED_BANNER_MS, TARE_BANNER_MS, TARE_SAMPLES,
        WARN_BANNER_MS,
    },
};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Instant, Timer};
use esp_idf_svc::hal::i2c::I2cDriver;
use log::{error, info, warn};
use std::sync::Arc;

// Commands the dispatcher sends to the scale task.
#[derive(Debug, Clone)]
pub enum ScaleCommand {
    Tare { samples: usize },
    SetCalibration(f32),
}

pub type ScaleCommandChannel = Channel<CriticalSectionRawMutex, ScaleCommand, 5>;
pub type TareDoneChannel = Channel<CriticalSectionRawMutex, bool, 1>;

pub struct CutoffController {
    state_manager: StateManager,
    menu: MenuStateMachine,
    display: DisplayController<I2cDriver<'static>>,
    storage: LimitStore,
    policy: CutoffPolicy,

    key_events: Arc<KeyEventChannel>,
    scale_commands: Arc<ScaleCommandChannel>,
    tare_done: Arc<TareDoneChannel>,
}

impl CutoffController {
    pub fn new(
        display: DisplayController<I2cDriver<'static>>,
        storage: LimitStore,
        policy: CutoffPolicy,
    ) -> Self {
        Self {
            state_manager: StateManager::new(),
            menu: MenuStateMachine::new(),
            display,
            storage,
            policy,
            key_events: Arc::new(Channel::new()),
            scale_commands: Arc::new(Channel::new()),
            tare_done: Arc::new(Channel::new()),
        }
    }

    pub async fn start(
        &mut self,
        spawner: Spawner,
        scale: LoadCellScale<Hx711>,
        keypad: KeypadScanner,
        alarm: AlarmActuator,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!("Starting cutoff controller with Embassy tasks");

        // Effective limit comes out of the store before anything runs.
        let limit_raw = self.storage.load_limit_raw().await;
        self.state_manager
            .set_weight_limit(effective_limit_g(limit_raw))
            .await;

        let state_handle = self.state_manager.get_state_handle();

        spawner
            .spawn(scale_task(
                scale,
                StateManager::from_handle(Arc::clone(&state_handle)),
                Arc::clone(&self.scale_commands),
                Arc::clone(&self.tare_done),
            ))
            .map_err(|_| "Failed to spawn scale task")?;

        spawner
            .spawn(keypad_task(keypad, Arc::clone(&self.key_events)))
            .map_err(|_| "Failed to spawn keypad task")?;

        spawner
            .spawn(monitor_task(
                StateManager::from_handle(state_handle),
                alarm,
                self.policy,
            ))
            .map_err(|_| "Failed to spawn monitor task")?;

        self.render(&Screen::MainMenu).await;
        self.dispatcher_loop().await;

        Ok(())
    }

    /// Single dispatcher for the interaction state machine: key events,
    /// tare completions and the periodic render tick all funnel through
    /// here, one at a time.
    async fn dispatcher_loop(&mut self) {
        info!("Menu dispatcher started");

        loop {
            let key_fut = self.key_events.receive();
            let tare_fut = self.tare_done.receive();
            let render_tick = Timer::after(Duration::from_millis(RENDER_TICK_MS));

            match select(key_fut, select(tare_fut, render_tick)).await {
                Either::First(event) => self.handle_key_event(event).await,
                Either::Second(Either::First(success)) => self.handle_tare_done(success).await,
                Either::Second(Either::Second(_)) => self.handle_render_tick().await,
            }
        }
    }

    async fn handle_key_event(&mut self, event: KeyEvent) {
        let tare_ok = self.state_manager.get_tare_status().await.is_ok();
        let commands = self.menu.handle_event(MenuEvent::Key(event), tare_ok);
        self.execute(commands.into_iter()).await;

        // A processed hold blocks further input for a second so the same
        // hold cannot double-trigger; anything scanned meanwhile is dropped.
        if matches!(event, KeyEvent::Hold(_)) {
            Timer::after(Duration::from_millis(POST_HOLD_DEBOUNCE_MS)).await;
            while self.key_events.try_receive().is_ok() {}
        }
    }

    async fn handle_tare_done(&mut self, success: bool) {
        let event = if success {
            MenuEvent::TareFinished
        } else {
            MenuEvent::TareFailed
        };
        let tare_ok = self.state_manager.get_tare_status().await.is_ok();
        let commands = self.menu.handle_event(event, tare_ok);
        self.execute(commands.into_iter()).await;
    }

    async fn handle_render_tick(&mut self) {
        let tare_ok = self.state_manager.get_tare_status().await.is_ok();
        let commands = self.menu.handle_event(MenuEvent::Tick, tare_ok);
        self.execute(commands.into_iter()).await;
    }

    async fn execute(&mut self, commands: impl Iterator<Item = MenuCommand>) {
        for command in commands {
            match command {
                MenuCommand::StartTare => {
                    if self
                        .scale_commands
                        .try_send(ScaleCommand::Tare {
                            samples: TARE_SAMPLES,
                        })
                        .is_err()
                    {
                        warn!("Failed to send tare command - channel full");
                    }
                }
                MenuCommand::AdjustCalibration(delta) => {
                    let factor = self.state_manager.get_calibration_factor().await + delta;
                    if self
                        .scale_commands
                        .try_send(ScaleCommand::SetCalibration(factor))
                        .is_err()
                    {
                        warn!("Failed to send calibration command - channel full");
                    }
                }
                MenuCommand::SaveLimit(raw) => match self.storage.save_limit_raw(raw).await {
                    Ok(stored) => {
                        self.state_manager
                            .set_weight_limit(effective_limit_g(stored))
                            .await;
                    }
                    Err(e) => {
                        error!("Failed to persist limit: {}", e);
                        self.state_manager
                            .set_error(Some(format!("limit save failed: {}", e)))
                            .await;
                    }
                },
                MenuCommand::Render(screen) => self.render(&screen).await,
            }
        }
    }

    async fn render(&mut self, screen: &Screen) {
        let state = self.state_manager.get_full_state().await;
        let view = DisplayView::from_state(&state);
        if let Err(e) = self.display.render(screen, &view) {
            error!("Display render failed: {}", e);
        }

        // Confirmation banners hold the screen, then fall back to the menu.
        let banner_ms = match screen {
            Screen::TareDone => TARE_BANNER_MS,
            Screen::TareFirst => WARN_BANNER_MS,
            Screen::LimitSaved => SAVED_BANNER_MS,
            _ => return,
        };

        Timer::after(Duration::from_millis(banner_ms)).await;
        let state = self.state_manager.get_full_state().await;
        let view = DisplayView::from_state(&state);
        if let Err(e) = self.display.render(&Screen::MainMenu, &view) {
            error!("Display render failed: {}", e);
        }
    }
}

// Embassy task functions

/// Owns the load cell: samples continuously into the shared state and
/// executes tare/calibration commands from the dispatcher.
#[embassy_executor::task]
async fn scale_task(
    mut scale: LoadCellScale<Hx711>,
    state: StateManager,
    commands: Arc<ScaleCommandChannel>,
    tare_done: Arc<TareDoneChannel>,
) {
    info!("Scale task started");

    loop {
        let command_fut = commands.receive();
        let tick = Timer::after(Duration::from_millis(SAMPLE_PERIOD_MS));

        match select(command_fut, tick).await {
            Either::First(ScaleCommand::Tare { samples }) => match scale.tare(samples) {
                Ok(offset) => {
                    info!("Tare captured: raw offset {}", offset);
                    state.set_tare_status(TareStatus::Ok).await;
                    tare_done.send(true).await;
                }
                Err(e) => {
                    error!("Tare failed: {}", e);
                    state.set_error(Some(format!("tare failed: {}", e))).await;
                    tare_done.send(false).await;
                }
            },
            Either::First(ScaleCommand::SetCalibration(factor)) => {
                match scale.set_calibration_factor(factor) {
                    Ok(()) => state.set_calibration_factor(factor).await,
                    Err(e) => warn!("Calibration factor rejected: {}", e),
                }
            }
            Either::Second(_) => match scale.sample(LIVE_SAMPLES) {
                Ok(SampleOutcome::Fresh { grams, raw_avg }) => {
                    state
                        .update_scale_sample(WeightSample {
                            grams,
                            raw_avg,
                            received_at: Instant::now(),
                        })
                        .await;
                }
                // Stale outcome keeps the old timestamp; the watchdog ages it out.
                Ok(SampleOutcome::Stale { .. }) => {}
                Err(e) => warn!("No scale reading yet: {}", e),
            },
        }
    }
}

#[embassy_executor::task]
async fn keypad_task(scanner: KeypadScanner, events: Arc<KeyEventChannel>) {
    run_keypad(scanner, events).await
}

#[embassy_executor::task]
async fn monitor_task(state: StateManager, alarm: AlarmActuator, policy: CutoffPolicy) {
    run_monitor(state, alarm, policy).await
}
