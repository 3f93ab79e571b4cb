use crate::types::{KeyEvent, MenuScreen, CALIBRATION_STEP, MAX_LIMIT_DIGITS};
use heapless::{String, Vec};
use log::{debug, info};

/// Inputs to the menu state machine. Key events come from the keypad
/// scanner, `TareFinished` from the scale task after an offset capture,
/// `Tick` from the dispatcher's periodic render timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuEvent {
    Key(KeyEvent),
    TareFinished,
    TareFailed,
    Tick,
}

/// Side effects requested by a transition. The machine itself never touches
/// hardware or storage; the dispatcher executes these in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuCommand {
    StartTare,
    AdjustCalibration(f32),
    SaveLimit(u16),
    Render(Screen),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    MainMenu,
    TareInProgress,
    TareDone,
    TareFirst,
    CalibrationView,
    LimitEntry(String<MAX_LIMIT_DIGITS>),
    LimitSaved,
}

/// Keypad-driven interaction state machine: one active screen, transitions
/// on discrete key events only. Main-menu actions require a hold; short
/// presses of 'A'/'B'/'C' there are deliberate no-ops.
pub struct MenuStateMachine {
    screen: MenuScreen,
    pending_limit: String<MAX_LIMIT_DIGITS>,
}

impl MenuStateMachine {
    pub fn new() -> Self {
        Self {
            screen: MenuScreen::MainMenu,
            pending_limit: String::new(),
        }
    }

    pub fn screen(&self) -> MenuScreen {
        self.screen
    }

    pub fn pending_limit(&self) -> &str {
        &self.pending_limit
    }

    pub fn handle_event(&mut self, event: MenuEvent, tare_ok: bool) -> Vec<MenuCommand, 4> {
        let previous = self.screen;
        let commands = match self.screen {
            MenuScreen::MainMenu => self.handle_main_menu(event, tare_ok),
            MenuScreen::Taring => self.handle_taring(event),
            MenuScreen::Calibrating => self.handle_calibrating(event),
            MenuScreen::SettingLimit => self.handle_setting_limit(event),
        };

        if self.screen != previous {
            info!("Menu transition: {:?} -> {:?}", previous, self.screen);
        }
        commands
    }

    fn handle_main_menu(&mut self, event: MenuEvent, tare_ok: bool) -> Vec<MenuCommand, 4> {
        let mut commands = Vec::new();
        match event {
            MenuEvent::Key(KeyEvent::Hold('A')) => {
                self.screen = MenuScreen::Taring;
                let _ = commands.push(MenuCommand::StartTare);
                let _ = commands.push(MenuCommand::Render(Screen::TareInProgress));
            }
            MenuEvent::Key(KeyEvent::Hold('B')) => {
                if tare_ok {
                    self.screen = MenuScreen::Calibrating;
                    let _ = commands.push(MenuCommand::Render(Screen::CalibrationView));
                } else {
                    debug!("Calibration refused: tare not done");
                    let _ = commands.push(MenuCommand::Render(Screen::TareFirst));
                }
            }
            MenuEvent::Key(KeyEvent::Hold('C')) => {
                self.screen = MenuScreen::SettingLimit;
                self.pending_limit.clear();
                let _ = commands.push(MenuCommand::Render(Screen::LimitEntry(
                    self.pending_limit.clone(),
                )));
            }
            MenuEvent::Tick => {
                let _ = commands.push(MenuCommand::Render(Screen::MainMenu));
            }
            // Short presses and other keys do nothing on the main menu.
            _ => {}
        }
        commands
    }

    // The offset capture is in flight on the scale task; key input is
    // ignored until it reports back.
    fn handle_taring(&mut self, event: MenuEvent) -> Vec<MenuCommand, 4> {
        let mut commands = Vec::new();
        match event {
            MenuEvent::TareFinished => {
                self.screen = MenuScreen::MainMenu;
                let _ = commands.push(MenuCommand::Render(Screen::TareDone));
            }
            MenuEvent::TareFailed => {
                // Sensor fault during capture: back to the menu, no banner.
                self.screen = MenuScreen::MainMenu;
                let _ = commands.push(MenuCommand::Render(Screen::MainMenu));
            }
            _ => {}
        }
        commands
    }

    fn handle_calibrating(&mut self, event: MenuEvent) -> Vec<MenuCommand, 4> {
        let mut commands = Vec::new();
        match event {
            MenuEvent::Key(KeyEvent::Press('A')) => {
                let _ = commands.push(MenuCommand::AdjustCalibration(CALIBRATION_STEP));
            }
            MenuEvent::Key(KeyEvent::Press('B')) => {
                let _ = commands.push(MenuCommand::AdjustCalibration(-CALIBRATION_STEP));
            }
            MenuEvent::Key(KeyEvent::Press('#')) => {
                self.screen = MenuScreen::MainMenu;
                let _ = commands.push(MenuCommand::Render(Screen::MainMenu));
            }
            MenuEvent::Tick => {
                let _ = commands.push(MenuCommand::Render(Screen::CalibrationView));
            }
            _ => {}
        }
        commands
    }

    fn handle_setting_limit(&mut self, event: MenuEvent) -> Vec<MenuCommand, 4> {
        let mut commands = Vec::new();
        match event {
            // The digit cap applies to every digit, not just '9'.
            MenuEvent::Key(KeyEvent::Press(c)) if c.is_ascii_digit() => {
                if self.pending_limit.len() < MAX_LIMIT_DIGITS {
                    let _ = self.pending_limit.push(c);
                }
                let _ = commands.push(MenuCommand::Render(Screen::LimitEntry(
                    self.pending_limit.clone(),
                )));
            }
            MenuEvent::Key(KeyEvent::Press('D')) => {
                self.pending_limit.clear();
                let _ = commands.push(MenuCommand::Render(Screen::LimitEntry(
                    self.pending_limit.clone(),
                )));
            }
            MenuEvent::Key(KeyEvent::Press('*')) => {
                // Empty input parses as zero; the store applies its own
                // bounds on the raw byte.
                let raw: u16 = self.pending_limit.parse().unwrap_or(0);
                self.screen = MenuScreen::MainMenu;
                self.pending_limit.clear();
                let _ = commands.push(MenuCommand::SaveLimit(raw));
                let _ = commands.push(MenuCommand::Render(Screen::LimitSaved));
            }
            MenuEvent::Tick => {
                let _ = commands.push(MenuCommand::Render(Screen::LimitEntry(
                    self.pending_limit.clone(),
                )));
            }
            _ => {}
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(k: char) -> MenuEvent {
        MenuEvent::Key(KeyEvent::Press(k))
    }

    fn hold(k: char) -> MenuEvent {
        MenuEvent::Key(KeyEvent::Hold(k))
    }

    fn digits(s: &str) -> String<MAX_LIMIT_DIGITS> {
        let mut buf = String::new();
        buf.push_str(s).unwrap();
        buf
    }

    #[test]
    fn test_tare_flow() {
        let mut menu = MenuStateMachine::new();

        let commands = menu.handle_event(hold('A'), false);
        assert_eq!(menu.screen(), MenuScreen::Taring);
        assert_eq!(commands[0], MenuCommand::StartTare);
        assert_eq!(commands[1], MenuCommand::Render(Screen::TareInProgress));

        // Keys are ignored while the capture runs.
        assert!(menu.handle_event(press('5'), false).is_empty());
        assert!(menu.handle_event(hold('C'), false).is_empty());
        assert_eq!(menu.screen(), MenuScreen::Taring);

        let commands = menu.handle_event(MenuEvent::TareFinished, true);
        assert_eq!(menu.screen(), MenuScreen::MainMenu);
        assert_eq!(commands[0], MenuCommand::Render(Screen::TareDone));
    }

    #[test]
    fn test_tare_failure_returns_without_banner() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('A'), false);
        assert_eq!(menu.screen(), MenuScreen::Taring);

        let commands = menu.handle_event(MenuEvent::TareFailed, false);
        assert_eq!(menu.screen(), MenuScreen::MainMenu);
        assert_eq!(commands[0], MenuCommand::Render(Screen::MainMenu));
    }

    #[test]
    fn test_calibration_requires_tare() {
        let mut menu = MenuStateMachine::new();

        let commands = menu.handle_event(hold('B'), false);
        assert_eq!(menu.screen(), MenuScreen::MainMenu);
        assert_eq!(commands[0], MenuCommand::Render(Screen::TareFirst));

        let commands = menu.handle_event(hold('B'), true);
        assert_eq!(menu.screen(), MenuScreen::Calibrating);
        assert_eq!(commands[0], MenuCommand::Render(Screen::CalibrationView));
    }

    #[test]
    fn test_calibration_adjustments() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('B'), true);

        let commands = menu.handle_event(press('A'), true);
        assert_eq!(commands[0], MenuCommand::AdjustCalibration(2.0));

        let commands = menu.handle_event(press('B'), true);
        assert_eq!(commands[0], MenuCommand::AdjustCalibration(-2.0));

        let commands = menu.handle_event(press('#'), true);
        assert_eq!(menu.screen(), MenuScreen::MainMenu);
        assert_eq!(commands[0], MenuCommand::Render(Screen::MainMenu));
    }

    #[test]
    fn test_calibration_live_tick() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('B'), true);

        let commands = menu.handle_event(MenuEvent::Tick, true);
        assert_eq!(commands[0], MenuCommand::Render(Screen::CalibrationView));
    }

    #[test]
    fn test_limit_entry_accumulates_digits() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);
        assert_eq!(menu.screen(), MenuScreen::SettingLimit);

        menu.handle_event(press('2'), true);
        menu.handle_event(press('5'), true);
        let commands = menu.handle_event(press('0'), true);
        assert_eq!(menu.pending_limit(), "250");
        assert_eq!(
            commands[0],
            MenuCommand::Render(Screen::LimitEntry(digits("250")))
        );
    }

    #[test]
    fn test_limit_entry_cap_uniform_for_all_digits() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);

        for k in ['1', '2', '3'] {
            menu.handle_event(press(k), true);
        }
        // A fourth digit is rejected regardless of which digit it is.
        menu.handle_event(press('4'), true);
        menu.handle_event(press('9'), true);
        assert_eq!(menu.pending_limit(), "123");
    }

    #[test]
    fn test_limit_entry_clear() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);
        menu.handle_event(press('7'), true);
        menu.handle_event(press('8'), true);

        let commands = menu.handle_event(press('D'), true);
        assert_eq!(menu.pending_limit(), "");
        assert_eq!(
            commands[0],
            MenuCommand::Render(Screen::LimitEntry(digits("")))
        );
    }

    #[test]
    fn test_limit_save() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);
        for k in ['2', '5', '0'] {
            menu.handle_event(press(k), true);
        }

        let commands = menu.handle_event(press('*'), true);
        assert_eq!(menu.screen(), MenuScreen::MainMenu);
        assert_eq!(commands[0], MenuCommand::SaveLimit(250));
        assert_eq!(commands[1], MenuCommand::Render(Screen::LimitSaved));
    }

    #[test]
    fn test_empty_limit_saves_zero() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);

        let commands = menu.handle_event(press('*'), true);
        assert_eq!(commands[0], MenuCommand::SaveLimit(0));
    }

    #[test]
    fn test_limit_entry_reset_on_reentry() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);
        menu.handle_event(press('9'), true);
        menu.handle_event(press('*'), true);

        // Re-entering starts from an empty buffer.
        menu.handle_event(hold('C'), true);
        assert_eq!(menu.pending_limit(), "");
    }

    #[test]
    fn test_main_menu_short_presses_are_noops() {
        let mut menu = MenuStateMachine::new();
        for k in ['A', 'B', 'C', '5', '*', '#', 'D'] {
            assert!(menu.handle_event(press(k), true).is_empty());
            assert_eq!(menu.screen(), MenuScreen::MainMenu);
        }
    }

    #[test]
    fn test_main_menu_tick_renders() {
        let mut menu = MenuStateMachine::new();
        let commands = menu.handle_event(MenuEvent::Tick, false);
        assert_eq!(commands[0], MenuCommand::Render(Screen::MainMenu));
    }

    #[test]
    fn test_irrelevant_keys_ignored_in_limit_entry() {
        let mut menu = MenuStateMachine::new();
        menu.handle_event(hold('C'), true);

        assert!(menu.handle_event(press('A'), true).is_empty());
        assert!(menu.handle_event(press('#'), true).is_empty());
        assert_eq!(menu.screen(), MenuScreen::SettingLimit);
    }
}
