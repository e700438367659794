// Physical input simulation: the input-device capability and its enigo backend.
use std::time::{Duration, Instant};

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{PilotError, PilotResult};
use crate::executor::hotkey::KeyToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Click,
    DoubleClick,
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Press,
    Release,
    Tap,
}

/// Capability: synthetic mouse and keyboard input at screen pixel positions.
///
/// Calls block until the OS has accepted the event. Implementations are
/// used from the loop's worker thread only.
pub trait InputDevice {
    /// Glide the cursor to `(x, y)` over `duration`.
    fn move_to(&mut self, x: f64, y: f64, duration: Duration) -> PilotResult<()>;

    /// Button event at the current cursor position.
    fn button(&mut self, button: MouseButton, action: ButtonAction) -> PilotResult<()>;

    /// Scroll by `delta` wheel notches; positive scrolls up.
    fn scroll(&mut self, delta: i32) -> PilotResult<()>;

    fn key(&mut self, key: KeyToken, direction: KeyDirection) -> PilotResult<()>;

    /// Put `text` where the next paste shortcut will pick it up.
    fn stage_text(&mut self, text: &str) -> PilotResult<()>;

    /// Press at `from`, travel to `to` over `duration`, release.
    fn drag(&mut self, from: (f64, f64), to: (f64, f64), duration: Duration) -> PilotResult<()>;

    fn cursor_position(&self) -> PilotResult<(f64, f64)>;
}

/// Press every key in order, then release them in reverse.
pub fn press_combo(device: &mut dyn InputDevice, keys: &[KeyToken]) -> PilotResult<()> {
    for key in keys {
        device.key(*key, KeyDirection::Press)?;
    }
    for key in keys.iter().rev() {
        device.key(*key, KeyDirection::Release)?;
    }
    Ok(())
}

const STEP_INTERVAL: Duration = Duration::from_millis(10);
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(60);

/// enigo for mouse/keyboard, arboard for the clipboard.
pub struct EnigoDevice {
    enigo: Enigo,
    clipboard: Option<arboard::Clipboard>,
}

impl EnigoDevice {
    pub fn new() -> PilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| PilotError::Executor(format!("input backend init: {e}")))?;
        Ok(Self {
            enigo,
            clipboard: None,
        })
    }

    fn abs_move(&mut self, x: f64, y: f64) -> PilotResult<()> {
        self.enigo
            .move_mouse(x.round() as i32, y.round() as i32, Coordinate::Abs)
            .map_err(input_err)
    }

    /// Linear glide from the current position, one step every 10ms.
    fn glide(&mut self, x: f64, y: f64, duration: Duration) -> PilotResult<()> {
        let steps = (duration.as_millis() / STEP_INTERVAL.as_millis()) as u32;
        if steps <= 1 {
            return self.abs_move(x, y);
        }
        let (sx, sy) = self.cursor_position()?;
        let started = Instant::now();
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            self.abs_move(sx + (x - sx) * t, sy + (y - sy) * t)?;
            let due = STEP_INTERVAL * i;
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        self.abs_move(x, y)
    }
}

impl InputDevice for EnigoDevice {
    fn move_to(&mut self, x: f64, y: f64, duration: Duration) -> PilotResult<()> {
        self.glide(x, y, duration)
    }

    fn button(&mut self, button: MouseButton, action: ButtonAction) -> PilotResult<()> {
        let b = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        match action {
            ButtonAction::Click => self.enigo.button(b, Direction::Click),
            ButtonAction::DoubleClick => {
                self.enigo.button(b, Direction::Click).map_err(input_err)?;
                std::thread::sleep(DOUBLE_CLICK_GAP);
                self.enigo.button(b, Direction::Click)
            }
            ButtonAction::Press => self.enigo.button(b, Direction::Press),
            ButtonAction::Release => self.enigo.button(b, Direction::Release),
        }
        .map_err(input_err)
    }

    fn scroll(&mut self, delta: i32) -> PilotResult<()> {
        // enigo scrolls down for positive lengths.
        self.enigo.scroll(-delta, Axis::Vertical).map_err(input_err)
    }

    fn key(&mut self, key: KeyToken, direction: KeyDirection) -> PilotResult<()> {
        let direction = match direction {
            KeyDirection::Press => Direction::Press,
            KeyDirection::Release => Direction::Release,
            KeyDirection::Tap => Direction::Click,
        };
        self.enigo.key(to_enigo_key(key)?, direction).map_err(input_err)
    }

    fn stage_text(&mut self, text: &str) -> PilotResult<()> {
        if self.clipboard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| PilotError::Executor(format!("clipboard init: {e}")))?;
            self.clipboard = Some(clipboard);
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard
                .set_text(text.to_string())
                .map_err(|e| PilotError::Executor(format!("clipboard write: {e}")))?;
        }
        Ok(())
    }

    fn drag(&mut self, from: (f64, f64), to: (f64, f64), duration: Duration) -> PilotResult<()> {
        self.abs_move(from.0, from.1)?;
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(input_err)?;
        let moved = self.glide(to.0, to.1, duration);
        // Never leave the button held, even if the glide failed.
        let released = self
            .enigo
            .button(Button::Left, Direction::Release)
            .map_err(input_err);
        moved.and(released)
    }

    fn cursor_position(&self) -> PilotResult<(f64, f64)> {
        let (x, y) = self.enigo.location().map_err(input_err)?;
        Ok((x as f64, y as f64))
    }
}

fn input_err(e: enigo::InputError) -> PilotError {
    PilotError::Executor(format!("input: {e}"))
}

fn to_enigo_key(key: KeyToken) -> PilotResult<Key> {
    let k = match key {
        KeyToken::Control => Key::Control,
        KeyToken::Alt => Key::Alt,
        KeyToken::Shift => Key::Shift,
        KeyToken::Meta => Key::Meta,
        KeyToken::Return => Key::Return,
        KeyToken::Tab => Key::Tab,
        KeyToken::Escape => Key::Escape,
        KeyToken::Backspace => Key::Backspace,
        KeyToken::Delete => Key::Delete,
        KeyToken::Space => Key::Space,
        KeyToken::Up => Key::UpArrow,
        KeyToken::Down => Key::DownArrow,
        KeyToken::Left => Key::LeftArrow,
        KeyToken::Right => Key::RightArrow,
        KeyToken::Home => Key::Home,
        KeyToken::End => Key::End,
        KeyToken::PageUp => Key::PageUp,
        KeyToken::PageDown => Key::PageDown,
        KeyToken::CapsLock => Key::CapsLock,
        KeyToken::F(n) => match n {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            12 => Key::F12,
            other => {
                return Err(PilotError::Executor(format!("unsupported function key f{other}")))
            }
        },
        KeyToken::Char(c) => Key::Unicode(c),
    };
    Ok(k)
}
