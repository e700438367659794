//! Hotkey parsing and platform key-alias translation.
//!
//! The model writes combinations like `"ctrl c"`, `"meta r"` or
//! `"command+shift+4"`. Tokens are split on whitespace and `+`; generic
//! modifier names are mapped to what the host platform actually uses.

use std::fmt;

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// Modifier used for clipboard shortcuts.
    pub fn shortcut_modifier(&self) -> KeyToken {
        match self {
            Platform::MacOs => KeyToken::Meta,
            Platform::Windows | Platform::Linux => KeyToken::Control,
        }
    }

    pub fn paste_combo(&self) -> [KeyToken; 2] {
        [self.shortcut_modifier(), KeyToken::Char('v')]
    }

    fn meta_name(&self) -> &'static str {
        match self {
            Platform::MacOs => "command",
            Platform::Windows => "win",
            Platform::Linux => "super",
        }
    }
}

/// A key the input device can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyToken {
    Control,
    Alt,
    Shift,
    /// Command on macOS, the Windows key elsewhere.
    Meta,
    Return,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    CapsLock,
    /// F1–F12.
    F(u8),
    Char(char),
}

impl KeyToken {
    pub fn display(&self, platform: Platform) -> String {
        match self {
            KeyToken::Meta => platform.meta_name().to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Control => f.write_str("ctrl"),
            KeyToken::Alt => f.write_str("alt"),
            KeyToken::Shift => f.write_str("shift"),
            KeyToken::Meta => f.write_str("meta"),
            KeyToken::Return => f.write_str("enter"),
            KeyToken::Tab => f.write_str("tab"),
            KeyToken::Escape => f.write_str("esc"),
            KeyToken::Backspace => f.write_str("backspace"),
            KeyToken::Delete => f.write_str("delete"),
            KeyToken::Space => f.write_str("space"),
            KeyToken::Up => f.write_str("up"),
            KeyToken::Down => f.write_str("down"),
            KeyToken::Left => f.write_str("left"),
            KeyToken::Right => f.write_str("right"),
            KeyToken::Home => f.write_str("home"),
            KeyToken::End => f.write_str("end"),
            KeyToken::PageUp => f.write_str("pageup"),
            KeyToken::PageDown => f.write_str("pagedown"),
            KeyToken::CapsLock => f.write_str("capslock"),
            KeyToken::F(n) => write!(f, "f{n}"),
            KeyToken::Char(c) => write!(f, "{c}"),
        }
    }
}

/// Translate a model-written key combination into key tokens.
pub fn translate_hotkey(text: &str, platform: Platform) -> PilotResult<Vec<KeyToken>> {
    let tokens: Vec<KeyToken> = text
        .split(|c: char| c.is_whitespace() || c == '+')
        .filter(|t| !t.is_empty())
        .map(|t| translate_key(t, platform))
        .collect::<PilotResult<_>>()?;

    if tokens.is_empty() {
        return Err(bad_hotkey("no keys given".into()));
    }
    Ok(tokens)
}

// The combo comes straight from the model, so a bad one is malformed output.
fn bad_hotkey(detail: String) -> PilotError {
    PilotError::InvalidActionShape {
        action: "hotkey".into(),
        detail,
    }
}

fn translate_key(token: &str, platform: Platform) -> PilotResult<KeyToken> {
    let lower = token.to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" | "ctl" => KeyToken::Control,
        "alt" | "option" | "opt" | "altleft" | "altright" => KeyToken::Alt,
        "shift" | "shiftleft" | "shiftright" => KeyToken::Shift,
        "meta" | "win" | "windows" | "super" | "winleft" | "winright" => KeyToken::Meta,
        "cmd" | "command" => match platform {
            Platform::MacOs => KeyToken::Meta,
            Platform::Windows | Platform::Linux => KeyToken::Control,
        },
        "enter" | "return" => KeyToken::Return,
        "tab" => KeyToken::Tab,
        "esc" | "escape" => KeyToken::Escape,
        "backspace" => KeyToken::Backspace,
        "delete" | "del" => KeyToken::Delete,
        "space" | "spacebar" => KeyToken::Space,
        "up" | "arrowup" => KeyToken::Up,
        "down" | "arrowdown" => KeyToken::Down,
        "left" | "arrowleft" => KeyToken::Left,
        "right" | "arrowright" => KeyToken::Right,
        "home" => KeyToken::Home,
        "end" => KeyToken::End,
        "pageup" | "pgup" => KeyToken::PageUp,
        "pagedown" | "pgdn" => KeyToken::PageDown,
        "capslock" => KeyToken::CapsLock,
        other => {
            if let Some(n) = other.strip_prefix('f').and_then(|d| d.parse::<u8>().ok()) {
                if (1..=12).contains(&n) {
                    return Ok(KeyToken::F(n));
                }
            }
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyToken::Char(c),
                _ => return Err(bad_hotkey(format!("unknown key '{token}'"))),
            }
        }
    };
    Ok(key)
}

/// `ctrl+c` style rendering for logs and history.
pub fn describe_combo(keys: &[KeyToken], platform: Platform) -> String {
    keys.iter()
        .map(|k| k.display(platform))
        .collect::<Vec<_>>()
        .join("+")
}
