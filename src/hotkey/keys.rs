//! Hotkey chords and modifier state
//!
//! A chord is written the way users type it in the environment, e.g.
//! `ctrl+shift+alt+q`, and parsed into a [`Hotkey`].

use std::fmt;
use std::str::FromStr;

/// Modifier key flag masks from macOS CGEventFlags
#[cfg(target_os = "macos")]
pub mod flags {
    use core_graphics::event::CGEventFlags;

    pub const CONTROL: CGEventFlags = CGEventFlags::CGEventFlagControl;
    pub const SHIFT: CGEventFlags = CGEventFlags::CGEventFlagShift;
    pub const OPTION: CGEventFlags = CGEventFlags::CGEventFlagAlternate;
    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;
}

/// Which modifier keys are held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierState {
    pub control: bool,
    pub shift: bool,
    /// Option on macOS, Alt elsewhere
    pub option: bool,
    pub command: bool,
}

impl ModifierState {
    /// Create a new ModifierState from CGEventFlags
    #[cfg(target_os = "macos")]
    pub fn from_flags(event_flags: core_graphics::event::CGEventFlags) -> Self {
        Self {
            control: event_flags.contains(flags::CONTROL),
            shift: event_flags.contains(flags::SHIFT),
            option: event_flags.contains(flags::OPTION),
            command: event_flags.contains(flags::COMMAND),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.control && !self.shift && !self.option && !self.command
    }
}

/// A modifier chord plus one alphanumeric key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hotkey {
    pub modifiers: ModifierState,
    /// Lowercase ASCII letter or digit
    pub key: char,
}

impl Hotkey {
    pub fn new(modifiers: ModifierState, key: char) -> Self {
        Self {
            modifiers,
            key: key.to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHotkeyError {
    #[error("hotkey is empty")]
    Empty,

    #[error("unknown key `{0}` in hotkey")]
    UnknownToken(String),

    #[error("hotkey has no key, only modifiers")]
    MissingKey,

    #[error("hotkey has more than one key: `{0}` and `{1}`")]
    MultipleKeys(char, char),
}

impl FromStr for Hotkey {
    type Err = ParseHotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseHotkeyError::Empty);
        }

        let mut modifiers = ModifierState::default();
        let mut key: Option<char> = None;

        for token in s.split('+').map(|t| t.trim().to_ascii_lowercase()) {
            match token.as_str() {
                "ctrl" | "control" => modifiers.control = true,
                "shift" => modifiers.shift = true,
                "alt" | "option" => modifiers.option = true,
                "cmd" | "command" | "super" | "meta" => modifiers.command = true,
                _ => {
                    let mut chars = token.chars();
                    let c = match (chars.next(), chars.next()) {
                        (Some(c), None) if c.is_ascii_alphanumeric() => c,
                        _ => return Err(ParseHotkeyError::UnknownToken(token)),
                    };
                    if let Some(prev) = key {
                        return Err(ParseHotkeyError::MultipleKeys(prev, c));
                    }
                    key = Some(c);
                }
            }
        }

        key.map(|k| Hotkey::new(modifiers, k))
            .ok_or(ParseHotkeyError::MissingKey)
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.modifiers;
        for (held, name) in [
            (m.control, "ctrl"),
            (m.shift, "shift"),
            (m.option, "alt"),
            (m.command, "cmd"),
        ] {
            if held {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}
