//! Hotkey module for global keyboard event listening
//!
//! Parses the configured chords and watches system-wide key presses for
//! them.

mod keys;
mod listener;

pub use keys::Hotkey;
pub use listener::{Bindings, HotkeyEvent, HotkeyListener};
