//! Global hotkey listener
//!
//! On macOS a CGEventTap watches system-wide key-down events on a dedicated
//! thread with its own CFRunLoop. Chords that match a binding are swallowed
//! so the focused application never sees them. Other platforms report
//! [`HotkeyError::Unsupported`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::keys::Hotkey;

/// Events sent from the hotkey listener to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The trigger chord was pressed
    Triggered,
    /// The quit chord was pressed
    QuitRequested,
}

/// The chords the listener reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub trigger: Hotkey,
    pub quit: Hotkey,
}

impl Bindings {
    /// Map a pressed chord to the event it should produce, if any
    pub fn action_for(&self, pressed: &Hotkey) -> Option<HotkeyEvent> {
        if *pressed == self.trigger {
            Some(HotkeyEvent::Triggered)
        } else if *pressed == self.quit {
            Some(HotkeyEvent::QuitRequested)
        } else {
            None
        }
    }
}

/// Global hotkey listener for the trigger and quit chords
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub struct HotkeyListener {
    bindings: Bindings,
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    pub fn new(bindings: Bindings, event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            bindings,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start listening on a dedicated thread
    ///
    /// The listener runs until `stop()` is called or the program exits.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let result = self.spawn_listener_thread();
        if result.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Stop the hotkey listener
    ///
    /// The event loop notices within one run-loop slice (100ms).
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[cfg(target_os = "macos")]
    fn spawn_listener_thread(&self) -> Result<(), HotkeyError> {
        use tracing::{error, info};

        let bindings = self.bindings;
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = tap::run_event_loop(bindings, event_tx, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn spawn_listener_thread(&self) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported(std::env::consts::OS))
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global hotkeys are not supported on {0}")]
    Unsupported(&'static str),
}

#[cfg(target_os = "macos")]
mod tap {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};

    use super::{Bindings, HotkeyError, HotkeyEvent};
    use crate::hotkey::keys::{Hotkey, ModifierState};

    /// What the tap callback hands to the event loop
    enum TapSignal {
        Matched(HotkeyEvent),
        Disabled,
    }

    pub(super) fn run_event_loop(
        bindings: Bindings,
        event_tx: mpsc::Sender<HotkeyEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let (callback_tx, callback_rx) = std::sync::mpsc::channel::<TapSignal>();

        // Runs on the tap thread for every key press; must stay fast.
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
                             -> Option<CGEvent> {
            match event_type {
                CGEventType::KeyDown => {
                    let keycode =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                    let pressed = key_for_keycode(keycode)
                        .map(|key| Hotkey::new(ModifierState::from_flags(event.get_flags()), key));

                    if let Some(action) = pressed.and_then(|p| bindings.action_for(&p)) {
                        let _ = callback_tx.send(TapSignal::Matched(action));
                        return None;
                    }
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(TapSignal::Disabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::EventTapCreation)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();

        info!(trigger = %bindings.trigger, quit = %bindings.quit, "event tap enabled");

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
            }

            while let Ok(signal) = callback_rx.try_recv() {
                match signal {
                    TapSignal::Matched(action) => {
                        debug!(?action, "hotkey matched");
                        if event_tx.blocking_send(action).is_err() {
                            warn!("failed to send hotkey event - channel closed?");
                            return Ok(());
                        }
                    }
                    TapSignal::Disabled => {
                        warn!("event tap disabled by the system, re-enabling");
                        tap.enable();
                    }
                }
            }
        }

        Ok(())
    }

    /// ANSI virtual keycodes for letters and digits
    fn key_for_keycode(keycode: i64) -> Option<char> {
        let key = match keycode {
            0 => 'a',
            1 => 's',
            2 => 'd',
            3 => 'f',
            4 => 'h',
            5 => 'g',
            6 => 'z',
            7 => 'x',
            8 => 'c',
            9 => 'v',
            11 => 'b',
            12 => 'q',
            13 => 'w',
            14 => 'e',
            15 => 'r',
            16 => 'y',
            17 => 't',
            18 => '1',
            19 => '2',
            20 => '3',
            21 => '4',
            22 => '6',
            23 => '5',
            25 => '9',
            26 => '7',
            28 => '8',
            29 => '0',
            31 => 'o',
            32 => 'u',
            34 => 'i',
            35 => 'p',
            37 => 'l',
            38 => 'j',
            40 => 'k',
            45 => 'n',
            46 => 'm',
            _ => return None,
        };
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        Bindings {
            trigger: "ctrl+shift+alt+q".parse().unwrap(),
            quit: "ctrl+shift+alt+w".parse().unwrap(),
        }
    }

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(bindings(), tx);
        assert!(!listener.is_running());
    }

    #[test]
    fn test_bindings_match_exact_chords() {
        let b = bindings();
        assert_eq!(b.action_for(&b.trigger), Some(HotkeyEvent::Triggered));
        assert_eq!(b.action_for(&b.quit), Some(HotkeyEvent::QuitRequested));

        let partial: Hotkey = "ctrl+alt+q".parse().unwrap();
        assert_eq!(b.action_for(&partial), None);
        let extra: Hotkey = "ctrl+shift+alt+cmd+q".parse().unwrap();
        assert_eq!(b.action_for(&extra), None);
    }

    #[test]
    fn test_stop_clears_running_flag() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(bindings(), tx);
        listener.running.store(true, Ordering::SeqCst);
        assert!(listener.is_running());

        listener.stop();
        assert!(!listener.is_running());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_start_reports_unsupported_platform() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(bindings(), tx);
        assert!(matches!(listener.start(), Err(HotkeyError::Unsupported(_))));
        assert!(!listener.is_running());
    }
}
