//! Events emitted while handling hotkey triggers
//!
//! Broadcast to the IPC server, which keeps counters and pushes them to
//! subscribed clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// The trigger chord was pressed
    HotkeyTriggered,

    /// The sound effect was started
    SoundPlayed,

    /// The sound effect could not be played
    SoundFailed { reason: String },

    /// The cooldown gate let a webhook through and the request was spawned
    NotificationDispatched,

    /// The cooldown gate was closed, no webhook sent
    NotificationSuppressed {
        /// Whole seconds until the gate opens again
        retry_after_secs: u64,
    },

    /// The webhook endpoint answered with a success status
    NotificationDelivered { status: u16 },

    /// The webhook request failed or was rejected
    NotificationFailed { reason: String },

    /// The cooldown was cleared on request
    CooldownReset,
}

impl std::fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEvent::HotkeyTriggered => write!(f, "HOTKEY_TRIGGERED"),
            DaemonEvent::SoundPlayed => write!(f, "SOUND_PLAYED"),
            DaemonEvent::SoundFailed { reason } => write!(f, "SOUND_FAILED ({})", reason),
            DaemonEvent::NotificationDispatched => write!(f, "NOTIFICATION_DISPATCHED"),
            DaemonEvent::NotificationSuppressed { retry_after_secs } => {
                write!(f, "NOTIFICATION_SUPPRESSED (retry in {}s)", retry_after_secs)
            }
            DaemonEvent::NotificationDelivered { status } => {
                write!(f, "NOTIFICATION_DELIVERED ({})", status)
            }
            DaemonEvent::NotificationFailed { reason } => {
                write!(f, "NOTIFICATION_FAILED ({})", reason)
            }
            DaemonEvent::CooldownReset => write!(f, "COOLDOWN_RESET"),
        }
    }
}
