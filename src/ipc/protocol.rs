//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::DaemonEvent;

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Clear the notification cooldown
    ResetCooldown,

    /// Ping to check connectivity
    Ping,

    /// Receive every daemon event on this connection from now on
    Subscribe,
}

/// Messages from the daemon to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// The cooldown was cleared
    CooldownReset,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Event { event: DaemonEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,

    /// Trigger chord, e.g. `ctrl+shift+alt+q`
    pub hotkey: String,

    /// Whether the global hotkey listener is running
    pub hotkey_registered: bool,

    /// Whether a webhook URL is configured
    pub notifications_enabled: bool,

    pub cooldown_secs: u64,

    /// Whether the next trigger would send a notification
    pub notification_ready: bool,

    /// Whole seconds until `notification_ready` turns true
    pub retry_after_secs: u64,

    pub triggers: u64,
    pub suppressed: u64,
    pub delivered: u64,
    pub failed: u64,

    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotkey: String::new(),
            hotkey_registered: false,
            notifications_enabled: false,
            cooldown_secs: 0,
            notification_ready: true,
            retry_after_secs: 0,
            triggers: 0,
            suppressed: 0,
            delivered: 0,
            failed: 0,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&Request::ResetCooldown).unwrap();
        assert_eq!(json, r#"{"type":"reset_cooldown"}"#);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains("notification_ready"));
    }

    #[test]
    fn test_event_push_serialization() {
        let resp = Response::Event {
            event: DaemonEvent::NotificationSuppressed { retry_after_secs: 4 },
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
