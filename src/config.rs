//! Configuration loading and management
//!
//! Everything comes from `QUACK_*` environment variables with defaults that
//! match the stock quack sound setup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::hotkey::{Bindings, Hotkey};

const DEFAULT_HOTKEY: &str = "ctrl+shift+alt+q";
const DEFAULT_QUIT_HOTKEY: &str = "ctrl+shift+alt+w";
const DEFAULT_SOUND_PATH: &str = "resources/quack.mp3";
const DEFAULT_COOLDOWN_SECS: u64 = 15;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub bindings: Bindings,

    /// Sound effect played on every trigger
    pub sound_path: PathBuf,

    /// Webhook URL; `None` disables notifications
    pub notify_url: Option<String>,

    /// Minimum spacing between two webhook notifications
    pub cooldown: Duration,

    pub notify_timeout: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("quack-daemon");

        let socket_path = data_dir.join("daemon.sock");

        let bindings = Bindings {
            trigger: parse_hotkey(&lookup, "QUACK_HOTKEY", DEFAULT_HOTKEY)?,
            quit: parse_hotkey(&lookup, "QUACK_QUIT_HOTKEY", DEFAULT_QUIT_HOTKEY)?,
        };
        if bindings.trigger == bindings.quit {
            anyhow::bail!("QUACK_HOTKEY and QUACK_QUIT_HOTKEY must differ ({})", bindings.trigger);
        }

        let sound_path = lookup("QUACK_SOUND_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOUND_PATH));

        let notify_url = lookup("QUACK_NOTIFY_URL").filter(|url| !url.trim().is_empty());

        let cooldown = parse_secs(&lookup, "QUACK_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)?;
        let notify_timeout =
            parse_secs(&lookup, "QUACK_NOTIFY_TIMEOUT_SECS", DEFAULT_NOTIFY_TIMEOUT_SECS)?;

        Ok(Self {
            socket_path,
            data_dir,
            bindings,
            sound_path,
            notify_url,
            cooldown,
            notify_timeout,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_hotkey<F>(lookup: &F, key: &str, default: &str) -> Result<Hotkey>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse()
        .with_context(|| format!("invalid {key} `{raw}`"))
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key} `{raw}`, expected whole seconds"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
