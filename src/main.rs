//! quack-daemon: plays a sound on a global hotkey and reports it to a webhook
//!
//! This daemon runs in the background and provides:
//! - Global hotkey detection (trigger and quit chords)
//! - Sound effect playback on every trigger
//! - A webhook notification per trigger, at most once per cooldown interval
//! - IPC server for status queries and cooldown resets

mod config;
mod cooldown;
mod dispatch;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod notify;
mod sound;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::cooldown::CooldownGate;
use crate::dispatch::TriggerDispatcher;
use crate::events::DaemonEvent;
use crate::hotkey::HotkeyListener;
use crate::ipc::{DaemonStatus, Server};
use crate::lifecycle::ShutdownSignal;
use crate::notify::Notifier;
use crate::sound::CommandPlayer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "quack-daemon starting"
    );

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        hotkey = %config.bindings.trigger,
        quit = %config.bindings.quit,
        cooldown_secs = config.cooldown.as_secs(),
        notifications = config.notify_url.is_some(),
        "configuration loaded"
    );

    // A zero cooldown is a startup error, not something to limp along with
    let gate = CooldownGate::new(config.cooldown).context("invalid QUACK_COOLDOWN_SECS")?;
    let gate = Arc::new(gate);

    let notifier = config
        .notify_url
        .as_deref()
        .map(|url| Notifier::new(url, config.notify_timeout))
        .transpose()
        .context("invalid QUACK_NOTIFY_URL")?;

    let player = Arc::new(CommandPlayer::new(&config.sound_path));
    if !player.path().is_file() {
        warn!(path = ?player.path(), "sound file not found, triggers will be silent");
    }
    if config.bindings.trigger.modifiers.is_empty() {
        warn!(
            hotkey = %config.bindings.trigger,
            "trigger has no modifiers and will swallow every press of that key"
        );
    }

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Hotkey listener -> dispatcher
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // Dispatcher -> IPC server (counters and subscriber pushes)
    let (event_tx, _event_rx) = broadcast::channel::<DaemonEvent>(64);

    let dispatcher = TriggerDispatcher::new(
        Arc::clone(&gate),
        player,
        notifier,
        config.bindings.trigger,
        event_tx.clone(),
    );

    // Start the hotkey listener (runs on dedicated thread)
    let hotkey_listener = HotkeyListener::new(config.bindings, hotkey_tx);
    let hotkey_registered = match hotkey_listener.start() {
        Ok(()) => {
            info!("hotkey listener started");
            true
        }
        Err(e) => {
            error!(error = %e, "failed to start hotkey listener");
            warn!("continuing without hotkey support - check Accessibility permissions");
            false
        }
    };

    let server = Server::new(
        &config.socket_path,
        Arc::clone(&gate),
        event_tx.clone(),
        DaemonStatus {
            hotkey: config.bindings.trigger.to_string(),
            notifications_enabled: config.notify_url.is_some(),
            ..DaemonStatus::default()
        },
    )?;
    server.set_hotkey_registered(hotkey_registered).await;

    let mut event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        outcome = dispatcher.run(hotkey_rx) => {
            info!(?outcome, "dispatcher exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status counters in step with what happened
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "daemon event");
                        server.record_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "daemon event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("daemon event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    if hotkey_listener.is_running() {
        info!("stopping hotkey listener");
        hotkey_listener.stop();
    }
    server.shutdown().await;

    info!("quack-daemon stopped");

    Ok(())
}
