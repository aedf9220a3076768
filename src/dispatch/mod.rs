//! Trigger dispatcher
//!
//! Turns hotkey events into a sound plus, cooldown permitting, a webhook
//! notification. The webhook request is spawned and never joined; the
//! cooldown gate is consulted exactly once per trigger.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cooldown::{Clock, CooldownGate, GateBlocked, MonotonicClock};
use crate::events::DaemonEvent;
use crate::hotkey::{Hotkey, HotkeyEvent};
use crate::notify::{Notification, Notifier};
use crate::sound::{Playback, SoundPlayer};

/// Why [`TriggerDispatcher::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The quit chord was pressed
    QuitRequested,
    /// Every hotkey sender was dropped
    ChannelClosed,
}

pub struct TriggerDispatcher<C: Clock = MonotonicClock> {
    gate: Arc<CooldownGate<C>>,
    player: Arc<dyn SoundPlayer>,
    notifier: Option<Notifier>,
    hotkey: Hotkey,
    event_tx: broadcast::Sender<DaemonEvent>,
}

impl<C: Clock + 'static> TriggerDispatcher<C> {
    pub fn new(
        gate: Arc<CooldownGate<C>>,
        player: Arc<dyn SoundPlayer>,
        notifier: Option<Notifier>,
        hotkey: Hotkey,
        event_tx: broadcast::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            gate,
            player,
            notifier,
            hotkey,
            event_tx,
        }
    }

    /// Process hotkey events until quit is requested or the channel closes
    pub async fn run(&self, mut hotkey_rx: mpsc::Receiver<HotkeyEvent>) -> RunOutcome {
        info!(
            hotkey = %self.hotkey,
            notifications = self.notifier.is_some(),
            "dispatcher started"
        );

        while let Some(event) = hotkey_rx.recv().await {
            match event {
                HotkeyEvent::Triggered => self.handle_trigger(),
                HotkeyEvent::QuitRequested => {
                    info!("quit hotkey pressed");
                    return RunOutcome::QuitRequested;
                }
            }
        }

        info!("hotkey channel closed");
        RunOutcome::ChannelClosed
    }

    fn handle_trigger(&self) {
        debug!(hotkey = %self.hotkey, "hotkey triggered");
        self.emit(DaemonEvent::HotkeyTriggered);

        match self.player.play() {
            Ok(playback) => self.spawn_playback_watch(playback),
            Err(e) => {
                warn!(error = %e, "failed to play sound");
                self.emit(DaemonEvent::SoundFailed {
                    reason: e.to_string(),
                });
            }
        }

        let Some(notifier) = &self.notifier else {
            return;
        };

        match self.gate.enforce() {
            Ok(()) => {
                self.emit(DaemonEvent::NotificationDispatched);
                self.spawn_notification(notifier.clone());
            }
            Err(GateBlocked { retry_after }) => {
                let retry_after_secs = retry_after.as_secs();
                info!(retry_after_secs, "notification suppressed by cooldown");
                self.emit(DaemonEvent::NotificationSuppressed { retry_after_secs });
            }
        }
    }

    /// Reap the player process and report how it exited
    fn spawn_playback_watch(&self, playback: Playback) {
        debug!(pid = playback.pid(), "watching sound playback");
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = match playback.wait().await {
                Ok(()) => DaemonEvent::SoundPlayed,
                Err(e) => {
                    warn!(error = %e, "sound playback failed");
                    DaemonEvent::SoundFailed {
                        reason: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
        });
    }

    fn spawn_notification(&self, notifier: Notifier) {
        let notification = Notification::hotkey_triggered(self.hotkey.to_string());
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let event = match notifier.send(&notification).await {
                Ok(status) => {
                    info!(%status, url = %notifier.url(), "notification delivered");
                    DaemonEvent::NotificationDelivered {
                        status: status.as_u16(),
                    }
                }
                Err(e) => {
                    warn!(error = %e, url = %notifier.url(), "notification failed");
                    DaemonEvent::NotificationFailed {
                        reason: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
        });
    }

    fn emit(&self, event: DaemonEvent) {
        // No receivers is fine; the IPC server may not be up yet.
        let _ = self.event_tx.send(event);
    }
}
