//! Unix domain socket server for IPC
//!
//! Answers status queries, clears the cooldown on request, and pushes
//! daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::cooldown::{Clock, CooldownGate, MonotonicClock};
use crate::events::DaemonEvent;

use super::protocol::{DaemonStatus, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server<C: Clock = MonotonicClock> {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared<C>>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client task
struct Shared<C: Clock> {
    status: RwLock<DaemonStatus>,
    start_time: Instant,
    gate: Arc<CooldownGate<C>>,
    event_tx: broadcast::Sender<DaemonEvent>,
}

/// What the reader half of a connection hands to the writer loop
enum Inbound {
    Request(Request),
    Malformed(String),
    /// The byte stream can no longer be framed; the connection ends
    Broken(FrameError),
}

/// Failures reading a length-prefixed frame
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),

    #[error("failed to read frame: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    fn code(&self) -> &'static str {
        match self {
            FrameError::TooLarge(_) => "frame_too_large",
            FrameError::Io(_) => "bad_frame",
        }
    }
}

impl<C: Clock + 'static> Server<C> {
    /// Bind the socket and prepare the server
    ///
    /// `status` seeds the static fields (hotkey, notifications_enabled).
    pub fn new(
        socket_path: &Path,
        gate: Arc<CooldownGate<C>>,
        event_tx: broadcast::Sender<DaemonEvent>,
        status: DaemonStatus,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let status = DaemonStatus {
            cooldown_secs: gate.min_interval().as_secs(),
            ..status
        };
        let shared = Arc::new(Shared {
            status: RwLock::new(status),
            start_time: Instant::now(),
            gate,
            event_tx,
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared,
            shutdown_tx,
        })
    }

    pub async fn set_hotkey_registered(&self, registered: bool) {
        self.shared.status.write().await.hotkey_registered = registered;
    }

    /// Fold a daemon event into the status counters
    pub async fn record_event(&self, event: &DaemonEvent) {
        let mut status = self.shared.status.write().await;
        match event {
            DaemonEvent::HotkeyTriggered => status.triggers += 1,
            DaemonEvent::NotificationSuppressed { .. } => status.suppressed += 1,
            DaemonEvent::NotificationDelivered { .. } => status.delivered += 1,
            DaemonEvent::NotificationFailed { .. } => status.failed += 1,
            DaemonEvent::SoundPlayed
            | DaemonEvent::SoundFailed { .. }
            | DaemonEvent::NotificationDispatched
            | DaemonEvent::CooldownReset => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared<C>>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, inbound_tx));

        let mut events: Option<broadcast::Receiver<DaemonEvent>> = None;

        let result = loop {
            tokio::select! {
                inbound = inbound_rx.recv() => {
                    let response = match inbound {
                        Some(Inbound::Request(request)) => {
                            debug!(?request, "received request");
                            if request == Request::Subscribe && events.is_none() {
                                events = Some(shared.event_tx.subscribe());
                                debug!("client subscribed to events");
                            }
                            Self::process_request(request, &shared).await
                        }
                        Some(Inbound::Malformed(reason)) => Response::error("bad_request", reason),
                        Some(Inbound::Broken(e)) => {
                            warn!(error = %e, "closing client after unreadable frame");
                            // Best effort: the peer may already be gone.
                            let reply = Response::error(e.code(), e.to_string());
                            let _ = write_frame(&mut writer, &reply).await;
                            break Ok(());
                        }
                        None => break Ok(()),
                    };
                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    match event {
                        Ok(event) => {
                            let push = Response::Event { event };
                            if let Err(e) = write_frame(&mut writer, &push).await {
                                break Err(e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber lagged behind daemon events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                        }
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Read length-prefixed requests until EOF or a framing error
    async fn read_requests(mut reader: OwnedReadHalf, inbound_tx: mpsc::Sender<Inbound>) {
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    let _ = inbound_tx.send(Inbound::Broken(e)).await;
                    return;
                }
            };

            let inbound = match serde_json::from_slice::<Request>(&frame) {
                Ok(request) => Inbound::Request(request),
                Err(e) => {
                    warn!(error = %e, "failed to parse request");
                    Inbound::Malformed(e.to_string())
                }
            };
            if inbound_tx.send(inbound).await.is_err() {
                return;
            }
        }
        debug!("client disconnected");
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Shared<C>) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let decision = shared.gate.peek();
                let mut status = shared.status.read().await.clone();
                status.uptime_secs = shared.start_time.elapsed().as_secs();
                status.notification_ready = decision.allowed;
                status.retry_after_secs = decision.retry_after.as_secs();
                Response::Status(status)
            }

            Request::ResetCooldown => {
                shared.gate.reset();
                info!("cooldown reset via IPC");
                let _ = shared.event_tx.send(DaemonEvent::CooldownReset);
                Response::CooldownReset
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Wait for the next event, or forever when not subscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<DaemonEvent>>,
) -> Result<DaemonEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed frame; `None` on a clean EOF
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::cooldown::MockClock;

    static SOCKET_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn socket_path() -> PathBuf {
        let n = SOCKET_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("quackd-{}-{}.sock", std::process::id(), n))
    }

    struct Fixture {
        server: Arc<Server<MockClock>>,
        gate: Arc<CooldownGate<MockClock>>,
        path: PathBuf,
    }

    fn start_server() -> Fixture {
        let gate = Arc::new(
            CooldownGate::with_clock(Duration::from_secs(10), MockClock::new()).unwrap(),
        );
        let (event_tx, _) = broadcast::channel(16);
        let path = socket_path();
        let status = DaemonStatus {
            hotkey: "ctrl+shift+alt+q".to_string(),
            notifications_enabled: true,
            ..DaemonStatus::default()
        };
        let server = Arc::new(Server::new(&path, Arc::clone(&gate), event_tx, status).unwrap());

        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        Fixture { server, gate, path }
    }

    async fn roundtrip(stream: &mut UnixStream, request: &Request) -> Response {
        write_frame(stream, request).await.unwrap();
        receive(stream).await
    }

    async fn receive(stream: &mut UnixStream) -> Response {
        let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(stream))
            .await
            .expect("timed out waiting for response")
            .unwrap()
            .expect("server closed the connection");
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_write_frame_prefixes_length() {
        let body = br#"{"type":"pong"}"#;
        let mut mock = tokio_test::io::Builder::new()
            .write(&(body.len() as u32).to_le_bytes())
            .write(body)
            .build();
        write_frame(&mut mock, &Response::Pong).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_eof_and_oversize() {
        let mut empty = tokio_test::io::Builder::new().build();
        assert!(read_frame(&mut empty).await.unwrap().is_none());

        let too_long = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut mock = tokio_test::io::Builder::new().read(&too_long).build();
        assert!(matches!(
            read_frame(&mut mock).await,
            Err(FrameError::TooLarge(len)) if len == MAX_FRAME_LEN + 1
        ));
    }

    #[tokio::test]
    async fn test_ping() {
        let fx = start_server();
        let mut client = UnixStream::connect(&fx.path).await.unwrap();
        assert_eq!(roundtrip(&mut client, &Request::Ping).await, Response::Pong);
        fx.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_reflects_gate_and_counters() {
        let fx = start_server();
        fx.server.set_hotkey_registered(true).await;
        fx.server.record_event(&DaemonEvent::HotkeyTriggered).await;
        fx.server.record_event(&DaemonEvent::HotkeyTriggered).await;
        fx.server
            .record_event(&DaemonEvent::NotificationSuppressed { retry_after_secs: 3 })
            .await;
        fx.server
            .record_event(&DaemonEvent::NotificationDelivered { status: 200 })
            .await;
        assert!(fx.gate.consume().allowed);

        let mut client = UnixStream::connect(&fx.path).await.unwrap();
        let Response::Status(status) = roundtrip(&mut client, &Request::GetStatus).await else {
            panic!("expected status");
        };

        assert_eq!(status.hotkey, "ctrl+shift+alt+q");
        assert!(status.hotkey_registered);
        assert!(status.notifications_enabled);
        assert_eq!(status.cooldown_secs, 10);
        assert!(!status.notification_ready);
        assert_eq!(status.retry_after_secs, 10);
        assert_eq!(status.triggers, 2);
        assert_eq!(status.suppressed, 1);
        assert_eq!(status.delivered, 1);
        assert_eq!(status.failed, 0);

        // Status queries only peek at the gate.
        assert!(!fx.gate.peek().allowed);
        fx.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_cooldown_notifies_subscribers() {
        let fx = start_server();
        assert!(fx.gate.consume().allowed);

        let mut subscriber = UnixStream::connect(&fx.path).await.unwrap();
        assert_eq!(
            roundtrip(&mut subscriber, &Request::Subscribe).await,
            Response::Subscribed
        );

        let mut client = UnixStream::connect(&fx.path).await.unwrap();
        assert_eq!(
            roundtrip(&mut client, &Request::ResetCooldown).await,
            Response::CooldownReset
        );
        assert!(fx.gate.peek().allowed);

        assert_eq!(
            receive(&mut subscriber).await,
            Response::Event {
                event: DaemonEvent::CooldownReset
            }
        );
        fx.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error() {
        let fx = start_server();
        let mut client = UnixStream::connect(&fx.path).await.unwrap();

        let body = br#"{"type":"launch_rockets"}"#;
        client.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
        client.write_all(body).await.unwrap();

        match receive(&mut client).await {
            Response::Error { code, .. } => assert_eq!(code, "bad_request"),
            other => panic!("unexpected response: {other:?}"),
        }

        // The connection stays usable.
        assert_eq!(roundtrip(&mut client, &Request::Ping).await, Response::Pong);
        fx.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversize_frame_gets_error_then_close() {
        let fx = start_server();
        let mut client = UnixStream::connect(&fx.path).await.unwrap();

        let too_long = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        client.write_all(&too_long).await.unwrap();

        match receive(&mut client).await {
            Response::Error { code, message } => {
                assert_eq!(code, "frame_too_large");
                assert!(message.contains(&(MAX_FRAME_LEN + 1).to_string()));
            }
            other => panic!("unexpected response: {other:?}"),
        }

        let closed = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut client))
            .await
            .expect("server kept the connection open");
        assert!(matches!(closed, Ok(None)));
        fx.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let fx = start_server();
        assert!(fx.path.exists());
        fx.server.shutdown().await;
        assert!(!fx.path.exists());
    }
}
