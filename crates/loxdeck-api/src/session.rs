//! Realtime session with auto-reconnect.
//!
//! Holds one persistent WebSocket to a Miniserver and walks it through
//! authenticate → load catalog → enable status updates → ready. Binary
//! status broadcasts are decoded and fanned out through a
//! [`tokio::sync::broadcast`] channel. On close or error the session
//! returns to `Disconnected` and reconnects with exponential backoff +
//! jitter.
//!
//! The wire protocol has no request identifier, so request/response
//! pairs are correlated by order alone. The session task enforces that
//! with a single request slot: one request in flight at a time, the rest
//! wait in a queue. A text message that arrives while the slot is empty
//! is treated as an unsolicited broadcast.
//!
//! # Example
//!
//! ```rust,ignore
//! use loxdeck_api::session::{SessionConfig, SessionEvent, SessionHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SessionConfig::new(ws_url, credentials);
//! let handle = SessionHandle::spawn(config, CancellationToken::new());
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     if let SessionEvent::Value(update) = event {
//!         println!("{} = {:?}", update.id, update.value);
//!     }
//! }
//!
//! handle.shutdown();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Credentials;
use crate::catalog::{CATALOG_PATH, Catalog};
use crate::envelope;
use crate::error::Error;
use crate::frame::{self, MessageHeader, ValueEvent};

// ── Protocol constants ───────────────────────────────────────────────

pub const ENABLE_UPDATES_COMMAND: &str = "jdev/sps/enablebinstatusupdate";
pub const KEEPALIVE_COMMAND: &str = "keepalive";

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const QUEUE_CAPACITY: usize = 32;

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle state of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    LoadingCatalog,
    EnablingUpdates,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::LoadingCatalog => "loading-catalog",
            Self::EnablingUpdates => "enabling-updates",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

// ── SessionEvent ─────────────────────────────────────────────────────

/// Everything a session reports to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A fresh catalog was loaded during the handshake.
    CatalogLoaded(Arc<Catalog>),
    /// One decoded status reading.
    Value(ValueEvent),
    /// A text message that did not answer any request.
    Text(String),
    /// The connection dropped. A reconnect is scheduled unless shut down.
    Disconnected { reason: Option<String> },
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 5s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

/// Everything needed to run one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `ws://host/ws/rfc6455`
    pub url: Url,
    pub credentials: Credentials,
    /// Require a `200` reply to the authenticate command before going on.
    /// When off, the reply is consumed without being inspected.
    pub strict_auth: bool,
    /// How long a single request may wait for its reply. Default: 5s.
    pub request_timeout: Duration,
    /// Keep-alive period once ready. Default: 30s.
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            strict_auth: true,
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── SessionHandle ────────────────────────────────────────────────────

struct PendingRequest {
    command: String,
    reply: oneshot::Sender<Result<String, Error>>,
}

struct PendingCommand {
    command: String,
    reply: oneshot::Sender<Result<(), Error>>,
}

struct Shared {
    state: watch::Sender<SessionState>,
    catalog: watch::Sender<Option<Arc<Catalog>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state");
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore send errors -- just means no active subscribers right now
        let _ = self.events.send(event);
    }
}

/// Handle to a running realtime session.
///
/// Cheap to clone. Call [`shutdown`](Self::shutdown) to tear down the
/// background task; dropping handles alone does not stop it.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    request_tx: mpsc::Sender<PendingRequest>,
    command_tx: mpsc::Sender<PendingCommand>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Spawn the session loop. Returns immediately; the first connection
    /// attempt happens in the background. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(config: SessionConfig, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (catalog, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            state,
            catalog,
            events,
        });

        let (request_tx, request_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(QUEUE_CAPACITY);

        let task_shared = Arc::clone(&shared);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            session_loop(config, task_shared, request_rx, command_rx, task_cancel).await;
        });

        Self {
            shared,
            request_tx,
            command_tx,
            cancel,
        }
    }

    /// Subscribe to session events.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the lifecycle state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn current_state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// The catalog loaded by the most recent handshake, if any.
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.shared.catalog.borrow().clone()
    }

    /// Send a command string and wait for the next text reply.
    ///
    /// Requests are queued and sent one at a time once the session is
    /// ready. The reply deadline starts when the request goes out.
    pub async fn request(&self, command: impl Into<String>) -> Result<String, Error> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(PendingRequest {
                command: command.into(),
                reply,
            })
            .await
            .map_err(|_| Error::Disconnected)?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Send a control command without waiting for any acknowledgement.
    ///
    /// Succeeds when the transport accepts the frame. Any confirmation
    /// shows up later as an uncorrelated value update.
    pub async fn send_command(&self, target: &str, verb: &str) -> Result<(), Error> {
        if self.current_state() != SessionState::Ready {
            return Err(Error::Disconnected);
        }
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(PendingCommand {
                command: format!("jdev/sps/io/{target}/{verb}"),
                reply,
            })
            .await
            .map_err(|_| Error::Disconnected)?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → handshake → serve → on close or error, backoff → reconnect.
async fn session_loop(
    config: SessionConfig,
    shared: Arc<Shared>,
    mut requests: mpsc::Receiver<PendingRequest>,
    mut commands: mpsc::Receiver<PendingCommand>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let mut reached_ready = false;
        shared.set_state(SessionState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = run_connection(
                &config,
                &shared,
                &mut requests,
                &mut commands,
                &mut reached_ready,
            ) => result,
        };

        let reason = match result {
            Ok(()) => {
                tracing::info!("session closed, reconnecting");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "session error");
                Some(e.to_string())
            }
        };
        shared.set_state(SessionState::Disconnected);
        fail_queued_commands(&mut commands);
        shared.emit(SessionEvent::Disconnected { reason });

        if reached_ready {
            attempt = 0;
        }

        if let Some(max) = config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "session reconnection limit reached, giving up");
                break;
            }
        }

        let delay = calculate_backoff(attempt, &config.reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    shared.set_state(SessionState::Disconnected);
    commands.close();
    fail_queued_commands(&mut commands);
    tracing::debug!("session loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one connection, run the handshake, then serve until it drops.
async fn run_connection(
    config: &SessionConfig,
    shared: &Shared,
    requests: &mut mpsc::Receiver<PendingRequest>,
    commands: &mut mpsc::Receiver<PendingCommand>,
    reached_ready: &mut bool,
) -> Result<(), Error> {
    tracing::info!(url = %config.url, "connecting realtime session");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    // ── Authenticate ─────────────────────────────────────────────────
    shared.set_state(SessionState::Authenticating);
    let reply = exchange(
        &mut write,
        &mut read,
        &config.credentials.authenticate_command(),
        config.request_timeout,
        shared,
    )
    .await?;
    if config.strict_auth {
        verify_auth_reply(&reply)?;
    } else {
        tracing::debug!("authenticate reply consumed without inspection");
    }

    // ── Load catalog ─────────────────────────────────────────────────
    shared.set_state(SessionState::LoadingCatalog);
    let body = exchange(&mut write, &mut read, CATALOG_PATH, config.request_timeout, shared).await?;
    match serde_json::from_str::<Catalog>(&body) {
        Ok(catalog) => {
            let catalog = Arc::new(catalog);
            tracing::info!(controls = catalog.controls.len(), "catalog loaded");
            shared.catalog.send_replace(Some(Arc::clone(&catalog)));
            shared.emit(SessionEvent::CatalogLoaded(catalog));
        }
        Err(e) => tracing::warn!(error = %e, "catalog reply did not parse, continuing without it"),
    }

    // ── Enable status broadcasts ─────────────────────────────────────
    shared.set_state(SessionState::EnablingUpdates);
    let reply = exchange(
        &mut write,
        &mut read,
        ENABLE_UPDATES_COMMAND,
        config.request_timeout,
        shared,
    )
    .await?;
    if !envelope::parse_reply(&reply).is_some_and(|r| r.is_ok()) {
        tracing::warn!(reply = %reply, "status updates may not be enabled");
    }

    // Anything queued now was accepted against an earlier connection.
    fail_queued_commands(commands);
    shared.set_state(SessionState::Ready);
    *reached_ready = true;
    tracing::info!("realtime session ready");

    serve(config, shared, &mut write, &mut read, requests, commands).await
}

/// The ready loop: keep-alive, inbound dispatch, single-slot requests.
async fn serve<W, R>(
    config: &SessionConfig,
    shared: &Shared,
    write: &mut W,
    read: &mut R,
    requests: &mut mpsc::Receiver<PendingRequest>,
    commands: &mut mpsc::Receiver<PendingCommand>,
) -> Result<(), Error>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let period = config.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    let mut slot: Option<(oneshot::Sender<Result<String, Error>>, Instant)> = None;

    loop {
        let deadline = slot.as_ref().map(|(_, d)| *d);

        tokio::select! {
            biased;
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_owned();
                    match slot.take() {
                        Some((reply, _)) => {
                            let _ = reply.send(Ok(text));
                        }
                        None => {
                            tracing::trace!(len = text.len(), "unsolicited text message");
                            shared.emit(SessionEvent::Text(text));
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => dispatch_binary(&data, shared),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                    } else {
                        tracing::info!("close frame received (no payload)");
                    }
                    return Ok(());
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    tracing::info!("realtime stream ended");
                    return Ok(());
                }
                // Ping, Pong, Frame -- tungstenite answers pings itself
                Some(Ok(_)) => {}
            },
            () = wait_for(deadline) => {
                if let Some((reply, _)) = slot.take() {
                    let _ = reply.send(Err(Error::Timeout {
                        timeout_secs: config.request_timeout.as_secs(),
                    }));
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = write.send(Message::text(KEEPALIVE_COMMAND.to_owned())).await {
                    tracing::debug!(error = %e, "keep-alive not sent");
                }
            }
            Some(command) = commands.recv() => {
                let sent = write
                    .send(Message::text(command.command))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()));
                let failed = sent.as_ref().err().map(ToString::to_string);
                let _ = command.reply.send(sent);
                if let Some(reason) = failed {
                    return Err(Error::WebSocketConnect(reason));
                }
            }
            Some(request) = requests.recv(), if slot.is_none() => {
                if let Err(e) = write.send(Message::text(request.command)).await {
                    let _ = request.reply.send(Err(Error::WebSocketConnect(e.to_string())));
                    return Err(Error::WebSocketConnect(e.to_string()));
                }
                slot = Some((request.reply, Instant::now() + config.request_timeout));
            }
        }
    }
}

/// Fail every queued control command with [`Error::Disconnected`].
///
/// Commands are only accepted while ready; they never carry over to the
/// next connection.
fn fail_queued_commands(commands: &mut mpsc::Receiver<PendingCommand>) -> usize {
    let mut failed = 0;
    while let Ok(command) = commands.try_recv() {
        let _ = command.reply.send(Err(Error::Disconnected));
        failed += 1;
    }
    if failed > 0 {
        tracing::debug!(failed, "dropped commands queued across a disconnect");
    }
    failed
}

/// Send one command during the handshake and wait for its text reply.
///
/// Binary frames arriving in the meantime are routed to the status path.
async fn exchange<W, R>(
    write: &mut W,
    read: &mut R,
    command: &str,
    timeout: Duration,
    shared: &Shared,
) -> Result<String, Error>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    write
        .send(Message::text(command.to_owned()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let wait = async {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => dispatch_binary(&data, shared),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                        (u16::from(cf.code), cf.reason.as_str().to_owned())
                    });
                    return Err(Error::WebSocketClosed { code, reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    return Err(Error::WebSocketClosed {
                        code: 1006,
                        reason: "stream ended".into(),
                    });
                }
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ── Message handling ─────────────────────────────────────────────────

/// Decode a binary status buffer and broadcast every reading in it.
fn dispatch_binary(data: &[u8], shared: &Shared) {
    if let Some(header) = MessageHeader::parse(data) {
        tracing::trace!(kind = header.kind, payload_len = header.payload_len, "binary message");
    }
    for event in frame::decode_value_frame(data) {
        shared.emit(SessionEvent::Value(event));
    }
}

/// Strict-mode check of the authenticate reply.
fn verify_auth_reply(reply: &str) -> Result<(), Error> {
    match envelope::parse_reply(reply) {
        Some(r) if r.is_ok() => Ok(()),
        Some(r) => Err(Error::Authentication {
            message: format!("authenticate returned code {}", r.code),
        }),
        None => Err(Error::Authentication {
            message: "unrecognized authenticate reply".into(),
        }),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn default_session_config_is_strict() {
        let url = Url::parse("ws://10.0.0.2/ws/rfc6455").expect("url");
        let config = SessionConfig::new(url, Credentials::new("u", "p".to_string().into()));
        assert!(config.strict_auth);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_near_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        for attempt in [10, 100, u32::MAX] {
            let delay = calculate_backoff(attempt, &config);
            // With jitter factor up to 1.25, max effective is 12.5s
            assert!(delay <= Duration::from_millis(12_500), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn strict_auth_accepts_only_code_200() {
        assert!(verify_auth_reply(r#"{"LL":{"value":"1","Code":"200"}}"#).is_ok());
        assert!(matches!(
            verify_auth_reply(r#"{"LL":{"value":"0","Code":"401"}}"#),
            Err(Error::Authentication { .. })
        ));
        assert!(matches!(
            verify_auth_reply("garbage"),
            Err(Error::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn commands_fail_fast_when_not_ready() {
        // Nothing listens on this port; the session stays out of `Ready`.
        let url = Url::parse("ws://127.0.0.1:9/ws/rfc6455").expect("url");
        let mut config = SessionConfig::new(url, Credentials::new("u", "p".to_string().into()));
        config.reconnect.max_retries = Some(0);

        let handle = SessionHandle::spawn(config, CancellationToken::new());
        let result = handle.send_command("some-id", "On").await;
        assert!(matches!(result, Err(Error::Disconnected)));
        handle.shutdown();
    }

    #[tokio::test]
    async fn queued_commands_fail_on_disconnect() {
        let (tx, mut rx) = mpsc::channel(4);
        let (reply, pending) = oneshot::channel();
        tx.send(PendingCommand {
            command: "jdev/sps/io/some-id/On".into(),
            reply,
        })
        .await
        .expect("queued");

        assert_eq!(fail_queued_commands(&mut rx), 1);
        assert!(matches!(pending.await, Ok(Err(Error::Disconnected))));
        assert_eq!(fail_queued_commands(&mut rx), 0);
    }

    #[test]
    fn binary_dispatch_broadcasts_values() {
        let (state, _) = watch::channel(SessionState::Ready);
        let (catalog, _) = watch::channel(None);
        let (events, mut rx) = broadcast::channel(16);
        let shared = Shared {
            state,
            catalog,
            events,
        };

        let mut buf = vec![0x03, 0x02, 0, 0, 24, 0, 0, 0];
        buf.extend_from_slice(&[0xAA; 16]);
        buf.extend_from_slice(&1.0_f64.to_le_bytes());
        dispatch_binary(&buf, &shared);

        match rx.try_recv() {
            Ok(SessionEvent::Value(v)) => assert_eq!(v.id, "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa"),
            other => panic!("expected value event, got {other:?}"),
        }
    }
}
