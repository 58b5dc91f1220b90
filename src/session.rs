//! One live connection to the game server.
//!
//! [`GameSession`] is a thin handle that talks to a background session task
//! over an unbounded MPSC channel. The task dials the bridge through a
//! [`Connector`], logs in, classifies incoming messages and emits
//! [`SessionEvent`]s on the bounded channel returned from
//! [`GameSession::open`].
//!
//! A session never retries. Every failure ends in exactly one
//! [`SessionEvent::Terminated`]; reconnecting is the supervisor's job.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::classify::{classify, Classification};
use crate::error::{LookoutError, Result};
use crate::event::SessionEvent;
use crate::protocol::{AutoEatOptions, ClientMessage, ServerMessage};
use crate::transport::{Connector, Credentials, Transport};

/// Random identifier of one session, used in logs.
pub type SessionId = Uuid;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the bounded event channel. Chat and fault events are
    /// dropped with a warning when full; `Connected` and `Terminated` are
    /// always delivered.
    pub event_channel_capacity: usize,
    /// Time the task gets to close the transport on [`GameSession::shutdown`].
    pub shutdown_timeout: Duration,
    /// Auto-eat options sent after spawning. `None` leaves the bridge defaults.
    pub auto_eat: Option<AutoEatOptions>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            auto_eat: Some(AutoEatOptions::default()),
        }
    }
}

impl SessionConfig {
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_auto_eat(mut self, auto_eat: Option<AutoEatOptions>) -> Self {
        self.auto_eat = auto_eat;
        self
    }
}

// ── Phase ───────────────────────────────────────────────────────────

/// Where a session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Connecting = 0,
    Active = 1,
    Terminated = 2,
}

impl SessionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Terminated,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

struct SessionState {
    phase: AtomicU8,
    username: Mutex<Option<String>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(SessionPhase::Connecting as u8),
            username: Mutex::new(None),
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to one game session.
///
/// Dropping the handle aborts the background task without emitting
/// `Terminated`; the event receiver then yields `None`.
pub struct GameSession {
    id: SessionId,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<SessionState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl GameSession {
    /// Start a session and return its handle plus event receiver.
    ///
    /// Never fails: a connect error is reported as
    /// [`SessionEvent::Faulted`] followed by [`SessionEvent::Terminated`].
    #[must_use = "the event receiver must be used to observe the session"]
    pub fn open<C: Connector>(
        connector: Arc<C>,
        credentials: Credentials,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let id = Uuid::new_v4();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(SessionState::new());

        let task = tokio::spawn(session_task(SessionTask {
            id,
            connector,
            credentials,
            auto_eat: config.auto_eat,
            cmd_rx,
            event_tx,
            state: Arc::clone(&state),
            shutdown_rx,
        }));

        let session = Self {
            id,
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (session, event_rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Identity assigned by the server, once spawned.
    pub async fn username(&self) -> Option<String> {
        self.state.username.lock().await.clone()
    }

    /// Say `message` in chat.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::NotConnected`] unless the session is active.
    pub fn send_chat(&self, message: impl Into<String>) -> Result<()> {
        if self.phase() != SessionPhase::Active {
            return Err(LookoutError::NotConnected);
        }
        self.cmd_tx
            .send(ClientMessage::Chat {
                message: message.into(),
            })
            .map_err(|_| LookoutError::NotConnected)
    }

    /// Quit the server and stop the background task.
    pub async fn shutdown(&mut self) {
        debug!(session_id = %self.id, "session shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("session task terminated with join error: {join_err}"),
                Err(_) => {
                    warn!(session_id = %self.id, "session task did not exit in time; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }

        self.state.set_phase(SessionPhase::Terminated);
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session task ────────────────────────────────────────────────────

struct SessionTask<C> {
    id: SessionId,
    connector: Arc<C>,
    credentials: Credentials,
    auto_eat: Option<AutoEatOptions>,
    cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    state: Arc<SessionState>,
    shutdown_rx: oneshot::Receiver<()>,
}

async fn session_task<C: Connector>(mut task: SessionTask<C>) {
    let id = task.id;
    debug!(session_id = %id, host = %task.credentials.host, port = task.credentials.port, "session connecting");

    let connected = tokio::select! {
        result = task.connector.connect(&task.credentials) => Some(result),
        _ = &mut task.shutdown_rx => None,
    };

    let mut transport = match connected {
        Some(Ok(transport)) => transport,
        Some(Err(e)) => {
            warn!(session_id = %id, "connect failed: {e}");
            emit_event(&task.event_tx, SessionEvent::Faulted { error: e.to_string() }).await;
            emit_terminated(&task.event_tx, &task.state, Some(format!("connect failed: {e}"))).await;
            return;
        }
        None => {
            emit_terminated(&task.event_tx, &task.state, Some("session shut down".into())).await;
            return;
        }
    };

    let login = ClientMessage::Login {
        username: task.credentials.username.clone(),
        version: task.credentials.version.clone(),
    };
    if let Err(e) = send_message(&mut transport, &login).await {
        error!(session_id = %id, "login send failed: {e}");
        emit_event(&task.event_tx, SessionEvent::Faulted { error: e.to_string() }).await;
        emit_terminated(&task.event_tx, &task.state, Some(format!("login failed: {e}"))).await;
        return;
    }

    transport_loop(transport, task).await;
    debug!(session_id = %id, "session task exited");
}

/// Multiplexes outgoing commands, shutdown and incoming bridge messages.
async fn transport_loop<C>(mut transport: impl Transport, mut task: SessionTask<C>) {
    let id = task.id;
    let mut self_name: Option<String> = None;

    loop {
        tokio::select! {
            cmd = task.cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        if let Err(e) = send_message(&mut transport, &msg).await {
                            error!(session_id = %id, "transport send error: {e}");
                            emit_event(&task.event_tx, SessionEvent::Faulted { error: e.to_string() }).await;
                            emit_terminated(&task.event_tx, &task.state, Some(format!("transport send error: {e}"))).await;
                            break;
                        }
                    }
                    None => {
                        quit(&mut transport).await;
                        emit_terminated(&task.event_tx, &task.state, Some("session shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut task.shutdown_rx => {
                debug!(session_id = %id, "shutdown signal received");
                quit(&mut transport).await;
                emit_terminated(&task.event_tx, &task.state, Some("session shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        let msg = match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                // Malformed bridge output is noise, not a fault.
                                debug!(session_id = %id, "ignoring unparseable bridge message: {e}");
                                continue;
                            }
                        };
                        match msg {
                            ServerMessage::Spawned { username } => {
                                if self_name.is_some() {
                                    debug!(session_id = %id, "respawned");
                                    continue;
                                }
                                info!(session_id = %id, username = %username, "spawned");
                                *task.state.username.lock().await = Some(username.clone());
                                task.state.set_phase(SessionPhase::Active);
                                self_name = Some(username.clone());

                                if let Some(options) = task.auto_eat.clone() {
                                    if let Err(e) = send_message(&mut transport, &ClientMessage::ConfigureAutoEat(options)).await {
                                        warn!(session_id = %id, "failed to configure auto-eat: {e}");
                                    }
                                }
                                emit_connected(&task.event_tx, username).await;
                            }
                            ServerMessage::Message { channel, text, sender } => {
                                match classify(channel, sender.as_deref(), &text, self_name.as_deref()) {
                                    Classification::Chat { sender, text } => {
                                        emit_event(&task.event_tx, SessionEvent::Chat { sender, text }).await;
                                    }
                                    Classification::Anonymous => {
                                        trace!(session_id = %id, %text, "system message");
                                    }
                                    _ => {}
                                }
                            }
                            ServerMessage::Kicked { reason } => {
                                warn!(session_id = %id, %reason, "kicked by server");
                                let _ = transport.close().await;
                                emit_terminated(&task.event_tx, &task.state, Some(format!("kicked: {reason}"))).await;
                                break;
                            }
                            ServerMessage::Error { message } => {
                                error!(session_id = %id, "server error: {message}");
                                emit_event(&task.event_tx, SessionEvent::Faulted {
                                    error: LookoutError::Server(message).to_string(),
                                }).await;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!(session_id = %id, "transport receive error: {e}");
                        emit_event(&task.event_tx, SessionEvent::Faulted { error: e.to_string() }).await;
                        emit_terminated(&task.event_tx, &task.state, Some(format!("transport receive error: {e}"))).await;
                        break;
                    }
                    None => {
                        debug!(session_id = %id, "bridge closed the connection");
                        emit_terminated(&task.event_tx, &task.state, None).await;
                        break;
                    }
                }
            }
        }
    }
}

async fn send_message(transport: &mut impl Transport, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    transport.send(json).await
}

/// Best-effort `quit` followed by close.
async fn quit(transport: &mut impl Transport) {
    let _ = send_message(transport, &ClientMessage::Quit).await;
    let _ = transport.close().await;
}

/// Emit a non-terminal event, dropping it if the consumer is behind.
async fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the single `Connected` event. Awaits capacity so it is never lost;
/// the supervisor drives the gate and the viewer from it.
async fn emit_connected(event_tx: &mpsc::Sender<SessionEvent>, username: String) {
    if event_tx.send(SessionEvent::Connected { username }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

/// Emit the single `Terminated` event. Awaits capacity so it is never lost.
async fn emit_terminated(
    event_tx: &mpsc::Sender<SessionEvent>,
    state: &SessionState,
    reason: Option<String>,
) {
    state.set_phase(SessionPhase::Terminated);
    if event_tx.send(SessionEvent::Terminated { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<std::result::Result<String, LookoutError>>>;

    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, LookoutError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), LookoutError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, LookoutError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), LookoutError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport, then refuses.
    struct MockConnector {
        script: StdMutex<Option<Script>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(Some(script)),
                sent: Arc::new(StdMutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(
            &self,
            _credentials: &Credentials,
        ) -> std::result::Result<MockTransport, LookoutError> {
            let script = self.script.lock().unwrap().take().ok_or_else(|| {
                LookoutError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))
            })?;
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn spawned(name: &str) -> String {
        serde_json::to_string(&ServerMessage::Spawned {
            username: name.into(),
        })
        .unwrap()
    }

    fn chat(sender: &str, text: &str) -> String {
        serde_json::to_string(&ServerMessage::Message {
            channel: crate::protocol::MessageChannel::Chat,
            text: text.into(),
            sender: Some(sender.into()),
        })
        .unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("Scout", "127.0.0.1", 25565)
    }

    #[tokio::test]
    async fn login_is_first_message_and_connected_follows_spawn() {
        let connector = MockConnector::new(vec![Some(Ok(spawned("Scout")))]);
        let (mut session, mut events) =
            GameSession::open(Arc::clone(&connector), credentials(), SessionConfig::default());

        let ev = events.recv().await.unwrap();
        assert_eq!(
            ev,
            SessionEvent::Connected {
                username: "Scout".into()
            }
        );
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.username().await.as_deref(), Some("Scout"));

        let sent = connector.sent();
        let first: ClientMessage = serde_json::from_str(&sent[0]).unwrap();
        assert!(matches!(first, ClientMessage::Login { ref username, .. } if username == "Scout"));

        session.shutdown().await;
        assert_eq!(session.phase(), SessionPhase::Terminated);
    }

    #[tokio::test]
    async fn auto_eat_is_configured_after_spawn() {
        let connector = MockConnector::new(vec![Some(Ok(spawned("Scout")))]);
        let (mut session, mut events) =
            GameSession::open(Arc::clone(&connector), credentials(), SessionConfig::default());
        let _ = events.recv().await; // Connected

        let sent = connector.sent();
        let second: ClientMessage = serde_json::from_str(&sent[1]).unwrap();
        assert!(matches!(second, ClientMessage::ConfigureAutoEat(ref o) if o.start_at == 14));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn respawn_does_not_emit_second_connected() {
        let connector = MockConnector::new(vec![
            Some(Ok(spawned("Scout"))),
            Some(Ok(spawned("Scout"))),
            Some(Ok(chat("Alex", "hi"))),
        ]);
        let (mut session, mut events) =
            GameSession::open(connector, credentials(), SessionConfig::default());

        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Connected { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Chat {
                sender: "Alex".into(),
                text: "hi".into()
            }
        );
        session.shutdown().await;
    }

    #[tokio::test]
    async fn connect_failure_faults_then_terminates() {
        let connector = MockConnector::new(vec![]);
        // Consume the only script so the session's connect is refused.
        let _ = connector.connect(&credentials()).await.unwrap();

        let (_session, mut events) =
            GameSession::open(connector, credentials(), SessionConfig::default());

        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Faulted { .. }));
        let ev = events.recv().await.unwrap();
        assert!(ev.is_terminal());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn kick_terminates_with_reason_and_closes_transport() {
        let kicked = serde_json::to_string(&ServerMessage::Kicked {
            reason: "idle".into(),
        })
        .unwrap();
        let connector = MockConnector::new(vec![Some(Ok(spawned("Scout"))), Some(Ok(kicked))]);
        let (session, mut events) =
            GameSession::open(Arc::clone(&connector), credentials(), SessionConfig::default());

        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Terminated {
                reason: Some("kicked: idle".into())
            }
        );
        assert!(connector.closed.load(Ordering::Relaxed));
        assert_eq!(session.phase(), SessionPhase::Terminated);
    }

    #[tokio::test]
    async fn clean_close_terminates_without_reason() {
        let connector = MockConnector::new(vec![Some(Ok(spawned("Scout"))), None]);
        let (_session, mut events) =
            GameSession::open(connector, credentials(), SessionConfig::default());

        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Terminated { reason: None }
        );
    }

    #[tokio::test]
    async fn receive_error_faults_then_terminates() {
        let connector = MockConnector::new(vec![Some(Err(LookoutError::TransportReceive(
            "reset".into(),
        )))]);
        let (_session, mut events) =
            GameSession::open(connector, credentials(), SessionConfig::default());

        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Faulted { .. }));
        assert!(events.recv().await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn send_chat_requires_active_session() {
        let connector = MockConnector::new(vec![]);
        let (mut session, _events) =
            GameSession::open(connector, credentials(), SessionConfig::default());

        let err = session.send_chat("hello").unwrap_err();
        assert!(matches!(err, LookoutError::NotConnected));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_sends_quit() {
        let connector = MockConnector::new(vec![Some(Ok(spawned("Scout")))]);
        let (mut session, mut events) =
            GameSession::open(Arc::clone(&connector), credentials(), SessionConfig::default());
        let _ = events.recv().await;

        session.shutdown().await;
        assert!(events.recv().await.unwrap().is_terminal());
        let quit_sent = connector
            .sent()
            .iter()
            .any(|m| matches!(serde_json::from_str::<ClientMessage>(m), Ok(ClientMessage::Quit)));
        assert!(quit_sent);
    }
}
