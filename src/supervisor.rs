//! Reconnect supervisor: one session at a time, forever.
//!
//! Each cycle opens a fresh [`GameSession`], drains its events until the
//! session terminates, closes the [`ReadinessGate`] and waits a fixed delay
//! before the next attempt. There is no retry limit and no exponential
//! backoff; an always-on agent keeps knocking at the same pace.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::DEFAULT_RECONNECT_DELAY;
use crate::event::SessionEvent;
use crate::gate::{ReadinessGate, SessionToken};
use crate::session::{GameSession, SessionConfig};
use crate::transport::{Connector, Credentials};
use crate::viewer::{SessionInfo, ViewerLauncher};

/// Drives the create → observe → wait → recreate loop.
pub struct ReconnectSupervisor<C: Connector> {
    connector: Arc<C>,
    credentials: Credentials,
    session_config: SessionConfig,
    gate: Arc<ReadinessGate>,
    launcher: Option<Arc<ViewerLauncher>>,
    reconnect_delay: Duration,
    next_token: SessionToken,
}

impl<C: Connector> ReconnectSupervisor<C> {
    /// Supervisor without a viewer; the gate never opens.
    pub fn new(connector: Arc<C>, credentials: Credentials, gate: Arc<ReadinessGate>) -> Self {
        Self {
            connector,
            credentials,
            session_config: SessionConfig::default(),
            gate,
            launcher: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            next_token: SessionToken(1),
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<ViewerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Run in a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Reconnect forever. Only returns by being dropped or aborted.
    pub async fn run(mut self) {
        loop {
            let reason = self.run_session().await;
            warn!(
                reason = reason.as_deref().unwrap_or("remote closed"),
                delay = ?self.reconnect_delay,
                "disconnected; reconnecting"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Run one session to termination and return its reason.
    ///
    /// The gate is closed before this returns, so nothing scheduled after it
    /// can observe a gate left open by the finished session.
    pub async fn run_session(&mut self) -> Option<String> {
        let token = self.next_token;
        self.next_token = token.next();

        let (session, mut events) = GameSession::open(
            Arc::clone(&self.connector),
            self.credentials.clone(),
            self.session_config.clone(),
        );
        let session_id = session.id();
        info!(
            %session_id,
            %token,
            host = %self.credentials.host,
            port = self.credentials.port,
            "opening session"
        );

        let reason = loop {
            match events.recv().await {
                Some(SessionEvent::Connected { username }) => {
                    info!(%session_id, %username, "spawned");
                    self.gate.activate(token);
                    if let Some(launcher) = &self.launcher {
                        let info = SessionInfo {
                            id: session_id,
                            token,
                            username,
                            host: self.credentials.host.clone(),
                            port: self.credentials.port,
                        };
                        launcher.ensure_started(&info).await;
                    }
                }
                Some(SessionEvent::Chat { sender, text }) => {
                    info!(target: "mc_lookout::chat", "<{sender}> {text}");
                }
                Some(SessionEvent::Faulted { error }) => {
                    error!(%session_id, "session error: {error}");
                }
                Some(SessionEvent::Terminated { reason }) => break reason,
                None => break Some("session event stream ended".to_string()),
            }
        };

        self.gate.close();
        drop(session);
        reason
    }
}

impl<C: Connector> std::fmt::Debug for ReconnectSupervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("credentials", &self.credentials)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("next_token", &self.next_token)
            .field("viewer", &self.launcher.is_some())
            .finish()
    }
}
