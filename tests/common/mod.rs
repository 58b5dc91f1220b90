#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the integration tests.
//!
//! Provides a scripted bridge transport, a connector that hands out one
//! script per attempt while recording what it saw, a counting viewer
//! sidecar and helpers for server message JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use mc_lookout::protocol::{MessageChannel, ServerMessage};
use mc_lookout::viewer::{SessionInfo, ViewerOptions};
use mc_lookout::{Connector, Credentials, LookoutError, ReadinessGate, Sidecar, Transport};

// ── Scripted transport ──────────────────────────────────────────────

/// One step of a scripted bridge connection.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a JSON message.
    Send(String),
    /// Stay quiet for a while.
    Wait(Duration),
    /// Close the connection cleanly.
    Close,
    /// Fail with a receive error.
    Fail(String),
}

/// A transport that replays [`Step`]s and then hangs.
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: String) -> Result<(), LookoutError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, LookoutError>> {
        loop {
            match self.steps.front().cloned() {
                Some(Step::Wait(delay)) => {
                    tokio::time::sleep(delay).await;
                    self.steps.pop_front();
                }
                Some(step) => {
                    self.steps.pop_front();
                    return match step {
                        Step::Send(text) => Some(Ok(text)),
                        Step::Close => None,
                        Step::Fail(reason) => Some(Err(LookoutError::TransportReceive(reason))),
                        Step::Wait(_) => unreachable!(),
                    };
                }
                None => std::future::pending().await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), LookoutError> {
        Ok(())
    }
}

// ── Fake connector ──────────────────────────────────────────────────

type ScriptFn = dyn Fn(usize) -> Option<Vec<Step>> + Send + Sync;

/// Connector that asks `script` for the steps of attempt `n` (0-based).
/// `None` refuses the connection.
pub struct FakeConnector {
    script: Box<ScriptFn>,
    attempts: StdMutex<Vec<tokio::time::Instant>>,
    gate_open_at_connect: StdMutex<Vec<bool>>,
    gate: Option<Arc<ReadinessGate>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new(script: impl Fn(usize) -> Option<Vec<Step>> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            attempts: StdMutex::new(Vec::new()),
            gate_open_at_connect: StdMutex::new(Vec::new()),
            gate: None,
            sent: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Record the gate state each time a connection is attempted.
    pub fn observing(mut self, gate: Arc<ReadinessGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn gate_open_at_connect(&self) -> Vec<bool> {
        self.gate_open_at_connect.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, _credentials: &Credentials) -> Result<ScriptedTransport, LookoutError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(tokio::time::Instant::now());
            attempts.len() - 1
        };
        if let Some(gate) = &self.gate {
            self.gate_open_at_connect
                .lock()
                .unwrap()
                .push(gate.is_open());
        }

        match (self.script)(attempt) {
            Some(steps) => Ok(ScriptedTransport {
                steps: VecDeque::from(steps),
                sent: Arc::clone(&self.sent),
            }),
            None => Err(LookoutError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// ── Counting sidecar ────────────────────────────────────────────────

/// Sidecar that only counts launches. Fails the first `fail_first` calls.
#[derive(Default)]
pub struct CountingSidecar {
    pub launches: AtomicUsize,
    pub attempts: AtomicUsize,
    pub fail_first: usize,
}

impl CountingSidecar {
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Default::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sidecar for CountingSidecar {
    async fn launch(
        &self,
        _session: &SessionInfo,
        _options: &ViewerOptions,
    ) -> Result<(), LookoutError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(LookoutError::ViewerLaunch("address in use".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── JSON helpers ────────────────────────────────────────────────────

pub fn credentials() -> Credentials {
    Credentials::new("Scout", "127.0.0.1", 25565)
}

pub fn spawned_json(username: &str) -> String {
    serde_json::to_string(&ServerMessage::Spawned {
        username: username.into(),
    })
    .expect("spawned_json serialization")
}

pub fn message_json(channel: MessageChannel, sender: Option<&str>, text: &str) -> String {
    serde_json::to_string(&ServerMessage::Message {
        channel,
        text: text.into(),
        sender: sender.map(str::to_string),
    })
    .expect("message_json serialization")
}

pub fn kicked_json(reason: &str) -> String {
    serde_json::to_string(&ServerMessage::Kicked {
        reason: reason.into(),
    })
    .expect("kicked_json serialization")
}

pub fn error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        message: message.into(),
    })
    .expect("error_json serialization")
}
