//! Transport and connector abstractions for the game bridge.
//!
//! A [`Transport`] is a bidirectional text message channel carrying one JSON
//! bridge message per call. A [`Connector`] produces a fresh transport for a
//! set of [`Credentials`]; the reconnect supervisor calls it once per
//! session, so implementations must be reusable.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use mc_lookout::error::LookoutError;
//! use mc_lookout::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), LookoutError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LookoutError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LookoutError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LookoutError;

/// Identity and target used to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub host: String,
    pub port: u16,
    /// Protocol version; `None` lets the bridge auto-detect.
    pub version: Option<String>,
}

impl Credentials {
    /// Create credentials with auto-detected protocol version.
    pub fn new(username: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            port,
            version: None,
        }
    }

    /// Pin the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A bidirectional text message transport to the game bridge.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), LookoutError>;

    /// Receive the next JSON text message.
    ///
    /// - `Some(Ok(text))`: a complete message
    /// - `Some(Err(e))`: a transport error
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, LookoutError>>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), LookoutError>;
}

/// Opens transports to the game bridge.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Establish a new connection for `credentials`.
    ///
    /// # Errors
    ///
    /// Any error here is reported by the session as a fault followed by
    /// termination; it never escapes to the caller of
    /// [`GameSession::open`](crate::session::GameSession::open).
    async fn connect(&self, credentials: &Credentials) -> Result<Self::Transport, LookoutError>;
}
