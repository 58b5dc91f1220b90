//! Error types for the lookout agent.

use thiserror::Error;

/// Errors that can occur while running the agent.
///
/// None of these terminate the process on their own: session faults feed the
/// reconnect loop, viewer faults leave the gate closed and proxy faults turn
/// into `503` responses. Only a failed listener bind is fatal, and that is
/// decided by the binary.
#[derive(Debug, Error)]
pub enum LookoutError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a bridge message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires a live session.
    #[error("not connected to server")]
    NotConnected,

    /// The game server reported an error.
    #[error("server error: {0}")]
    Server(String),

    /// The viewer sidecar could not be started.
    #[error("viewer launch failed: {0}")]
    ViewerLaunch(String),

    /// The HTTP client used to reach the viewer could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for agent operations.
pub type Result<T> = std::result::Result<T, LookoutError>;
