//! # mc-lookout
//!
//! An always-on game-world agent. It joins a game server as a scripted
//! player, reconnects forever when the connection drops, and serves a
//! live view of the world through a gated reverse proxy.
//!
//! ## Pieces
//!
//! - [`GameSession`]: one connection, emitting [`SessionEvent`]s
//! - [`ReconnectSupervisor`]: one session at a time, fixed backoff, forever
//! - [`ViewerLauncher`]: starts the rendering sidecar once per process
//! - [`ReadinessGate`]: opens after a settle delay, closes on disconnect
//! - [`ProxyFront`]: `GET /` liveness plus the gated `/viewer` proxy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mc_lookout::{
//!     Credentials, ProxyFront, ReadinessGate, ReconnectSupervisor, WebSocketConnector,
//! };
//!
//! # async fn example() -> Result<(), mc_lookout::LookoutError> {
//! let gate = Arc::new(ReadinessGate::new());
//! let credentials = Credentials::new("Scout", "127.0.0.1", 25565);
//! let supervisor =
//!     ReconnectSupervisor::new(Arc::new(WebSocketConnector::new()), credentials, Arc::clone(&gate));
//! supervisor.spawn();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! let front = ProxyFront::new(gate, mc_lookout::viewer::VIEWER_BIND)?;
//! mc_lookout::proxy::serve(listener, front, std::future::pending()).await
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
pub mod protocol;
pub mod proxy;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod transports;
pub mod viewer;

// Re-export primary types for ergonomic imports.
pub use config::AgentConfig;
pub use error::LookoutError;
pub use event::SessionEvent;
pub use gate::{ReadinessGate, SessionToken};
pub use proxy::ProxyFront;
pub use session::{GameSession, SessionConfig, SessionPhase};
pub use supervisor::ReconnectSupervisor;
pub use transport::{Connector, Credentials, Transport};
pub use transports::{WebSocketConnector, WebSocketTransport};
pub use viewer::{ProcessSidecar, Sidecar, ViewerLaunchState, ViewerLauncher};
