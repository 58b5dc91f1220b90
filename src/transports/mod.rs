//! Concrete transports for the game bridge.
//!
//! | Type                   | Connector              |
//! |------------------------|------------------------|
//! | [`WebSocketTransport`] | [`WebSocketConnector`] |

pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketTransport};
