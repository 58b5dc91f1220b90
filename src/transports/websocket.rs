//! WebSocket transport to the game bridge, built on `tokio-tungstenite`.
//!
//! The bridge listens on `ws://{host}:{port}{path}` and exchanges one JSON
//! bridge message per text frame.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::LookoutError;
use crate::transport::{Connector, Credentials, Transport};

/// Default time allowed for the TCP + WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url`, failing with [`LookoutError::Timeout`] after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Io`] if the URL is invalid or the server is
    /// unreachable. I/O error kinds are preserved.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, LookoutError> {
        tracing::debug!(url = %url, "connecting to game bridge");

        let (stream, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| LookoutError::Timeout)?
                .map_err(|e| {
                    let kind = match &e {
                        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                        _ => std::io::ErrorKind::Other,
                    };
                    LookoutError::Io(std::io::Error::new(kind, e))
                })?;

        tracing::info!(url = %url, "game bridge connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), LookoutError> {
        if self.closed {
            return Err(LookoutError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| LookoutError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LookoutError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(LookoutError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "bridge sent close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame from bridge, skipping");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), LookoutError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LookoutError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] dialing `ws://{host}:{port}{path}` for each session.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    path: String,
    timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request path on the bridge. A leading `/` is added if missing.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Handshake timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL this connector dials for `credentials`.
    pub fn url_for(&self, credentials: &Credentials) -> String {
        format!("ws://{}:{}{}", credentials.host, credentials.port, self.path)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, credentials: &Credentials) -> Result<WebSocketTransport, LookoutError> {
        WebSocketTransport::connect(&self.url_for(credentials), self.timeout).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection, run `handler` on it, and return the
    /// bound port.
    async fn start_mock_bridge<F, Fut>(handler: F) -> u16
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        port
    }

    #[test]
    fn connector_builds_url_from_credentials() {
        let creds = Credentials::new("Scout", "play.example.net", 25565);
        let connector = WebSocketConnector::new().with_path("bridge");
        assert_eq!(connector.url_for(&creds), "ws://play.example.net:25565/bridge");
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let creds = Credentials::new("Scout", "127.0.0.1", 1);
        let err = WebSocketConnector::new().connect(&creds).await.unwrap_err();
        assert!(matches!(err, LookoutError::Io(_)));
    }

    #[tokio::test]
    async fn connect_times_out_on_unroutable_address() {
        let creds = Credentials::new("Scout", "192.0.2.1", 1);
        let connector = WebSocketConnector::new().with_timeout(Duration::from_millis(50));
        let err = connector.connect(&creds).await.unwrap_err();
        // Hosts without a route fail fast instead of timing out.
        assert!(matches!(err, LookoutError::Timeout | LookoutError::Io(_)));
    }

    #[tokio::test]
    async fn recv_skips_control_and_binary_frames() {
        let port = start_mock_bridge(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"spawned","username":"Scout"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let creds = Credentials::new("Scout", "127.0.0.1", port);
        let mut transport = WebSocketConnector::new().connect(&creds).await.unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert!(msg.contains("spawned"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_reaches_bridge() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let port = start_mock_bridge(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = tx.send(text.to_string());
            }
        })
        .await;

        let creds = Credentials::new("Scout", "127.0.0.1", port);
        let mut transport = WebSocketConnector::new().connect(&creds).await.unwrap();
        transport.send("hello".to_string()).await.unwrap();
        assert_eq!(rx.await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_after_close_is_rejected_and_close_is_idempotent() {
        let port =
            start_mock_bridge(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let creds = Credentials::new("Scout", "127.0.0.1", port);
        let mut transport = WebSocketConnector::new().connect(&creds).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, LookoutError::TransportClosed));
    }
}
