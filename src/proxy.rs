//! Public HTTP surface.
//!
//! - `GET /` answers a plain-text liveness line.
//! - `/viewer` and everything below it is reverse-proxied to the viewer
//!   sidecar, with the `/viewer` prefix stripped, but only while the
//!   [`ReadinessGate`] is open. WebSocket upgrades are bridged frame by
//!   frame. A closed gate or an unreachable sidecar yields `503`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, request::Parts, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{LookoutError, Result};
use crate::gate::ReadinessGate;

/// Body of `GET /`.
pub const LIVENESS_BODY: &str = "Minecraft bot is running";

/// Body returned while the gate is closed.
pub const NOT_READY_BODY: &str = "Viewer not ready";

/// Body returned when the gate is open but the sidecar cannot be reached.
pub const UNAVAILABLE_BODY: &str = "Viewer unavailable";

/// Largest request body forwarded to the sidecar.
const MAX_FORWARD_BODY: usize = 8 * 1024 * 1024;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Gated reverse proxy in front of the viewer sidecar.
#[derive(Debug, Clone)]
pub struct ProxyFront {
    gate: Arc<ReadinessGate>,
    upstream: SocketAddr,
    client: reqwest::Client,
}

impl ProxyFront {
    /// Proxy to the sidecar listening on `upstream`.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::HttpClient`] if the forwarding client cannot
    /// be built.
    pub fn new(gate: Arc<ReadinessGate>, upstream: SocketAddr) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LookoutError::HttpClient(e.to_string()))?;
        Ok(Self {
            gate,
            upstream,
            client,
        })
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(liveness))
            .fallback(dispatch)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    async fn handle_viewer(&self, req: Request, path: String) -> Response {
        if !self.gate.is_open() {
            return (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY).into_response();
        }

        let (mut parts, body) = req.into_parts();
        if is_websocket_upgrade(&parts.headers) {
            return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => self.bridge_websocket(upgrade, &path).await,
                Err(rejection) => rejection.into_response(),
            };
        }
        self.forward(parts, body, &path).await
    }

    async fn forward(&self, parts: Parts, body: Body, path: &str) -> Response {
        let body = match axum::body::to_bytes(body, MAX_FORWARD_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("rejecting viewer request body: {e}");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        // reqwest sets Host from the upstream URL.
        headers.remove(header::HOST);

        let url = format!("http://{}{}", self.upstream, path);
        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match upstream {
            Ok(resp) => {
                let status = resp.status();
                let mut headers = resp.headers().clone();
                strip_hop_by_hop(&mut headers);
                let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(e) => {
                debug!("viewer sidecar unreachable: {e}");
                (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY).into_response()
            }
        }
    }

    async fn bridge_websocket(&self, upgrade: WebSocketUpgrade, path: &str) -> Response {
        let url = format!("ws://{}{}", self.upstream, path);
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((upstream, _response)) => upgrade.on_upgrade(move |socket| pump(socket, upstream)),
            Err(e) => {
                debug!("viewer sidecar websocket unreachable: {e}");
                (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY).into_response()
            }
        }
    }
}

/// Serve `front` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`LookoutError::Io`] if the server fails.
pub async fn serve(
    listener: TcpListener,
    front: ProxyFront,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, front.router())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn liveness() -> &'static str {
    LIVENESS_BODY
}

async fn dispatch(State(front): State<ProxyFront>, req: Request) -> Response {
    match viewer_path(req.uri()) {
        Some(path) => front.handle_viewer(req, path).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Sidecar path and query for a request under `/viewer`, or `None` if the
/// request is not viewer traffic.
fn viewer_path(uri: &Uri) -> Option<String> {
    let rest = uri.path().strip_prefix("/viewer")?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let path = if rest.is_empty() { "/" } else { rest };
    Some(match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    })
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

type UpstreamSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Shuttle frames both ways until either side closes.
async fn pump(client: WebSocket, upstream: UpstreamSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let Some(msg) = to_upstream(msg) else {
                continue;
            };
            let closing = matches!(msg, UpstreamMessage::Close(_));
            if upstream_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let Some(msg) = to_client(msg) else {
                continue;
            };
            let closing = matches!(msg, ws::Message::Close(_));
            if client_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
    debug!("viewer websocket bridge closed");
}

/// Ping/pong are answered per hop, so only data and close frames cross.
fn to_upstream(msg: ws::Message) -> Option<UpstreamMessage> {
    match msg {
        ws::Message::Text(text) => Some(UpstreamMessage::Text(text.as_str().into())),
        ws::Message::Binary(data) => Some(UpstreamMessage::Binary(data)),
        ws::Message::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| {
            UpstreamCloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().into(),
            }
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(msg: UpstreamMessage) -> Option<ws::Message> {
    match msg {
        UpstreamMessage::Text(text) => Some(ws::Message::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Some(ws::Message::Binary(data)),
        UpstreamMessage::Close(frame) => Some(ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn front_builds_without_panicking() {
        let gate = Arc::new(ReadinessGate::new());
        let front = ProxyFront::new(gate, crate::viewer::VIEWER_BIND).unwrap();
        assert_eq!(front.upstream, crate::viewer::VIEWER_BIND);
    }

    #[test]
    fn viewer_path_strips_prefix_and_keeps_query() {
        let uri: Uri = "/viewer/index.js?v=3".parse().unwrap();
        assert_eq!(viewer_path(&uri).as_deref(), Some("/index.js?v=3"));
    }

    #[test]
    fn bare_prefix_maps_to_root() {
        let uri: Uri = "/viewer".parse().unwrap();
        assert_eq!(viewer_path(&uri).as_deref(), Some("/"));
        let uri: Uri = "/viewer/".parse().unwrap();
        assert_eq!(viewer_path(&uri).as_deref(), Some("/"));
    }

    #[test]
    fn lookalike_prefix_is_not_viewer_traffic() {
        let uri: Uri = "/viewerx/index.html".parse().unwrap();
        assert_eq!(viewer_path(&uri), None);
        let uri: Uri = "/status".parse().unwrap();
        assert_eq!(viewer_path(&uri), None);
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn websocket_upgrade_detection_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn text_frames_cross_in_both_directions() {
        let up = to_upstream(ws::Message::Text("hi".into())).unwrap();
        assert_eq!(up, UpstreamMessage::Text("hi".into()));
        let down = to_client(UpstreamMessage::Text("yo".into())).unwrap();
        assert_eq!(down, ws::Message::Text("yo".into()));
        assert!(to_client(UpstreamMessage::Ping(Default::default())).is_none());
    }
}
