//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Answer an accepted upgrade with `101 Switching Protocols`
//! - Establish WebSocket connection to backend
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The gate runs before this module sees the handshake
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - Binary backend frames that carry a JSON object are sent to the client as text
//! - No reconnect when either side drops

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use futures_util::future::{select, BoxFuture, Either};
use futures_util::{SinkExt, StreamExt};
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use rustls::ClientConfig;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, connect_async_tls_with_config, Connector};

use crate::config::ProxyConfig;
use crate::error::{BridgeError, CertificateError};
use crate::http::handlers::{ClientSocket, WebSocketHandler};
use crate::http::request;
use crate::net::tls;

/// How long the second direction may take to wind down after the first one ends.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Headers the outbound handshake sets itself.
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
];

/// Outbound TLS config for `wss` targets.
pub fn websocket_tls(config: &ProxyConfig) -> Result<Arc<ClientConfig>, CertificateError> {
    tls::client_config(config.get_ssl().map(|b| b.as_ref()), &[tls::ALPN_HTTP11]).map(Arc::new)
}

/// `101` response completing the client handshake. Echoes the first requested subprotocol.
pub fn switching_protocols<B>(req: &Request<B>) -> Result<Response<Body>, BridgeError> {
    let key = req
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|k| k.as_bytes())
        .unwrap_or_default();

    let mut builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_ACCEPT, derive_accept_key(key));

    if let Some(protocol) = requested_protocols(req).into_iter().next() {
        builder = builder.header(header::SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(builder.body(Body::empty())?)
}

fn requested_protocols<B>(req: &Request<B>) -> Vec<String> {
    req.headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Built-in [`WebSocketHandler`].
#[derive(Clone)]
pub struct WebSocketBridge {
    config: Arc<ProxyConfig>,
    tls: Arc<ClientConfig>,
}

impl WebSocketBridge {
    pub fn new(config: Arc<ProxyConfig>, tls: Arc<ClientConfig>) -> Self {
        Self { config, tls }
    }

    pub async fn bridge(&self, req: Request<()>, mut client: ClientSocket) {
        let host = request::authority(&req);
        let Some(target) = self.config.get_target(&host) else {
            tracing::debug!(host = %host, "No route for WebSocket host, closing");
            let _ = client.close(None).await;
            return;
        };

        let path = target.remap_path(&request::path_and_query(req.uri()));
        let scheme = if target.secure { "wss" } else { "ws" };
        let url = format!("{scheme}://{}{}", target.address, path);

        let outbound = match outbound_request(&url, &host, &req) {
            Ok(outbound) => outbound,
            Err(error) => {
                tracing::warn!(host = %host, url = %url, error = %error, "Invalid upstream WebSocket request");
                let _ = client.close(None).await;
                return;
            }
        };

        let connected = if target.secure {
            let connector = Connector::Rustls(Arc::clone(&self.tls));
            connect_async_tls_with_config(outbound, None, false, Some(connector)).await
        } else {
            connect_async(outbound).await
        };

        let backend = match connected {
            Ok((backend, _)) => backend,
            Err(error) => {
                tracing::warn!(host = %host, url = %url, error = %error, "Upstream WebSocket connect failed");
                let _ = client.close(None).await;
                return;
            }
        };

        tracing::debug!(host = %host, url = %url, "WebSocket bridged");

        let (mut client_tx, mut client_rx) = client.split();
        let (mut backend_tx, mut backend_rx) = backend.split();

        let client_to_backend = async move {
            while let Some(message) = client_rx.next().await {
                match message {
                    Ok(Message::Close(frame)) => {
                        let _ = backend_tx.send(Message::Close(frame)).await;
                        break;
                    }
                    Ok(Message::Frame(_)) => {}
                    Ok(message) => {
                        if backend_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::debug!(error = %error, "Client WebSocket read failed");
                        break;
                    }
                }
            }
            let _ = backend_tx.close().await;
        };

        let backend_to_client = async move {
            while let Some(message) = backend_rx.next().await {
                match message {
                    Ok(Message::Close(frame)) => {
                        let _ = client_tx.send(Message::Close(frame)).await;
                        break;
                    }
                    Ok(Message::Frame(_)) => {}
                    Ok(message) => {
                        if client_tx.send(to_client_frame(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::debug!(error = %error, "Backend WebSocket read failed");
                        break;
                    }
                }
            }
            let _ = client_tx.close().await;
        };

        match select(pin!(client_to_backend), pin!(backend_to_client)).await {
            Either::Left((_, rest)) => {
                let _ = tokio::time::timeout(CLOSE_GRACE, rest).await;
            }
            Either::Right((_, rest)) => {
                let _ = tokio::time::timeout(CLOSE_GRACE, rest).await;
            }
        }

        tracing::debug!(host = %host, "WebSocket closed");
    }
}

impl WebSocketHandler for WebSocketBridge {
    fn handle(&self, req: Request<()>, socket: ClientSocket) -> BoxFuture<'static, ()> {
        let bridge = self.clone();
        Box::pin(async move { bridge.bridge(req, socket).await })
    }
}

/// Handshake request towards the backend: original headers, original `Host`.
fn outbound_request(
    url: &str,
    host: &str,
    req: &Request<()>,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, BridgeError> {
    let mut outbound = url.into_client_request()?;
    let headers = outbound.headers_mut();

    for (name, value) in req.headers() {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if let Ok(host) = HeaderValue::from_str(host) {
        headers.insert(header::HOST, host);
    }
    Ok(outbound)
}

/// Binary frames holding a JSON object reach the client as text.
fn to_client_frame(message: Message) -> Message {
    match message {
        Message::Binary(data) if data.first() == Some(&b'{') => match std::str::from_utf8(&data) {
            Ok(text) => Message::text(text.to_string()),
            Err(_) => Message::Binary(data),
        },
        other => other,
    }
}
