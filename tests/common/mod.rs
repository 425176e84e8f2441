//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::get;
use axum::{Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vhost_proxy::config::{LoadedCertificates, ServerConfig};
use vhost_proxy::net::tls;
use vhost_proxy::{Handlers, ProxyConfig, ProxyServer};

/// Start a raw backend that answers every request with `status`, `headers` and `body`.
pub async fn start_mock_backend(
    status: &'static str,
    headers: &'static [(&'static str, &'static str)],
    body: &'static str,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let mut response = format!("HTTP/1.1 {status}\r\n");
                for (name, value) in headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Raw backend that promises `len` body bytes, sends `partial`, then drops the connection.
pub async fn start_truncating_backend(len: usize, partial: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {len}\r\n\r\n{partial}");
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
            });
        }
    });

    addr
}

/// Backend that describes each request it receives as JSON.
pub fn describe_app(name: &'static str) -> Router {
    Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap| async move {
        Json(json!({
            "backend": name,
            "method": method.as_str(),
            "path": uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"),
            "host": headers.get("host").and_then(|v| v.to_str().ok()),
            "authority": uri.authority().map(|a| a.as_str()),
        }))
    })
}

/// Plain HTTP backend serving [`describe_app`].
pub async fn start_json_backend(name: &'static str) -> SocketAddr {
    serve_app(describe_app(name)).await
}

/// WebSocket backend on `/socket`. Echoes text, answers `host` with the
/// handshake `Host`, `binary-json` with a binary JSON frame, and closes on `close`.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let app = Router::new().route(
        "/socket",
        get(|ws: WebSocketUpgrade, headers: HeaderMap| async move {
            let host = headers
                .get("host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            ws.on_upgrade(move |socket| echo(socket, host))
        }),
    );
    serve_app(app).await
}

async fn echo(mut socket: WebSocket, host: String) {
    while let Some(Ok(message)) = socket.recv().await {
        let reply = match message {
            Message::Text(text) if text.as_str() == "host" => Message::Text(host.clone().into()),
            Message::Text(text) if text.as_str() == "binary-json" => {
                Message::Binary(axum::body::Bytes::from_static(br#"{"ok":true}"#))
            }
            Message::Text(text) if text.as_str() == "close" => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            Message::Text(text) => Message::Text(text),
            Message::Binary(data) => Message::Binary(data),
            Message::Close(_) => break,
            _ => continue,
        };
        if socket.send(reply).await.is_err() {
            break;
        }
    }
}

/// WebSocket backend on `/socket` that reports on the channel when a client goes away.
pub async fn start_ws_watch_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/socket",
        get(move |ws: WebSocketUpgrade| {
            let closed_tx = closed_tx.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(message)) = socket.recv().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    let _ = closed_tx.send(());
                })
            }
        }),
    );
    (serve_app(app).await, closed_rx)
}

async fn serve_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Self-signed bundle for `host`.
pub fn self_signed(host: &str) -> LoadedCertificates {
    let certified = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    LoadedCertificates {
        key: certified.key_pair.serialize_pem().into_bytes(),
        cert: certified.cert.pem().into_bytes(),
        ca: None,
        allow_http1: true,
    }
}

/// TLS backend speaking HTTP/2 and HTTP/1.1, serving [`describe_app`].
pub async fn start_tls_backend(name: &'static str, bundle: &LoadedCertificates) -> SocketAddr {
    let acceptor = tokio_rustls::TlsAcceptor::from(tls::server_config(bundle).unwrap());
    let app = describe_app(name);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let service = TowerToHyperService::new(app.clone());
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(stream).await else {
                    return;
                };
                let _ = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a proxy without TLS and with the built-in handlers.
pub async fn start_proxy(config: ServerConfig) -> ProxyServer {
    start_proxy_with(ProxyConfig::new(config, None), Handlers::new()).await
}

pub async fn start_proxy_with(config: ProxyConfig, handlers: Handlers) -> ProxyServer {
    let mut server = ProxyServer::new(config, handlers).unwrap();
    server.start().await.unwrap();
    server
}

/// Loopback URL for the proxy's `index`-th listener.
pub fn proxy_url(server: &ProxyServer, index: usize, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", server.local_addrs()[index].port(), path)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
