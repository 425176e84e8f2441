//! Listener Manager.
//!
//! # Responsibilities
//! - Bind a configured port on all interfaces
//! - Recover from a port conflict when reclaim is enabled
//! - Accept connections until shutdown and serve each in its own task
//! - Pick the protocol stack: HTTP/1.1 in cleartext, HTTP/2 + HTTP/1.1 over TLS
//!
//! # Design Decisions
//! - No cleartext HTTP/2; HTTP/2 is only negotiated through ALPN
//! - With HTTP/1.1 disallowed, TLS connections are served HTTP/2 only, ALPN or not
//! - Upgrades are enabled on every stack so WebSocket handshakes reach the dispatcher
//! - Shutdown stops accepting only; connections already spawned run to completion

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::ListenerError;
use crate::http::server::{with_context, Dispatcher};
use crate::net::connection::{ConnectionContext, ConnectionRegistry};
use crate::net::reclaim::reclaim_port;
use crate::net::tls::TlsTerminator;

type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound port, ready to serve.
pub struct Listener {
    inner: TcpListener,
    port: u16,
    local_addr: SocketAddr,
    tls: Option<TlsTerminator>,
}

impl Listener {
    /// Bind `0.0.0.0:port`. With `reclaim` set, a port held by another process
    /// is reclaimed after the grace delay and the bind is retried once.
    pub async fn bind(
        port: u16,
        reclaim: Option<Duration>,
        tls: Option<TlsTerminator>,
    ) -> Result<Self, ListenerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let inner = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(error) if error.kind() == io::ErrorKind::AddrInUse => match reclaim {
                Some(grace) => {
                    reclaim_port(port, grace).await?;
                    TcpListener::bind(addr)
                        .await
                        .map_err(|source| bind_error(port, source))?
                }
                None => return Err(ListenerError::PortInUse { port }),
            },
            Err(source) => return Err(bind_error(port, source)),
        };

        let local_addr = inner.local_addr().map_err(|source| bind_error(port, source))?;

        tracing::info!(
            port,
            address = %local_addr,
            tls = tls.is_some(),
            "Listener bound"
        );

        Ok(Self {
            inner,
            port,
            local_addr,
            tls,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Configured port; `0` when the OS picked one.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        self.inner.accept().await.map_err(|source| ListenerError::Accept {
            port: self.local_addr.port(),
            source,
        })
    }

    /// Accept loop. Returns once `shutdown` fires, dropping the socket.
    pub async fn serve(
        self,
        dispatcher: Arc<Dispatcher>,
        connections: ConnectionRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let port = self.local_addr.port();

        loop {
            tokio::select! {
                accepted = self.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(connection) => connection,
                        Err(error) => {
                            tracing::warn!(port, error = %error, "Accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let live = connections.register();
                    let context = ConnectionContext {
                        id: live.id(),
                        remote_addr,
                        secure: self.tls.is_some(),
                        port,
                    };
                    tracing::debug!(connection_id = %context.id, peer_addr = %remote_addr, port, "Connection accepted");

                    let tls = self.tls.clone();
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(async move {
                        serve_connection(stream, tls, dispatcher, context).await;
                        drop(live);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(port, "Listener closing");
                    break;
                }
            }
        }
    }
}

fn bind_error(port: u16, source: io::Error) -> ListenerError {
    if source.kind() == io::ErrorKind::AddrInUse {
        ListenerError::PortInUse { port }
    } else {
        ListenerError::Bind { port, source }
    }
}

async fn serve_connection(
    stream: TcpStream,
    tls: Option<TlsTerminator>,
    dispatcher: Arc<Dispatcher>,
    context: ConnectionContext,
) {
    let service = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .service(tower::service_fn(move |req: Request<Incoming>| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.dispatch(with_context(req, context)).await }
        }));
    let service = TowerToHyperService::new(service);

    let result: Result<(), ServeError> = match tls {
        Some(tls) => {
            let stream = match tls.acceptor().accept(stream).await {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::debug!(connection_id = %context.id, error = %error, "TLS handshake failed");
                    return;
                }
            };
            let mut builder = auto::Builder::new(TokioExecutor::new());
            if !tls.allow_http1() {
                builder = builder.http2_only();
            }
            let served = builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await;
            served
        }
        None => http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades()
            .await
            .map_err(Into::into),
    };

    if let Err(error) = result {
        tracing::debug!(connection_id = %context.id, error = %error, "Connection ended with error");
    }
}
