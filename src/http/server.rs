//! Request dispatch and the proxy server facade.
//!
//! # Responsibilities
//! - Answer the health path before any routing
//! - Run the validation gate for every upgrade, stream and request
//! - Complete WebSocket upgrades and hand the socket to the WebSocket handler
//! - Send HTTP/2 traffic for TLS routes to the stream handler, the rest to the REST handler
//! - Start and stop one listener per configured port

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, Version};
use hyper_util::rt::TokioIo;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use crate::config::ProxyConfig;
use crate::error::{BridgeError, ProxyError};
use crate::http::handlers::{Handlers, RestHandler, StreamHandler, WebSocketHandler};
use crate::http::rest::{upstream_client, RestBridge};
use crate::http::stream::{stream_tls, StreamBridge};
use crate::http::websocket::{switching_protocols, websocket_tls, WebSocketBridge};
use crate::http::{request, response};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::{ConnectionContext, ConnectionRegistry};
use crate::net::listener::Listener;
use crate::net::tls;
use crate::security::gate::{self, GateDecision, RequestType};

/// Routes each inbound request to the right handler. Shared by all listeners.
pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    rest: Arc<dyn RestHandler>,
    stream: Arc<dyn StreamHandler>,
    websocket: Arc<dyn WebSocketHandler>,
}

impl Dispatcher {
    /// Fill unset handler slots with the built-in bridges.
    pub fn new(config: Arc<ProxyConfig>, handlers: Handlers) -> Result<Self, ProxyError> {
        let rest = match handlers.rest {
            Some(rest) => rest,
            None => Arc::new(RestBridge::new(Arc::clone(&config), upstream_client(&config)?)),
        };
        let stream = match handlers.stream {
            Some(stream) => stream,
            None => Arc::new(StreamBridge::new(Arc::clone(&config), stream_tls(&config)?)),
        };
        let websocket = match handlers.websocket {
            Some(websocket) => websocket,
            None => Arc::new(WebSocketBridge::new(Arc::clone(&config), websocket_tls(&config)?)),
        };

        Ok(Self {
            config,
            rest,
            stream,
            websocket,
        })
    }

    pub async fn dispatch(&self, req: Request<Incoming>) -> Result<Response<Body>, BridgeError> {
        if req.method() == Method::GET && req.uri().path() == self.config.health_path() {
            return Ok(response::health());
        }

        if request::is_websocket_upgrade(req.headers()) {
            return self.upgrade(req).await;
        }

        let kind = if req.version() == Version::HTTP_2 && self.routes_over_tls(&req) {
            RequestType::Stream
        } else {
            RequestType::Rest
        };

        let info = request::connection_info(&req, kind);
        if let GateDecision::Reject(response) = gate::evaluate(&self.config, &info).await {
            return Ok(response);
        }

        match kind {
            RequestType::Stream => self.stream.handle(req).await,
            _ => self.rest.handle(req).await,
        }
    }

    fn routes_over_tls<B>(&self, req: &Request<B>) -> bool {
        self.config
            .get_route(&request::authority(req))
            .map(|route| route.ssl)
            .unwrap_or(false)
    }

    /// Gate, answer `101`, then bridge the upgraded socket in its own task.
    async fn upgrade(&self, mut req: Request<Incoming>) -> Result<Response<Body>, BridgeError> {
        let info = request::connection_info(&req, RequestType::WebSocket);
        if let GateDecision::Reject(response) = gate::evaluate(&self.config, &info).await {
            return Ok(response);
        }

        let accepted = switching_protocols(&req)?;
        let on_upgrade = hyper::upgrade::on(&mut req);

        let (parts, _body) = req.into_parts();
        let handshake = Request::from_parts(parts, ());
        let handler = Arc::clone(&self.websocket);
        let connection_id = info.id;

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let socket =
                        WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                            .await;
                    handler.handle(handshake, socket).await;
                }
                Err(error) => {
                    tracing::debug!(connection_id = %connection_id, error = %error, "WebSocket upgrade failed");
                }
            }
        });

        Ok(accepted)
    }
}

/// One bound, running listener.
struct RunningListener {
    port: u16,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

/// The proxy: configuration, handlers and the listeners serving them.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    dispatcher: Arc<Dispatcher>,
    tls: Option<tls::TlsTerminator>,
    connections: ConnectionRegistry,
    shutdown: Shutdown,
    listeners: Vec<RunningListener>,
}

impl ProxyServer {
    /// Build TLS configs and handlers. Nothing is bound until [`start`](Self::start).
    pub fn new(config: ProxyConfig, handlers: Handlers) -> Result<Self, ProxyError> {
        tls::install_crypto_provider();

        let config = Arc::new(config);
        let tls = match config.get_ssl() {
            Some(bundle) => Some(tls::TlsTerminator::new(bundle)?),
            None => None,
        };
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&config), handlers)?);
        Ok(Self {
            config,
            dispatcher,
            tls,
            connections: ConnectionRegistry::new(),
            shutdown: Shutdown::new(),
            listeners: Vec::new(),
        })
    }

    /// Bind every configured port and start accepting. A bind failure stops
    /// the listeners already started and is returned.
    pub async fn start(&mut self) -> Result<(), ProxyError> {
        if !self.listeners.is_empty() {
            return Ok(());
        }

        let ports = self.config.get_ports();
        let reclaim = self.config.reclaim_ports().then(|| self.config.reclaim_grace());
        tracing::info!(
            ports = ?ports,
            tls = self.tls.is_some(),
            routes = ?self.config.route_patterns().collect::<Vec<_>>(),
            "Starting proxy server"
        );

        self.shutdown = Shutdown::new();
        for port in ports {
            let listener = match Listener::bind(port, reclaim, self.tls.clone()).await {
                Ok(listener) => listener,
                Err(error) => {
                    tracing::error!(port, error = %error, "Failed to start listener");
                    self.stop().await;
                    return Err(error.into());
                }
            };

            let local_addr = listener.local_addr();
            let task = tokio::spawn(listener.serve(
                Arc::clone(&self.dispatcher),
                self.connections.clone(),
                self.shutdown.subscribe(),
            ));
            self.listeners.push(RunningListener {
                port,
                local_addr,
                task,
            });
        }

        tracing::info!("Proxy server started");
        Ok(())
    }

    /// Stop accepting on every listener and wait for the accept loops to exit.
    /// Connections already in flight run to completion.
    pub async fn stop(&mut self) {
        if self.listeners.is_empty() {
            return;
        }

        tracing::info!(
            live_connections = self.connections.live(),
            accepted_connections = self.connections.accepted(),
            "Stopping proxy server"
        );
        self.shutdown.trigger();
        for listener in self.listeners.drain(..) {
            if let Err(error) = listener.task.await {
                tracing::warn!(port = listener.port, error = %error, "Listener task failed");
            }
        }
        tracing::info!("Proxy server stopped");
    }

    /// Addresses actually bound, in port order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr).collect()
    }

    pub fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.live()
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("local_addrs", &self.local_addrs())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

/// Attach connection facts to a request.
pub(crate) fn with_context(mut req: Request<Incoming>, context: ConnectionContext) -> Request<Incoming> {
    req.extensions_mut().insert(context);
    req
}
