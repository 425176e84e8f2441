//! Substitutable protocol handlers.
//!
//! # Responsibilities
//! - Define the seams the listener dispatches to: REST, HTTP/2 stream, WebSocket
//! - Let callers replace any of them while keeping listeners and the gate
//!
//! # Design Decisions
//! - Closures implement the traits directly
//! - A handler that returns `Err` aborts the HTTP/1.1 connection or resets the HTTP/2 stream

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::WebSocketStream;

use crate::error::BridgeError;

/// Result every request handler produces.
pub type HandlerResult = Result<Response<Body>, BridgeError>;

/// Client side of an accepted WebSocket upgrade.
pub type ClientSocket = WebSocketStream<TokioIo<Upgraded>>;

/// Handles plain request/response traffic.
pub trait RestHandler: Send + Sync {
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult>;
}

/// Handles HTTP/2 streams for routes with outbound TLS.
pub trait StreamHandler: Send + Sync {
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult>;
}

/// Handles an upgraded WebSocket. `req` is the original handshake without its body.
pub trait WebSocketHandler: Send + Sync {
    fn handle(&self, req: Request<()>, socket: ClientSocket) -> BoxFuture<'static, ()>;
}

impl<F, Fut> RestHandler for F
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(req))
    }
}

impl<F, Fut> StreamHandler for F
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, req: Request<Incoming>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(req))
    }
}

impl<F, Fut> WebSocketHandler for F
where
    F: Fn(Request<()>, ClientSocket) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, req: Request<()>, socket: ClientSocket) -> BoxFuture<'static, ()> {
        Box::pin(self(req, socket))
    }
}

/// Handler overrides. Unset slots use the built-in bridges.
#[derive(Clone, Default)]
pub struct Handlers {
    pub rest: Option<Arc<dyn RestHandler>>,
    pub stream: Option<Arc<dyn StreamHandler>>,
    pub websocket: Option<Arc<dyn WebSocketHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rest(mut self, handler: impl RestHandler + 'static) -> Self {
        self.rest = Some(Arc::new(handler));
        self
    }

    pub fn stream(mut self, handler: impl StreamHandler + 'static) -> Self {
        self.stream = Some(Arc::new(handler));
        self
    }

    pub fn websocket(mut self, handler: impl WebSocketHandler + 'static) -> Self {
        self.websocket = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("rest", &self.rest.is_some())
            .field("stream", &self.stream.is_some())
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}
