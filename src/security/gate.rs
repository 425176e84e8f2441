//! Validation gate.
//!
//! # Responsibilities
//! - Describe an inbound request or upgrade as a [`ConnectionInfo`]
//! - Run the route validator, or the global one, before anything is forwarded
//! - Turn a rejection into the response the client sees
//!
//! # Design Decisions
//! - Validators are capabilities ([`Validator`]), not closures tied to a runtime
//! - A validator that errors or panics counts as a rejection with 500
//! - Runs before the 101 response for WebSocket upgrades

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};

use crate::config::ProxyConfig;
use crate::net::connection::ConnectionId;

/// Boxed error a validator may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`Validator::validate`].
pub type ValidationFuture = BoxFuture<'static, Result<ForwardValidationResult, BoxError>>;

/// Async predicate deciding whether a connection may be forwarded.
pub trait Validator: Send + Sync {
    fn validate(&self, info: ConnectionInfo) -> ValidationFuture;
}

impl<F, Fut> Validator for F
where
    F: Fn(ConnectionInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ForwardValidationResult, BoxError>> + Send + 'static,
{
    fn validate(&self, info: ConnectionInfo) -> ValidationFuture {
        Box::pin(self(info))
    }
}

/// Kind of inbound unit being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Rest,
    Stream,
    WebSocket,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestType::Rest => "rest",
            RequestType::Stream => "stream",
            RequestType::WebSocket => "websocket",
        })
    }
}

/// Outcome of a validator.
#[derive(Debug, Clone, Default)]
pub struct ForwardValidationResult {
    /// `false` aborts forwarding.
    pub status: bool,
    pub code: Option<u16>,
    pub message: Option<String>,
    pub headers: HeaderMap,
}

impl ForwardValidationResult {
    pub fn allow() -> Self {
        Self {
            status: true,
            ..Self::default()
        }
    }

    pub fn deny(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: false,
            code: Some(code),
            message: Some(message.into()),
            headers: HeaderMap::new(),
        }
    }

    /// Rejection used when a validator itself fails.
    pub fn internal_error() -> Self {
        Self::deny(500, "Internal Server Error")
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A response a validator recorded through [`ConnectionInfo::respond`] / [`ConnectionInfo::end`].
#[derive(Debug, Clone, Default)]
struct EarlyResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<String>,
}

/// Per-request descriptor handed to validators. Discarded after validation.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub method: String,
    pub path: String,
    pub remote_address: String,
    pub scheme: String,
    pub authority: String,
    pub origin: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub kind: RequestType,
    early: Arc<Mutex<Option<EarlyResponse>>>,
}

impl ConnectionInfo {
    pub fn new(kind: RequestType) -> Self {
        Self {
            id: ConnectionId::next(),
            method: "GET".to_string(),
            path: "/".to_string(),
            remote_address: String::new(),
            scheme: "http".to_string(),
            authority: String::new(),
            origin: String::new(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            kind,
            early: Arc::new(Mutex::new(None)),
        }
    }

    /// Header value as a string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First query parameter with the given name.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Record the response to send if this connection is rejected.
    pub fn respond(&self, status: StatusCode, headers: HeaderMap, body: Option<String>) {
        let mut early = self.early.lock().unwrap_or_else(|e| e.into_inner());
        *early = Some(EarlyResponse {
            status: Some(status),
            headers,
            body,
        });
    }

    /// Set the body of the rejection response, keeping any recorded status and headers.
    pub fn end(&self, body: Option<String>) {
        let mut early = self.early.lock().unwrap_or_else(|e| e.into_inner());
        let response = early.get_or_insert_with(EarlyResponse::default);
        if body.is_some() {
            response.body = body;
        }
    }

    fn take_early(&self) -> Option<EarlyResponse> {
        self.early.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// What the gate decided for one connection.
#[derive(Debug)]
pub enum GateDecision {
    Forward,
    Reject(Response<Body>),
}

/// Run the validator for `info` and build the rejection response if it fails.
pub async fn evaluate(config: &ProxyConfig, info: &ConnectionInfo) -> GateDecision {
    let result = config.validate(info).await;
    if result.status {
        return GateDecision::Forward;
    }

    tracing::info!(
        connection_id = %info.id,
        kind = %info.kind,
        authority = %info.authority,
        code = ?result.code,
        message = ?result.message,
        "Connection rejected by validator"
    );

    let early = info.take_early().unwrap_or_default();
    let status = early
        .status
        .or_else(|| result.code.and_then(|c| StatusCode::from_u16(c).ok()))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = early
        .body
        .or(result.message)
        .unwrap_or_else(|| "Internal Server Error".to_string());

    let mut headers = result.headers;
    headers.extend(early.headers);
    headers.extend(config.get_cors_headers(&info.origin, Some(&info.authority)));

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    GateDecision::Reject(response)
}
