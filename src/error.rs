//! Error types shared across subsystems.
//!
//! Startup errors (configuration, certificates, listener binding) are fatal and
//! propagate to whoever called startup. Bridge errors are local to a single
//! connection pair and never escape the connection task.

use thiserror::Error;

use crate::config::validation::ValidationError;

/// Error type for configuration loading and decoding.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value at `{path}`: {message}")]
    Decode { path: String, message: String },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    pub(crate) fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failure to load or parse the global certificate bundle.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to read {what} from {path}: {source}")]
    Read {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no {0} found in PEM data")]
    Missing(&'static str),

    #[error("invalid PEM data for {what}: {source}")]
    Pem {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reclaim port {port}: {message}")]
    Reclaim { port: u16, message: String },

    #[error("failed to accept on port {port}: {source}")]
    Accept {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Per-connection bridge failure.
///
/// Returned from a handler it makes the server abort the HTTP/1.1 connection or
/// reset the HTTP/2 stream.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no route for host `{0}`")]
    NoRoute(String),

    #[error("upstream {target} unreachable: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP/2 request for TLS route `{0}` must use the stream bridge")]
    StreamOnly(String),

    #[error("invalid upstream server name `{0}`")]
    ServerName(String),

    #[error("upstream HTTP error: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("invalid upstream URI: {0}")]
    Uri(#[from] hyper::http::uri::InvalidUri),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Top-level startup error.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}
