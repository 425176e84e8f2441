//! Virtual-host reverse proxy.
//!
//! Terminates TLS, picks a backend by `Host` and bridges REST, HTTP/2 stream
//! and WebSocket traffic to it, with CORS, path remapping and an async
//! validation gate in front of every forward.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server ──▶ security::gate ──▶ http::{rest,stream,websocket} ──▶ Backend
//!                    │                  │                                     │
//!                    ▼                  ▼                                     ▼
//!                net::tls       routing (host match)               http::response (cache, CORS)
//!
//!     config: defaults < file < env < programmatic ──▶ ProxyConfig (read-only after startup)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vhost_proxy::config::{RouteConfig, ServerConfig};
//!
//! # async fn run() -> Result<(), vhost_proxy::ProxyError> {
//! let config = ServerConfig::default()
//!     .route("api.example.com", RouteConfig::new("127.0.0.1:3000"))
//!     .ports(vec![8080]);
//!
//! let mut proxy = vhost_proxy::create_proxy(config).await?;
//! vhost_proxy::lifecycle::signals::shutdown_signal().await;
//! proxy.stop().await;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::{ConfigValue, ProxyConfig, RouteConfig, ServerConfig};
pub use error::{BridgeError, CertificateError, ConfigError, ListenerError, ProxyError};
pub use http::{Handlers, ProxyServer};
pub use lifecycle::{create_custom_proxy, create_proxy};
pub use security::{ConnectionInfo, ForwardValidationResult, RequestType, Validator};
