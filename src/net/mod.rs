//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured port
//!     → listener.rs (bind 0.0.0.0, reclaim on conflict, accept loop)
//!     → tls.rs (TLS handshake and ALPN when a certificate bundle is loaded)
//!     → connection.rs (connection id, live-connection count)
//!     → Hand off to http::server::Dispatcher
//! ```
//!
//! # Design Decisions
//! - One listener task per port, all sharing one dispatcher
//! - Port reclaim is opt-in (reclaim.rs)
//! - TLS is decided once for the whole process, not per port

pub mod connection;
pub mod listener;
pub mod reclaim;
pub mod tls;
