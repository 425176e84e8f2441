//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (health path, validation gate, protocol choice)
//!     → request.rs (host, ConnectionInfo, header views)
//!     → rest.rs | stream.rs | websocket.rs (bridge to the route target)
//!     → response.rs (media caching, CORS)
//!     → Send to client
//! ```
//!
//! Every bridge sits behind a trait in handlers.rs so callers can replace it.

pub mod handlers;
pub mod headers;
pub mod request;
pub mod response;
pub mod rest;
pub mod server;
pub mod stream;
pub mod websocket;

pub use handlers::{ClientSocket, HandlerResult, Handlers, RestHandler, StreamHandler, WebSocketHandler};
pub use server::{Dispatcher, ProxyServer};
