//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Load certificates → Build handlers → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     stop() → Broadcast → Accept loops exit → stop() returns
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls stop()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, listeners last
//! - Shutdown closes listeners only; in-flight connections finish on their own

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{create_custom_proxy, create_proxy};
