//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit tracing events with structured fields
//!     (port, host, target, connection_id, error)
//! tower-http TraceLayer opens one span per inbound request
//!     → logging.rs (fmt subscriber + EnvFilter) → stdout
//! ```

pub mod logging;

pub use logging::init_logging;
