//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request or upgrade:
//!     → gate.rs (ConnectionInfo → route/global validator)
//!     → Forward, or Reject with code/message/headers
//!
//! Outgoing response:
//!     → cors.rs (route policy, else global policy)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a validator that fails rejects the connection
//! - Nothing is forwarded before the gate decides

pub mod cors;
pub mod gate;

pub use gate::{
    BoxError, ConnectionInfo, ForwardValidationResult, GateDecision, RequestType, Validator,
};
