//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Host / :authority
//!     → router.rs (exact, port-stripped, wildcard lookup)
//!     → matcher.rs (anchored `*` patterns)
//!     → Return: matched RouteConfig or NoMatch
//!
//! Route Compilation (at startup):
//!     ordered (pattern, RouteConfig) pairs
//!     → Compile wildcard matchers
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First declared wildcard wins

pub mod matcher;
pub mod router;

pub use router::RouteTable;
