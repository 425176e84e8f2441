//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults < config file (JSON/TOML) < environment < programmatic
//!     → value.rs (tagged tree, recursive merge)
//!     → schema.rs (decode ServerConfig)
//!     → validation.rs (semantic checks)
//!     → loader.rs (load certificate bundle)
//!     → proxy.rs ProxyConfig (immutable)
//!     → shared via Arc to listeners and bridges
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Callables (`remap`, `validate`) can only come from the programmatic layer

pub mod loader;
pub mod proxy;
pub mod schema;
pub mod validation;
pub mod value;

pub use loader::{load_config, load_config_from};
pub use proxy::{ProxyConfig, Target};
pub use schema::{CertificateConfig, CorsOrigin, CorsPolicy, LoadedCertificates, RouteConfig, ServerConfig};
pub use value::ConfigValue;
