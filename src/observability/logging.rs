//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the filter passed in
//! - The library never installs a subscriber itself

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a CLI filter is given.
pub const DEFAULT_FILTER: &str = "vhost_proxy=info,tower_http=info";

/// Install a global fmt subscriber. Fails if one is already installed.
pub fn init_logging(filter: Option<&str>) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
