//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the server with default or caller-supplied handlers
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is returned to the caller
//! - Listeners start last (traffic only when ready)

use crate::config::{load_config, ConfigValue};
use crate::error::ProxyError;
use crate::http::{Handlers, ProxyServer};

/// Load configuration (defaults < file < env < `programmatic`) and start the
/// built-in bridges on every configured port.
pub async fn create_proxy(programmatic: impl Into<ConfigValue>) -> Result<ProxyServer, ProxyError> {
    create_custom_proxy(programmatic, Handlers::new()).await
}

/// Same as [`create_proxy`], with any of the REST, Stream and WebSocket
/// handlers replaced. Listener management and the validation gate are kept.
pub async fn create_custom_proxy(
    programmatic: impl Into<ConfigValue>,
    handlers: Handlers,
) -> Result<ProxyServer, ProxyError> {
    let config = load_config(programmatic).await?;
    let mut server = ProxyServer::new(config, handlers)?;
    server.start().await?;
    Ok(server)
}
