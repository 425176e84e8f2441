use std::path::PathBuf;

use clap::Parser;

use vhost_proxy::config::{load_config_from, ConfigValue};
use vhost_proxy::http::{Handlers, ProxyServer};
use vhost_proxy::lifecycle::signals::shutdown_signal;
use vhost_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "vhost-proxy")]
#[command(about = "TLS-terminating virtual-host reverse proxy", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML). Overrides PROXY_CONFIG.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `vhost_proxy=debug`. RUST_LOG takes precedence.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    tracing::info!("vhost-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.map(|p| p.to_string_lossy().into_owned());
    let env = |name: &str| match (name, &config_path) {
        ("PROXY_CONFIG", Some(path)) => Some(path.clone()),
        _ => std::env::var(name).ok(),
    };

    let config = load_config_from(env, ConfigValue::object()).await?;
    let mut server = ProxyServer::new(config, Handlers::new())?;
    server.start().await?;

    for addr in server.local_addrs() {
        tracing::info!(address = %addr, "Listening for connections");
    }

    shutdown_signal().await;
    server.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
