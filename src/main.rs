//! hotgate reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, metrics)
//!                         │
//!                         ▼
//!                     routing::manager ── current RouteTable (ArcSwap)
//!                         │
//!                         ▼
//!                     security::rate_limit (Admitted) ──▶ 429
//!                         │
//!                         ▼
//!                     http::forward ──────────────────────▶ Upstream
//!
//!     config file ─▶ config::watcher (debounce) ─▶ config::reload ─▶ swap
//!     SIGHUP / admin API ───────────────────────▶ config::reload
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use hotgate::config::loader::load_config;
use hotgate::lifecycle::signals;
use hotgate::observability::{logging, metrics};
use hotgate::{Gateway, StartupError};

#[derive(Parser)]
#[command(name = "hotgate", version, about = "Hot-reloading HTTP reverse proxy")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "config/gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "hotgate starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr).map_err(StartupError::from)?;
    }

    let gateway = Gateway::new(&args.config, config);
    signals::spawn_shutdown_listener(gateway.shutdown_handle());
    gateway.run().await?;

    Ok(())
}
