//! scalar-proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request          ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ http server ─▶ policy check ─▶ forwarder ──┼──▶ Upstream
//!                             │   (CORS, id)     (up front)      │           │
//!                             │                                  ▼           │
//!                             │                          safe dialer         │
//!                             │                     (fresh lookup per dial)  │
//!                             │                                  │           │
//!                             │                       redirect validator     │
//!     Client Response         │                        (every hop)           │
//!     ◀───────────────────────┼──────────── streamed body ◀──────┘           │
//!                             └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use scalar_proxy::config::load_startup_config;
use scalar_proxy::lifecycle::signals::spawn_signal_listener;
use scalar_proxy::observability::{logging, metrics};
use scalar_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "scalar-proxy", version, about = "SSRF-hardened HTTP forwarding proxy")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration and PORT.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_startup_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind.to_string();
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("scalar-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        bypass = config.policy.bypass,
        extra_blocked_ranges = config.policy.extra_blocked_cidrs.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            server
                .run_tls(bind_address.parse()?, &tls, shutdown.subscribe())
                .await?
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "🥤 Proxy listening");
            server.run(listener, shutdown.subscribe()).await?
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
