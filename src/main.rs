//! Header-Driven HTTP/WebSocket Forwarding Proxy
//!
//! Every inbound request carries its own destination URL in a designated
//! header; the proxy forwards each request to that single upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                FORWARDING PROXY                   │
//!                    │                                                   │
//!  Client Request    │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!  ──────────────────┼─▶│   net   │──▶│  http    │──▶│  outgoing    │   │
//!   (target header)  │  │listener │   │ server   │   │  builder     │   │
//!                    │  └─────────┘   └────┬─────┘   └──────┬───────┘   │
//!                    │                     │                │           │
//!                    │              upgrade│          plain │           │
//!                    │                     ▼                ▼           │
//!  Client Response   │  ┌─────────────────────┐   ┌──────────────┐     │
//!  ◀─────────────────┼──│   raw socket splice │   │ pass pipeline│◀────┼── Upstream
//!                    │  │  (101 + both ways)  │   │ + hyper client│     │   Server
//!                    │  └─────────────────────┘   └──────────────┘     │
//!                    │                                                   │
//!                    │  config · observability · lifecycle               │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::loader::{self, load_config};
use forward_proxy::config::ProxyConfig;
use forward_proxy::http::ProxyServer;
use forward_proxy::lifecycle::signals;
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Header-driven HTTP/WebSocket forwarding proxy", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    loader::apply_env_overrides(&mut config);
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }

    logging::init(&config.observability);

    tracing::info!("forward-proxy v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        target_header = %config.forward.target_header,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(config)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
