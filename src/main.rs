//! Forward HTTP proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                    FORWARD PROXY                     │
//!                       │                                                      │
//!   Client connection   │  ┌──────────┐    ┌────────────┐    ┌─────────────┐   │
//!   ────────────────────┼─▶│   net    │───▶│ dispatcher │───▶│  classifier │   │
//!                       │  │ listener │    └────────────┘    └──────┬──────┘   │
//!                       │  └──────────┘                             │          │
//!                       │          ┌──────────────┬─────────────────┤          │
//!                       │          ▼              ▼                 ▼          │
//!                       │    ┌──────────┐   ┌────────────┐   ┌─────────────┐   │
//!   ◀───────────────────┼────│  local   │   │ HTTP relay │   │tunnel relay │   │
//!      404 / 400        │    │responder │   └─────┬──────┘   └──────┬──────┘   │
//!                       │    └──────────┘         └────────┬────────┘          │
//!                       │                                  ▼                   │
//!                       │                          ┌──────────────┐            │  Upstream
//!                       │                          │   upstream   │◀───────────┼──▶ server
//!                       │                          │  connector   │            │
//!                       │                          └──────────────┘            │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use forward_proxy::lifecycle::{signals, startup, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::ProxyServer;

#[derive(Parser, Debug)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP proxy with CONNECT tunnelling", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides listener.bind_address
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> startup::Overrides {
        startup::Overrides {
            bind_address: self.listen.clone(),
            log_level: self
                .log_level
                .clone()
                .or_else(|| self.verbose.then(|| "debug".to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = startup::build_config(args.config.as_deref(), &args.overrides())?;

    logging::init_logging(&config.observability)?;

    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        log_level = %config.observability.log_level,
        connect_timeout_secs = ?config.upstream.connect_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.listener.bind_address, error = %e, "Unable to listen");
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    let server = ProxyServer::new(&config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::wait_for_signal().await;
    shutdown.trigger();
    server_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
