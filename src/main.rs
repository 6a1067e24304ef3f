//! `muxd`: serve static routes through a `muxkit` mux.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ axum serve ──▶ request id / trace / timeout layers
//!                                          │
//!                                          ▼
//!                               start stamp + in-flight hold
//!                                          │
//!                                          ▼
//!                                  Mux (prepare → match → dispatch)
//!                                          │
//!                         exact ─┬─ longest prefix ─┬─ not found
//!                                ▼                  ▼
//!                         static route handler    404
//! ```
//!
//! Configuration comes from a TOML file (see `config::schema`). Fatal errors
//! map to process exit codes: 78 for configuration problems, 69 when the
//! listener cannot be bound, 1 otherwise.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use muxkit::config::{load_config, ServerConfig};
use muxkit::errors::{exit_code_of, ExitCodeError};
use muxkit::http::HttpServer;
use muxkit::lifecycle::{signals, Shutdown};
use muxkit::observability;

const EX_UNAVAILABLE: u8 = 69;
const EX_CONFIG: u8 = 78;

#[derive(Parser)]
#[command(name = "muxd")]
#[command(about = "Serve static routes through a path-prefix mux", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code_of(e.as_ref(), 1);
            tracing::error!(error = %e, exit_code = code, "muxd failed");
            eprintln!("muxd: {e}");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).map_err(|e| ExitCodeError::new(EX_CONFIG, e))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    observability::logging::init(&config.observability)?;
    tracing::info!("muxd v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e| ExitCodeError::new(EX_CONFIG, e))?;
        observability::metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|e| ExitCodeError::new(EX_UNAVAILABLE, e))?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config).map_err(|e| ExitCodeError::new(EX_CONFIG, e))?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
