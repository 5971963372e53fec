use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ratekeeper::config::ServiceConfig;
use ratekeeper::http::HttpServer;
use ratekeeper::metrics::AtomicMetrics;
use ratekeeper::ratelimit::RateLimiter;

#[derive(Parser)]
#[command(name = "ratekeeper", version, about = "Distributed rate limiter")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the rate limiter over HTTP until Ctrl+C or SIGTERM
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        addr: Option<std::net::SocketAddr>,
    },
    /// Check that the shared backend is reachable
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ServiceConfig::load(cli.config.as_deref())?;
    info!(redis_url = %config.redis.url, limits = config.limits.len(), "Configuration loaded");

    let limiter = RateLimiter::connect(&config, Arc::new(AtomicMetrics::new()))?;

    match cli.command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or(config.server.http_addr);
            info!("Starting Ratekeeper rate limiting service");

            HttpServer::new(addr, Arc::new(limiter))
                .serve_with_shutdown(shutdown_signal())
                .await?;

            info!("Ratekeeper rate limiting service stopped");
        }
        Command::Ping => {
            limiter.backend().ping().await?;
            println!("PONG");
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed never fires; the other still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
