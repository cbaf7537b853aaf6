//! Marche Server
//!
//! Runs the escrow settlement engine.
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API (default subcommand)
//! marche-server serve --port 8080
//!
//! # One scheduler pass: auto-release, dispute escalation, credit retries.
//! # Meant to be invoked by an external cron.
//! marche-server sweep
//!
//! # Apply database migrations and exit
//! DATABASE_URL=postgres://... marche-server migrate
//!
//! # Environment overrides
//! MARCHE__ESCROW__AUTO_RELEASE_GRACE_DAYS=5 marche-server serve
//! ```

mod config;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marche_api::{create_router, AppState};
use marche_db::Database;
use marche_ledger::{InMemoryLedgerStore, LedgerStore};
use marche_settlement::SettlementService;
use marche_wallet::{HttpWalletService, InMemoryWallet, WalletService};

use crate::config::{LoggingConfig, MetricsConfig, ServerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Marche escrow settlement server
#[derive(Parser, Debug)]
#[command(name = "marche-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "MARCHE_CONFIG", global = true)]
    config: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MARCHE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "MARCHE_LOG_FORMAT", global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, env = "MARCHE_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "MARCHE_PORT")]
        port: Option<u16>,
    },
    /// Run one scheduler pass and exit
    Sweep,
    /// Apply database migrations and exit
    Migrate,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        server_config.database.url = Some(url);
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }

    let command = args.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });
    if let Command::Serve { host, port } = &command {
        if let Some(host) = host {
            server_config.server.host = host.clone();
        }
        if let Some(port) = port {
            server_config.server.port = *port;
        }
    }

    init_logging(&server_config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?command, "Starting Marche server");

    match command {
        Command::Serve { .. } => serve(server_config).await,
        Command::Sweep => sweep(server_config).await,
        Command::Migrate => migrate(server_config).await,
    }
}

// =============================================================================
// Subcommands
// =============================================================================

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let (service, db) = init_settlement(&config).await?;

    if config.metrics.enabled {
        start_metrics_exporter(&config.metrics)?;
    }

    let mut state = AppState::new(Arc::new(service));
    if let Some(db) = db {
        state = state.with_database(db);
    }
    let app = create_router(Arc::new(state), &config.api);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(true);
    });

    let timeout = config.server.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            let _ = signalled_rx.wait_for(|signalled| *signalled).await;
            tokio::time::sleep(timeout).await;
        } => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "In-flight requests did not finish before the shutdown timeout"
            );
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn sweep(config: ServerConfig) -> anyhow::Result<()> {
    let (service, _db) = init_settlement(&config).await?;
    let now = Utc::now();

    let released = service.auto_release_due(now).await?;
    let escalated = service.escalate_stale_disputes(now).await?;
    let credits = service.retry_pending_credits().await?;

    tracing::info!(
        released = released.processed,
        release_skipped = released.skipped,
        release_failed = released.failed,
        escalated = escalated.processed,
        credits_delivered = credits.delivered,
        credits_failed = credits.failed,
        credits_rejected = credits.rejected,
        "Sweep complete"
    );

    if released.failed > 0 || credits.failed > 0 || credits.rejected > 0 {
        anyhow::bail!("sweep finished with failures");
    }
    Ok(())
}

async fn migrate(config: ServerConfig) -> anyhow::Result<()> {
    let Some(pool_config) = config.database.pool_config() else {
        anyhow::bail!("no database configured; set DATABASE_URL or database.url");
    };
    let db = Database::connect(&pool_config).await?;
    db.migrate().await?;
    tracing::info!("Migrations applied");
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
    }

    Ok(())
}

/// Wire the settlement service over PostgreSQL or the in-memory ledger
async fn init_settlement(
    config: &ServerConfig,
) -> anyhow::Result<(SettlementService, Option<Arc<Database>>)> {
    let (store, db): (Arc<dyn LedgerStore>, Option<Arc<Database>>) =
        match config.database.pool_config() {
            Some(pool_config) => {
                let db = Database::connect(&pool_config).await?;
                if config.database.run_migrations {
                    db.migrate().await?;
                }
                if !db.health_check().await.postgres {
                    anyhow::bail!("Database health check failed");
                }
                (Arc::new(db.ledger_store()), Some(Arc::new(db)))
            }
            None => {
                tracing::warn!("No database configured, using the in-memory ledger");
                (Arc::new(InMemoryLedgerStore::new()), None)
            }
        };

    let wallet: Arc<dyn WalletService> = match &config.wallet {
        Some(wallet_config) => {
            tracing::info!(base_url = %wallet_config.base_url, "Using HTTP wallet service");
            Arc::new(HttpWalletService::new(wallet_config.clone())?)
        }
        None => {
            tracing::warn!("No wallet configured, credits go to the in-memory wallet");
            Arc::new(InMemoryWallet::new())
        }
    };

    Ok((
        SettlementService::new(store, wallet, config.escrow.clone()),
        db,
    ))
}

/// Install the Prometheus recorder and its scrape listener
fn start_metrics_exporter(config: &MetricsConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port = config.port, "Metrics exporter started");
    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use marche_settlement::SweepReport;

    #[test]
    fn test_cli_defaults_to_serve() {
        let args = Args::parse_from(["marche-server"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_subcommands() {
        let args = Args::parse_from(["marche-server", "serve", "--port", "8080"]);
        assert_eq!(
            args.command,
            Some(Command::Serve {
                host: None,
                port: Some(8080)
            })
        );

        let args = Args::parse_from(["marche-server", "sweep", "--log-format", "json"]);
        assert_eq!(args.command, Some(Command::Sweep));
        assert_eq!(args.log_format.as_deref(), Some("json"));
    }

    #[tokio::test]
    async fn test_in_memory_wiring() {
        let config = ServerConfig::default();
        let (service, db) = init_settlement(&config).await.unwrap();
        assert!(db.is_none());
        let report = service.auto_release_due(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
