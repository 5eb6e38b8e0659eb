//! Concord - Stellar escrow ledger synchronizer.
//!
//! # Usage
//!
//! ```bash
//! # Start the sync daemon with default config
//! concord run
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/concord \
//! SOROBAN_RPC_URL=https://soroban-testnet.stellar.org \
//! CONTRACT_ID=C... concord run
//!
//! # Reconcile a range of escrows against the ledger
//! concord check --from-id 1 --to-id 50
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use concord_core::metrics::init_metrics;
use concord_core::models::CheckRequest;
use concord_core::services::{PollConfig, PollSupervisor, ReconcileConfig, ReconciliationEngine};
use concord_soroban::{SorobanClient, SorobanClientConfig};
use concord_storage::{Database, DatabaseConfig, PgRepositories};

/// Concord CLI - Stellar escrow ledger synchronizer.
#[derive(Parser, Debug)]
#[command(name = "concord")]
#[command(about = "Concord - Stellar escrow ledger synchronizer")]
#[command(version)]
struct Cli {
    /// Soroban RPC HTTP URL.
    #[arg(
        long,
        env = "SOROBAN_RPC_URL",
        default_value = "http://127.0.0.1:8000/soroban/rpc",
        global = true
    )]
    rpc_url: String,

    /// Escrow contract id (C-address).
    #[arg(long, env = "CONTRACT_ID", default_value = "", global = true)]
    contract_id: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/concord",
        global = true
    )]
    database_url: String,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS", global = true)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync daemon.
    Run {
        /// Prometheus metrics port.
        #[arg(long, env = "METRICS_PORT", default_value = "9090")]
        metrics_port: u16,

        /// Poll interval in seconds.
        #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "5")]
        poll_interval_secs: u64,

        /// First ledger to sync when the database holds no cursor yet.
        #[arg(long, env = "START_LEDGER", default_value = "0")]
        start_ledger: u64,

        /// Run database migrations and exit.
        #[arg(long)]
        migrate_only: bool,

        /// Purge all synced data from the database and exit.
        ///
        /// This deletes all recorded events and escrow projections and
        /// resets the sync cursor. Schema/migrations are preserved.
        #[arg(long)]
        purge: bool,

        /// Skip confirmation prompt for destructive operations (like --purge).
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Reconcile escrows against the ledger and print a JSON report.
    Check {
        /// Comma-separated escrow ids to check.
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["from_id", "to_id"])]
        ids: Vec<u64>,

        /// First escrow id of an inclusive range.
        #[arg(long, requires = "to_id")]
        from_id: Option<u64>,

        /// Last escrow id of an inclusive range.
        #[arg(long, requires = "from_id")]
        to_id: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Command::Run {
            metrics_port,
            poll_interval_secs,
            start_ledger,
            migrate_only,
            purge,
            yes,
        } => {
            run_daemon(
                &cli.rpc_url,
                &cli.contract_id,
                &cli.database_url,
                metrics_port,
                poll_interval_secs,
                start_ledger,
                migrate_only,
                purge,
                yes,
            )
            .await
        }
        Command::Check { ids, from_id, to_id } => {
            run_check(&cli.rpc_url, &cli.contract_id, &cli.database_url, ids, from_id, to_id).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_daemon(
    rpc_url: &str,
    contract_id: &str,
    database_url: &str,
    metrics_port: u16,
    poll_interval_secs: u64,
    start_ledger: u64,
    migrate_only: bool,
    purge: bool,
    yes: bool,
) -> Result<()> {
    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{metrics_port}").parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => match PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            Ok(()) => {
                init_metrics();
                true
            }
            Err(e) => {
                warn!(
                    "⚠️  Failed to start metrics exporter: {}. Continuing without metrics.",
                    e
                );
                false
            }
        },
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Concord synchronizer");
    debug!(rpc_url = %rpc_url, "Soroban endpoint");
    debug!(database_url = %mask_password(database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db_config = DatabaseConfig::for_url(database_url);
    let db = Arc::new(
        Database::connect(&db_config)
            .await
            .context("Failed to connect to database")?,
    );

    db.migrate().await.context("Failed to run migrations")?;

    if migrate_only {
        info!("✅ Migrations applied, exiting (--migrate-only)");
        db.close().await;
        return Ok(());
    }

    if purge {
        handle_purge(&db, yes).await?;
        db.close().await;
        return Ok(());
    }

    require_contract_id(contract_id)?;

    // ─────────────────────────────────────────────────────────────────────────
    // ⛓️ LEDGER
    // ─────────────────────────────────────────────────────────────────────────
    let client = SorobanClient::new(SorobanClientConfig {
        rpc_url: rpc_url.to_string(),
        contract_id: contract_id.to_string(),
    })
    .context("Failed to build Soroban client")?;

    let repos = Arc::new(PgRepositories::new(db.clone(), contract_id));

    let config = PollConfig {
        poll_interval: Duration::from_secs(poll_interval_secs),
        start_ledger,
        ..PollConfig::default()
    };
    let supervisor = Arc::new(PollSupervisor::new(config, Arc::new(client), repos));
    supervisor.start();

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Concord ready");
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    supervisor.stop();

    let drained = tokio::time::timeout(Duration::from_secs(30), async {
        while supervisor.status().running {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;

    match drained {
        Ok(()) => debug!("Supervisor stopped"),
        Err(_) => warn!("⚠️  Supervisor shutdown timed out"),
    }

    db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

async fn run_check(
    rpc_url: &str,
    contract_id: &str,
    database_url: &str,
    ids: Vec<u64>,
    from_id: Option<u64>,
    to_id: Option<u64>,
) -> Result<()> {
    require_contract_id(contract_id)?;

    let request = match (ids.is_empty(), from_id, to_id) {
        (false, None, None) => CheckRequest::Ids(ids),
        (true, Some(from_id), Some(to_id)) => CheckRequest::Range { from_id, to_id },
        _ => bail!("Specify either --ids or both --from-id and --to-id"),
    };

    let db_config = DatabaseConfig::for_url(database_url);
    let db = Arc::new(
        Database::connect(&db_config)
            .await
            .context("Failed to connect to database")?,
    );

    let client = SorobanClient::new(SorobanClientConfig {
        rpc_url: rpc_url.to_string(),
        contract_id: contract_id.to_string(),
    })
    .context("Failed to build Soroban client")?;

    let repos = Arc::new(PgRepositories::new(db.clone(), contract_id));
    let engine = ReconciliationEngine::new(ReconcileConfig::default(), Arc::new(client), repos);

    let outcome = engine
        .check(request)
        .await
        .context("Reconciliation failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.summary.total_inconsistent > 0 {
        warn!(
            "⚠️  {} inconsistent escrow(s) detected",
            outcome.summary.total_inconsistent
        );
    }

    db.close().await;
    Ok(())
}

/// Every subcommand targets one contract; clap cannot mark a global arg
/// as required, so it is validated here.
fn require_contract_id(contract_id: &str) -> Result<()> {
    if contract_id.is_empty() {
        bail!("CONTRACT_ID is required (set the env var or pass --contract-id)");
    }
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, skip_confirmation: bool) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete ALL synced data!");
    warn!("   - All recorded ledger events");
    warn!("   - All escrow projections");
    warn!("   - The sync cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");

    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   📣 Events removed: {}", stats.events_removed);
    info!("   📦 Projections removed: {}", stats.projections_removed);
    info!("   The synchronizer will start from the configured start ledger on next run");

    Ok(())
}
