//! `signoff` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    start the API server, notification dispatcher and escalation scanner.
//! - `scan`     run a single escalation sweep and exit.
//! - `migrate`  run pending database migrations.
//! - `validate` validate a workflow template JSON file.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use engine::{
    EscalationScanner, MemoryStore, PgStore, SystemClock, WorkflowOrchestrator, WorkflowStore,
    WorkflowTemplate, validate_template,
};
use integrations::LogNotifier;
use queue::NotificationDispatcher;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "signoff", about = "Multi-step HR approval workflow engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server with the dispatcher and scanner.
    Serve {
        /// YAML config file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `database.url`. Without any URL the in-memory store is used.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Run one escalation sweep and print what it did.
    Scan {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow template JSON file.
    Validate {
        /// Path to the template JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind, database_url } => {
            let cfg = Config::load_or_default(config.as_deref())?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let (orchestrator, dispatcher) = build(&cfg, cfg.database_url(database_url)).await?;

            let (stop_tx, stop_rx) = watch::channel(false);
            let dispatcher_task = tokio::spawn(dispatcher.run());

            let scanner = EscalationScanner::new(orchestrator.clone(), cfg.scanner.to_scanner_config());
            let mut scanner_stop = stop_rx.clone();
            let scanner_task = tokio::spawn(scanner.run(async move {
                let _ = scanner_stop.changed().await;
            }));

            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("cannot listen for shutdown signal: {e}");
                }
                let _ = stop_tx.send(true);
            });

            info!("Starting API server on {bind}");
            let mut api_stop = stop_rx;
            api::serve(&bind, api::AppState::new(orchestrator), async move {
                let _ = api_stop.changed().await;
            })
            .await
            .with_context(|| format!("API server on {bind} failed"))?;

            scanner_task.await?;
            let report = dispatcher_task.await?;
            info!(
                "shut down ({} notifications delivered, {} failed)",
                report.delivered, report.failed
            );
        }
        Command::Scan { config, database_url } => {
            let cfg = Config::load_or_default(config.as_deref())?;
            let (orchestrator, dispatcher) = build(&cfg, cfg.database_url(database_url)).await?;
            let dispatcher_task = tokio::spawn(dispatcher.run());

            let scanner = EscalationScanner::new(orchestrator, cfg.scanner.to_scanner_config());
            let report = scanner.sweep().await?;
            drop(scanner);
            dispatcher_task.await?;

            println!(
                "escalated: {}, terminated: {}, deferred: {}, skipped: {}, failed: {}",
                report.escalated, report.terminated, report.deferred, report.skipped, report.failed
            );
        }
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&db::pool::PoolSettings::new(database_url, 2))
                .await
                .context("failed to connect to database")?;
            let known = db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully ({known} known)");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let template: WorkflowTemplate =
                serde_json::from_str(&content).context("invalid template JSON")?;

            match validate_template(&template) {
                Ok(orders) => {
                    println!("Template '{}' is valid. Steps: {orders:?}", template.name);
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Wire the orchestrator to Postgres when a URL is known, memory otherwise.
async fn build(
    cfg: &Config,
    database_url: Option<String>,
) -> anyhow::Result<(Arc<WorkflowOrchestrator>, NotificationDispatcher)> {
    let store: Arc<dyn WorkflowStore> = match database_url {
        Some(url) => {
            let max = cfg.database.as_ref().map_or(10, |d| d.max_connections);
            let pool = db::pool::create_pool(&db::pool::PoolSettings::new(url, max))
                .await
                .context("failed to connect to database")?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("no database configured; using the in-memory store (state is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    let (notifications, dispatcher) = queue::channel(Arc::new(LogNotifier));
    let orchestrator = WorkflowOrchestrator::new(
        store,
        Arc::new(cfg.directory.clone()),
        notifications,
        Arc::new(SystemClock),
        cfg.engine.to_engine_config(),
    );
    Ok((Arc::new(orchestrator), dispatcher))
}
