//! suggest-trainer - Suggestion model training service
//!
//! Keeps text fingerprints and per-target suggestion models up to date in the
//! background until interrupted.
//!
//! **Startup:**
//! 1. Resolve and load the TOML config (CLI > ENV > default location)
//! 2. Initialize tracing
//! 3. Open or create the corpus database
//! 4. Load the ontology tree
//! 5. Start the workers; stop them gracefully on Ctrl+C / SIGTERM

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use suggest_common::config::{
    load_toml_config, resolve_config_path, resolve_database_path, resolve_ontology_path,
};
use suggest_common::db::SqliteStore;
use suggest_common::ontology::OntologyTree;
use suggest_trainer::config::MODULE_NAME;
use suggest_trainer::{LexicalTokenizer, TrainerConfig, TrainingService};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for suggest-trainer
#[derive(Parser, Debug)]
#[command(name = "suggest-trainer")]
#[command(about = "Background training service for annotation suggestion models")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite corpus database
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Ontology JSON file
    #[arg(short, long)]
    ontology: Option<PathBuf>,

    /// Log level or filter directive (overrides RUST_LOG and the config file)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let config: TrainerConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.bootstrap.logging.level)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting suggest-trainer");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    let db_path = resolve_database_path(args.database.as_deref(), &config.bootstrap);
    info!("Database: {}", db_path.display());
    let store = SqliteStore::open(&db_path)
        .await
        .context("Failed to open corpus database")?;

    let ontology = match resolve_ontology_path(args.ontology.as_deref(), &config.bootstrap) {
        Some(path) => {
            info!("Ontology: {}", path.display());
            OntologyTree::load(&path)
                .with_context(|| format!("Failed to load ontology {}", path.display()))?
        }
        None => {
            warn!("No ontology configured; only fingerprints will be computed");
            OntologyTree::new()
        }
    };

    let tokenizer = LexicalTokenizer::new().context("Failed to initialize tokenizer")?;

    let service = TrainingService::new(
        Arc::new(store),
        Arc::new(ontology),
        Arc::new(tokenizer),
        &config,
    );
    service.start().await;

    shutdown_signal().await;
    service.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
