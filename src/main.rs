//! sheet-gist-sync - Mirrors tracked views of a spreadsheet into a GitHub gist
//!
//! This is the main entry point for the sheet-gist-sync application.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use sheet_gist_sync::config::Config;
use sheet_gist_sync::detect::{ChangeDetector, RenderContext};
use sheet_gist_sync::error::{AppError, SyncError};
use sheet_gist_sync::github::{
    DocumentStore, GistFile, GistFiles, GistStore, RateLimitedClient, Visibility,
};
use sheet_gist_sync::logging::init_tracing;
use sheet_gist_sync::notify::{self, Notifier, Readiness};
use sheet_gist_sync::source::CsvExportSource;
use sheet_gist_sync::sync::{GistSync, ManualSyncHandle, SchedulerConfig, SyncScheduler};

/// sheet-gist-sync - Mirrors tracked views of a spreadsheet into a GitHub gist
#[derive(Parser, Debug)]
#[command(name = "sheet-gist-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SHEET_SYNC_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the sheet and publish changes until stopped (default)
    ///
    /// SIGHUP runs an extra tick right away.
    Run,
    /// Run a single sync tick and print the outcome
    Once,
    /// Create a gist from a local file and print its URL
    CreateGist {
        /// File whose content becomes the gist
        file: PathBuf,
        /// Name of the file inside the gist (defaults to the local file name)
        #[arg(long)]
        filename: Option<String>,
        /// Gist description
        #[arg(long)]
        description: Option<String>,
        /// List the gist publicly
        #[arg(long)]
        public: bool,
    },
    /// Replace one file of an existing gist and print its URL
    EditGist {
        /// Gist id
        id: String,
        /// File whose content replaces the gist file
        file: PathBuf,
        /// Name of the file inside the gist (defaults to the local file name)
        #[arg(long)]
        filename: Option<String>,
        /// New gist description
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => once(config).await,
        Command::CreateGist {
            file,
            filename,
            description,
            public,
        } => {
            config.validate_token()?;
            let content = std::fs::read_to_string(&file)?;
            let filename = filename.unwrap_or_else(|| local_file_name(&file));
            let visibility = if public {
                Visibility::Public
            } else {
                Visibility::Secret
            };

            let url = gist_store(&config)?
                .create_document(&content, &filename, description, visibility)
                .await?;
            println!("{}", url);
            Ok(())
        }
        Command::EditGist {
            id,
            file,
            filename,
            description,
        } => {
            config.validate_token()?;
            let content = std::fs::read_to_string(&file)?;
            let filename = filename.unwrap_or_else(|| local_file_name(&file));

            let mut files = GistFiles::new();
            files.insert(filename.clone(), GistFile::new(filename, content));

            let url = gist_store(&config)?
                .update_document(&id, &files, description)
                .await?;
            println!("{}", url);
            Ok(())
        }
    }
}

/// Poll until SIGINT/SIGTERM
async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gist_id = %config.github.gist_id,
        interval_secs = config.scheduler.interval_secs,
        "Starting sheet-gist-sync"
    );

    let notifier = notify::from_config(&config.notify)?;
    let sync = Arc::new(build_sync(&config, notifier.clone())?);

    let readiness = Readiness::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let scheduler = SyncScheduler::new(
        SchedulerConfig::from(&config.scheduler),
        sync,
        readiness.clone(),
        shutdown_rx,
    )
    .with_notifier(notifier);
    let manual = scheduler.manual_sync_handle();
    let status = scheduler.status_handle();
    let handle = tokio::spawn(scheduler.run());
    let hangup = tokio::spawn(sync_on_hangup(manual));

    // The notification sink is set up, ticks may start
    readiness.mark_ready();

    shutdown_signal().await;
    let _ = shutdown_tx.send(());
    handle.await?;
    hangup.abort();

    let status = status.get().await;
    info!(
        ticks = status.ticks,
        last_tick = ?status.last_tick,
        "sheet-gist-sync shutdown complete"
    );
    Ok(())
}

/// Run an extra tick whenever SIGHUP arrives
#[cfg(unix)]
async fn sync_on_hangup(manual: ManualSyncHandle) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            warn!(error = %err, "Failed to install SIGHUP handler, manual sync disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, triggering sync");
        match manual.trigger_sync().await {
            Ok(outcome) => info!(outcome = ?outcome, "Manual sync finished"),
            Err(SyncError::SchedulerStopped) => break,
            Err(err) => warn!(error = %err, "Manual sync failed"),
        }
    }
}

#[cfg(not(unix))]
async fn sync_on_hangup(_manual: ManualSyncHandle) {}

/// Single tick, outcome printed as JSON
async fn once(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let notifier = notify::from_config(&config.notify)?;
    let sync = build_sync(&config, notifier)?;

    let outcome = sync.tick().await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn gist_store(config: &Config) -> Result<GistStore, AppError> {
    let client = RateLimitedClient::new(&config.github, config.rate_limit.clone())?;
    Ok(GistStore::new(Arc::new(client)))
}

fn build_sync(config: &Config, notifier: Arc<dyn Notifier>) -> Result<GistSync, AppError> {
    let source = CsvExportSource::new(&config.source)?;
    let store = gist_store(config)?;
    let detector = ChangeDetector::with_builtin(
        config.detect.signature,
        RenderContext::new(&config.source, config.detect.users.clone()),
    );

    Ok(GistSync::new(
        Arc::new(source),
        Arc::new(store),
        notifier,
        detector,
        config.github.gist_id.clone(),
        Duration::from_secs(config.scheduler.interval_secs),
    )
    .with_fetch_timeout(Duration::from_secs(config.scheduler.fetch_timeout_secs)))
}

fn local_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.txt".to_string())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
