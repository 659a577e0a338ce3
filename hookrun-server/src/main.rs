//! Hookrun Server
//!
//! Webhook-triggered pipeline runner.
//!
//! Architecture:
//! - Configuration: YAML snapshot loaded once at startup
//! - Keys: one deploy keypair per pipeline, provisioned before registration
//! - API: one authenticated trigger endpoint per pipeline
//! - Workers: fixed pool draining a bounded work queue
//! - Notifier: single consumer turning progress messages into commands
//!
//! A trigger only ever learns whether its task was accepted. Execution
//! progress is reported through the notifier and the log.

mod api;
mod config;
mod keys;
mod notifier;
mod process;
mod task;
mod worker;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookrun_core::TokenSigner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::keys::KeyStore;
use crate::process::{CommandRunner, ProcessRunner};
use crate::task::{ExecutorSettings, TaskExecutor};
use crate::worker::{WorkQueue, WorkerPool};

#[derive(Parser)]
#[command(name = "hookrun")]
#[command(about = "Webhook-triggered pipeline runner", long_about = None)]
struct Cli {
    /// Path to the pipelines configuration file
    #[arg(long, short, env = "HOOKRUN_CONFIG", default_value = "pipelines.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve,
    /// Print a trigger token signed with the configured secret and exit
    Jwt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `hookrun jwt` output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookrun=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Jwt => {
            let token = TokenSigner::new(&config.server.jwt_secret)
                .and_then(|signer| signer.sign())
                .context("Failed to generate JWT token")?;
            println!("{}", token);
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting server...");

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);

    let (notifier, _notifier_task) = notifier::spawn(
        config.server.notification_command.clone(),
        Arc::clone(&runner),
        config.server.notification_buffer,
    );

    let keys = Arc::new(KeyStore::new(
        absolute(&config.server.keys_dir)?,
        Arc::clone(&runner),
    ));
    info!("Deploy keys directory: {}", keys.dir().display());

    let (queue, rx) = WorkQueue::bounded(config.work_queue_capacity());
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&runner),
        Arc::clone(&keys),
        notifier,
        ExecutorSettings {
            workspace_root: config.server.workspace_root.clone(),
            known_hosts_file: absolute(&config.server.known_hosts_file)?,
        },
    ));
    let pool = WorkerPool::spawn(config.server.workers, rx, executor);
    info!(
        "Started {} worker(s), queue capacity {}",
        pool.len(),
        queue.capacity()
    );

    let registry = config.registry()?;
    if registry.is_empty() {
        warn!("No pipelines configured, every trigger will be answered with 404");
    }
    let signer = Arc::new(
        TokenSigner::new(&config.server.jwt_secret).context("Failed to initialize token signer")?,
    );
    let app = api::create_router(&registry, &keys, queue, signer)
        .await
        .context("Failed to provision deploy keys")?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on {} with {} pipeline(s)", addr, registry.len());

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// Key and known_hosts paths are handed to child processes running in
/// other directories
fn absolute(path: &std::path::Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}
