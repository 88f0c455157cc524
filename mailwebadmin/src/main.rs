use anyhow::Context;
use clap::Parser;
use mailwebadmin::admin::{CleanupPolicy, TokioJobQueue};
use mailwebadmin::api::{ApiServer, AppState};
use mailwebadmin::config::{Config, LoggingConfig};
use mailwebadmin::security::{keys, AdminUsers, SessionController};
use mailwebadmin::storage::{self, MailDb};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mailwebadmin")]
#[command(about = "Web administration for a virtual mail server", long_about = None)]
struct Cli {
    /// Directory containing mailconf and the keys file
    #[arg(short, long, default_value = "config")]
    config: PathBuf,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    init_logging(&config.logging);

    info!("Starting mailwebadmin v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", config.listen_addr());
    info!("  Mail directories: {}", config.maildir);
    info!("  Delete directories: {}", config.delete);
    match &config.backup {
        Some(dir) => info!("  Backup directory: {}", dir.display()),
        None if config.delete => warn!("Directories of deleted domains and users are removed without backup"),
        None => {}
    }

    let pairs = keys::read_or_create_keys(&config.keys_path())
        .with_context(|| format!("Failed to read keys from {}", config.keys_path().display()))?;
    let key = keys::active_cookie_key(&pairs)?;

    let pool = storage::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    let mail = MailDb::new(pool.clone());
    let admins = AdminUsers::new(pool.clone());
    let sessions = SessionController::new(pool, config.session_lifespan);
    mail.init().await.context("Failed to create mail tables")?;
    admins.init().await.context("Failed to create admin table")?;
    sessions.init().await.context("Failed to create session table")?;

    let cleanup = Arc::new(TokioJobQueue::new(CleanupPolicy {
        maildir: config.maildir.clone(),
        backup: config.backup.clone(),
    }));

    let state = AppState::new(mail, admins, sessions, cleanup, config.delete, key);
    let server = ApiServer::new(
        state,
        config.static_dir.clone(),
        config.listen_addr(),
        config.invalid_keys_interval,
    );

    server.run(shutdown_signal()).await?;
    Ok(())
}
