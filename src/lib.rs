pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use pipeline::intake::PlainTextExtractor;
use pipeline::poller::start_poller;
use pipeline::processor::FileProcessor;

/// Startup failures. Anything after startup is logged and retried instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load configuration, migrate the store and poll inboxes until Ctrl-C.
pub fn run() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let resolved = Arc::new(config::load_config(&config::config_path())?);
    let registry = &resolved.registry;
    for court in registry.all() {
        tracing::info!(
            court = %court.code,
            enabled = court.enabled,
            digits = %format!("{}-{}", court.rule.min_digits, court.rule.max_digits),
            inbox = %court.directories.input_dir.display(),
            "Court profile loaded"
        );
    }

    // Migrations run here, once; workers open plain connections.
    db::open_database(&resolved.database_path, registry.default_code())?;

    let processor = Arc::new(FileProcessor::new(
        resolved.clone(),
        Box::new(PlainTextExtractor),
    ));
    let poller = start_poller(processor);

    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    signals.block_on(tokio::signal::ctrl_c())?;

    tracing::info!("Shutdown requested, waiting for the current cycle");
    drop(poller);
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
