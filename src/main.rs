mod bot;
mod config;
mod dispatch;
mod error;
mod platform;
mod scheduler;
mod store;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::{AppState, Settings};
use crate::config::Config;
use crate::platform::telegram::TelegramClient;
use crate::store::{KvStore, SqliteKvStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tg_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Environment: {}", config.server.environment);
    info!("  Telegram API: {}", config.telegram.api_base_url);
    info!("  Usage tracking: {}", config.features.track_usage);
    info!("  Sweep cron: {}", config.sweep.cron);

    let store: Option<Arc<dyn KvStore>> = match &config.storage {
        Some(storage) => {
            let kv = SqliteKvStore::open(&storage.database_path).with_context(|| {
                format!(
                    "Failed to open key-value store at {}",
                    storage.database_path.display()
                )
            })?;
            Some(Arc::new(kv) as Arc<dyn KvStore>)
        }
        None => {
            warn!("No [storage] section: running without a key-value store");
            None
        }
    };

    let telegram =
        TelegramClient::new(&config.telegram).context("Failed to build Telegram client")?;

    // Background tasks
    let mut scheduler = scheduler::tasks::build_scheduler(store.clone(), &config.sweep).await?;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;
    info!("Scheduler started");

    let state = AppState::new(Arc::new(telegram), store, Settings::from_config(&config));
    let app = dispatch::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Relay listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    scheduler
        .shutdown()
        .await
        .context("Failed to shutdown scheduler")?;
    Ok(())
}
