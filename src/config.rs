use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default = "default_sweep_config")]
    pub sweep: SweepConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Presence of this section is what binds a key-value store.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeaturesConfig {
    #[serde(default = "default_track_usage")]
    pub track_usage: bool,
    /// Messages per user between two sweeps; unlimited when unset.
    #[serde(default)]
    pub daily_message_limit: Option<u32>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            track_usage: default_track_usage(),
            daily_message_limit: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_cron")]
    pub cron: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8787))
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_track_usage() -> bool {
    true
}

// Midnight UTC, with a leading seconds field.
fn default_sweep_cron() -> String {
    "0 0 0 * * *".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        environment: default_environment(),
    }
}

fn default_sweep_config() -> SweepConfig {
    SweepConfig {
        cron: default_sweep_cron(),
        batch_size: default_batch_size(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse, apply environment overrides, then validate.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `TELEGRAM_BOT_TOKEN` and `RELAY_ENVIRONMENT` win over the file so the
    /// secret can stay out of it.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(env) = lookup("RELAY_ENVIRONMENT").filter(|e| !e.is_empty()) {
            self.server.environment = env;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is empty (set it or TELEGRAM_BOT_TOKEN)");
        }
        if self.sweep.batch_size == 0 {
            anyhow::bail!("sweep.batch_size must be at least 1");
        }
        Ok(())
    }
}
