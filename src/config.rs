use std::path::Path;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::chat::TimestampFormat;
use crate::sync::SyncPolicy;

/// Display layout matching the `hu-HU` locale string, e.g. `2024. 03. 09. 14:05:07`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y. %m. %d. %H:%M:%S";

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Message store provider (memory, surrealdb, postgres)
    #[arg(long, env = "STORE_PROVIDER")]
    pub store_provider: Option<String>,

    /// Message store connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// How the live view reacts to edits (static, refresh, patch)
    #[arg(long, env = "SYNC_POLICY")]
    pub sync_policy: Option<String>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub display: DisplayConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
}

/// Connection settings for the message store.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub provider: String,
    pub database_url: String,
    pub namespace: String,
    pub database: String,
    pub collection: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            database_url: String::new(),
            namespace: "chat".to_string(),
            database: "chat".to_string(),
            collection: "messages".to_string(),
            username: None,
            password: None,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    pub policy: SyncPolicy,
    pub restamp_on_edit: bool,
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: SyncPolicy::default(),
            restamp_on_edit: true,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    pub timestamp_format: String,
    pub utc_offset_minutes: i32,
}

impl DisplayConfig {
    #[must_use]
    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::new(self.timestamp_format.clone(), self.utc_offset_minutes)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.static_dir", "static")?
            .set_default("store.provider", "memory")?
            .set_default("store.database_url", "")?
            .set_default("store.namespace", "chat")?
            .set_default("store.database", "chat")?
            .set_default("store.collection", "messages")?
            .set_default("store.max_retries", 3)?
            .set_default("store.retry_backoff_ms", 200)?
            .set_default("sync.policy", "refresh")?
            .set_default("sync.restamp_on_edit", true)?
            .set_default("sync.channel_capacity", 256)?
            .set_default("display.timestamp_format", DEFAULT_TIMESTAMP_FORMAT)?
            .set_default("display.utc_offset_minutes", 0)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?;

        // 2. Config file: explicit path, else ./config.yaml when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG_FILE));
        }

        // 3. Environment variables prefixed with CHAT_, e.g. CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and the env vars clap maps onto them) win over everything
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(provider) = cli.store_provider {
            builder = builder.set_override("store.provider", provider)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("store.database_url", url)?;
        }
        if let Some(policy) = cli.sync_policy {
            builder = builder.set_override("sync.policy", policy)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !TimestampFormat::is_valid_pattern(&self.display.timestamp_format) {
            return Err(config::ConfigError::Message(format!(
                "display.timestamp_format: invalid strftime pattern `{}`",
                self.display.timestamp_format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default_is_memory() {
        let store = StoreConfig::default();
        assert_eq!(store.provider, "memory");
        assert_eq!(store.collection, "messages");
    }

    #[test]
    fn test_display_config_builds_formatter() {
        let display = DisplayConfig {
            timestamp_format: "%H:%M".to_string(),
            utc_offset_minutes: 120,
        };
        let date = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:15:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(display.timestamp_format().format(date), "12:15");
    }
}
