//! # rf-config
//!
//! Layered settings: compiled defaults, then an optional `forum.toml`, then
//! `FORUM__*` environment variables (`FORUM__STORAGE__BACKEND=memory`).
//! A `.env` file, when present, is loaded into the environment first.

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

/// Legacy switch from the first deployment; `true` forces the memory backend.
pub const LEGACY_MOCK_DB_VAR: &str = "USE_MOCK_DB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Which `PostStore` implementation the process runs on.
/// Chosen once at startup; the two backends share no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads `.env`, then builds the layered configuration.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(
            Some("forum"),
            Environment::with_prefix("FORUM").separator("__").try_parsing(true),
            std::env::var(LEGACY_MOCK_DB_VAR).ok().as_deref(),
        )
    }

    /// Defaults for tests and embedding: transient storage, info logging.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageSettings {
                backend: StorageBackend::Memory,
                database_url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            log: LogSettings {
                filter: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }

    fn from_sources(
        file_stem: Option<&str>,
        env: Environment,
        legacy_mock_db: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("storage.backend", "sqlite")?
            .set_default("storage.database_url", "sqlite://rusty_forum.db?mode=rwc")?
            .set_default("storage.max_connections", 5)?
            .set_default("log.filter", "info")?
            .set_default("log.format", "pretty")?;
        if let Some(stem) = file_stem {
            builder = builder.add_source(File::with_name(stem).required(false));
        }
        let mut settings: Settings = builder.add_source(env).build()?.try_deserialize()?;

        if legacy_mock_db.is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            tracing::warn!("{LEGACY_MOCK_DB_VAR}=true: forcing the memory backend");
            settings.storage.backend = StorageBackend::Memory;
        }
        Ok(settings)
    }
}
