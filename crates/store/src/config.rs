//! Store configuration loading.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::in_memory::InMemoryStore;
use crate::postgres::PostgresStore;
use crate::repository::{Store, StoreError};

pub const ENV_BACKEND: &str = "VIDEOSTORE_STORE";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "VIDEOSTORE_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown store backend '{0}' (expected 'memory' or 'postgres')")]
    UnknownBackend(String),

    #[error("DATABASE_URL must be set for the postgres backend")]
    MissingDatabaseUrl,

    #[error("invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty());

        let backend = match lookup(ENV_BACKEND) {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "postgres" | "postgresql" => StoreBackend::Postgres,
                _ => return Err(ConfigError::UnknownBackend(raw)),
            },
            // A configured database implies postgres unless told otherwise.
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };

        let max_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    name: ENV_MAX_CONNECTIONS,
                    value: raw,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let config = Self {
            backend,
            database_url,
            max_connections,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    /// Open the configured store. Postgres schemas are migrated on open.
    pub async fn open(&self) -> Result<Arc<dyn Store>, StoreError> {
        match self.backend {
            StoreBackend::Memory => {
                tracing::info!(backend = "memory", "opening store");
                Ok(Arc::new(InMemoryStore::new()))
            }
            StoreBackend::Postgres => {
                tracing::info!(backend = "postgres", max_connections = self.max_connections, "opening store");
                let store = PostgresStore::connect(self).await?;
                store.migrate().await?;
                Ok(Arc::new(store))
            }
        }
    }
}
