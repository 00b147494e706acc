//! Environment-driven configuration selecting the store backend and its
//! connection parameters.

use crate::constants::system;
use crate::error::{Result, StoreError};
use std::str::FromStr;

/// Which backing implementation serves the store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Map-backed, process-local; used by tests and ephemeral clients
    Memory,
    /// Transactional PostgreSQL backend
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            _ => Err(format!("Invalid store backend: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    pub max_connections: u32,
    pub default_page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: "postgresql://localhost/pipestack_development".to_string(),
            max_connections: 10,
            default_page_size: system::DEFAULT_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("PIPESTACK_STORE_BACKEND") {
            config.backend = backend.parse().map_err(StoreError::Validation)?;
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(max_connections) = std::env::var("PIPESTACK_MAX_CONNECTIONS") {
            config.max_connections = max_connections.parse().map_err(|e| {
                StoreError::Validation(format!("Invalid max_connections: {e}"))
            })?;
        }

        if let Ok(page_size) = std::env::var("PIPESTACK_DEFAULT_PAGE_SIZE") {
            config.default_page_size = page_size.parse().map_err(|e| {
                StoreError::Validation(format!("Invalid default_page_size: {e}"))
            })?;
        }

        Ok(config)
    }
}
