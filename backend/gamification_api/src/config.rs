//! Application configuration loaded from environment variables.

use gamification_engine::storage::STORAGE_KEY;
use gamification_engine::EngineConfig;

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Key the customer snapshot is stored under
    pub storage_key: String,
    /// Optional JSON file overriding engine tunables
    pub engine_config_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./gamification.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            storage_key: env_var("STORAGE_KEY").unwrap_or_else(|_| STORAGE_KEY.to_string()),
            engine_config_path: env_var("ENGINE_CONFIG_PATH").ok(),
        })
    }

    /// Engine tunables: the JSON file if configured, stock values otherwise.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        match &self.engine_config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(EngineConfig::from_json(&raw)?)
            }
            None => Ok(EngineConfig::default()),
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}
