use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::oracle::OracleConfig;
use crate::swap::SwapSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub swap: SwapSettings,
    pub oracle: OracleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(format!("config/{}.yaml", env))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.swap.default_currency.trim().is_empty() {
            return Err(ConfigError::Invalid("swap.default_currency is empty".into()));
        }
        if !self.oracle.supports(&self.swap.default_currency) {
            return Err(ConfigError::Invalid(format!(
                "swap.default_currency {} is not in oracle.supported_currencies",
                self.swap.default_currency
            )));
        }
        if self.oracle.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("oracle.base_url is empty".into()));
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::Invalid("oracle.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
