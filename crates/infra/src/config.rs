//! Ledger configuration: which accounts each privileged role pools.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fintrack_accounts::PoolConfig;
use fintrack_core::Role;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV_VAR: &str = "FINTRACK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl LedgerConfig {
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Load from the file named by `FINTRACK_CONFIG`; empty config when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path),
            _ => Ok(Self::default()),
        }
    }

    /// At most one pool per role, distinct Primary/Secondary, non-negative cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.role.as_str()) {
                return Err(ConfigError::Invalid(format!("role '{}' has more than one pool", pool.role)));
            }
            if pool.primary_account_id == pool.secondary_account_id {
                return Err(ConfigError::Invalid(format!(
                    "role '{}': primary and secondary must be different accounts",
                    pool.role
                )));
            }
            if pool.secondary_cap.is_negative() {
                return Err(ConfigError::Invalid(format!("role '{}': secondary cap is negative", pool.role)));
            }
        }
        Ok(())
    }

    pub fn pool_for(&self, role: &Role) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| &p.role == role)
    }
}
