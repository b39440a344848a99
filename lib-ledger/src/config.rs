//! Configuration type definitions
//!
//! Contains the database connection settings handed to the pool and the
//! commission policy constants. Configuration is loaded from a TOML file; every
//! field has a default so a partial file (or none at all) is valid.
//!
//! ```toml
//! debug = false
//!
//! [database]
//! url = "sqlite:ledger.db"
//! max_connections = 10
//! acquire_timeout = "30s"
//!
//! [commission]
//! max_chain_depth = 100
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform commission rate used when an account row carries none.
pub const DEFAULT_COMMISSION_RATE: f64 = 0.3;

/// Hard cap on every referrer-chain walk.
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 100;

/// Configuration loading error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level ledger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database: DatabaseConfig,
    pub commission: CommissionConfig,
    /// Emit a debug event for every transaction-log row written.
    pub debug: bool,
}

/// Connection pool settings
///
/// Values are passed to the pool unchanged; sizing policy lives with whoever
/// writes the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database file, or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an operation waits for a pooled connection before failing.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
    /// How long a statement waits on a locked database before failing as busy.
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:ledger.db".to_string(),
            max_connections: 10,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Commission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    /// Rate applied when a referrer's row does not supply one.
    pub default_rate: f64,
    /// Maximum number of referrer hops walked by propagation and registration.
    pub max_chain_depth: u32,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_COMMISSION_RATE,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

impl LedgerConfig {
    /// Configuration for an isolated in-memory database (tests, dry runs).
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let raw = fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&raw)?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded ledger configuration");
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let db = &self.database;
        if db.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if db.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if db.min_connections > db.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }

        let rate = self.commission.default_rate;
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Invalid(format!(
                "commission.default_rate must be within [0, 1], got {}",
                rate
            )));
        }
        if self.commission.max_chain_depth == 0 {
            return Err(ConfigError::Invalid("commission.max_chain_depth must be at least 1".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_deployment() {
        let config = LedgerConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.commission.default_rate, 0.3);
        assert_eq!(config.commission.max_chain_depth, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let raw = r#"
            debug = true

            [database]
            url = "sqlite:/var/lib/ledger/ledger.db"
            acquire_timeout = "5s"
        "#;
        let config: LedgerConfig = toml::from_str(raw).unwrap();
        assert!(config.debug);
        assert_eq!(config.database.url, "sqlite:/var/lib/ledger/ledger.db");
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.commission.max_chain_depth, 100);
    }

    #[test]
    fn test_validation_rejects_bad_rate() {
        let mut config = LedgerConfig::default();
        config.commission.default_rate = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_rejects_inverted_pool_bounds() {
        let mut config = LedgerConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[commission]\nmax_chain_depth = 12").unwrap();
        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.commission.max_chain_depth, 12);

        let missing = LedgerConfig::load(Path::new("/nonexistent/ledger.toml"));
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }
}
