//! Database configuration loaded from environment variables.
//!
//! ```text
//! CODEMINT_DB_PATH              ./codemint.db
//! CODEMINT_DB_MAX_CONNECTIONS   5
//! CODEMINT_DB_MIN_CONNECTIONS   1
//! CODEMINT_DB_BUSY_TIMEOUT_MS   5000
//! CODEMINT_DB_RUN_MIGRATIONS    true
//! ```
//!
//! Unset variables fall back to the defaults above; set-but-unparsable ones
//! are errors, never silently defaulted.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::DbConfig;

pub const ENV_DB_PATH: &str = "CODEMINT_DB_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "CODEMINT_DB_MAX_CONNECTIONS";
pub const ENV_MIN_CONNECTIONS: &str = "CODEMINT_DB_MIN_CONNECTIONS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CODEMINT_DB_BUSY_TIMEOUT_MS";
pub const ENV_RUN_MIGRATIONS: &str = "CODEMINT_DB_RUN_MIGRATIONS";

const DEFAULT_DB_PATH: &str = "./codemint.db";

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(String),

    #[error("min connections ({min}) exceeds max connections ({max})")]
    PoolBounds { min: u32, max: u32 },
}

impl DbConfig {
    /// Loads configuration from `CODEMINT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let mut config = DbConfig::new(path);

        if let Some(max) = parse::<u32, _>(&lookup, ENV_MAX_CONNECTIONS)? {
            config = config.max_connections(max);
        }
        if let Some(min) = parse::<u32, _>(&lookup, ENV_MIN_CONNECTIONS)? {
            config = config.min_connections(min);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_BUSY_TIMEOUT_MS)? {
            config = config.busy_timeout(Duration::from_millis(ms));
        }
        if let Some(run) = parse::<bool, _>(&lookup, ENV_RUN_MIGRATIONS)? {
            config = config.run_migrations(run);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the pool bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::MustBePositive(ENV_MAX_CONNECTIONS.to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::PoolBounds {
                min: self.min_connections,
                max: self.max_connections,
            });
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path.to_str(), Some(DEFAULT_DB_PATH));
        assert_eq!(config.max_connections, 5);
        assert!(config.run_migrations);
    }

    #[test]
    fn test_overrides() {
        let config = DbConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/var/lib/codemint/codes.db"),
            (ENV_MAX_CONNECTIONS, "8"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_RUN_MIGRATIONS, "false"),
        ]))
        .unwrap();

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let err = DbConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_pool_bounds() {
        let err = DbConfig::from_lookup(lookup(&[
            (ENV_MAX_CONNECTIONS, "2"),
            (ENV_MIN_CONNECTIONS, "4"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::PoolBounds { min: 4, max: 2 }));
    }
}
