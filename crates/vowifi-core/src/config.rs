//! Process-wide HTTP connection pool settings
//!
//! The values are read once per process from the environment:
//!
//! | Variable                   | Meaning                          | Default  |
//! |----------------------------|----------------------------------|----------|
//! | `HTTP_KEEP_ALIVE`          | keep idle connections around     | `true`   |
//! | `HTTP_MAX_CONNECTIONS`     | max idle connections per session| `5`      |
//! | `HTTP_KEEP_ALIVE_DURATION` | idle timeout in milliseconds     | `300000` |
//!
//! When keep-alive is disabled the pool holds no idle connections at all.

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use once_cell::sync::Lazy;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Default number of idle connections kept per session pool
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Default idle keep-alive, 5 minutes
pub const DEFAULT_KEEP_ALIVE_DURATION_MS: u64 = 300_000;

const ENV_PREFIX: &str = "HTTP";

static GLOBAL_SETTINGS: Lazy<PoolSettings> = Lazy::new(|| match PoolSettings::load() {
    Ok(settings) => {
        debug!("HTTP pool settings: {:?}", settings);
        settings
    }
    Err(e) => {
        error!("Invalid HTTP pool settings, using defaults: {}", e);
        PoolSettings::default()
    }
});

/// Sizing of the private connection pool each session builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Whether idle connections are kept for reuse
    pub keep_alive: bool,
    /// Max idle connections kept in one session's pool
    pub max_idle_connections: usize,
    /// How long an idle connection may stay in the pool
    pub keep_alive_duration: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_idle_connections: DEFAULT_MAX_CONNECTIONS,
            keep_alive_duration: Duration::from_millis(DEFAULT_KEEP_ALIVE_DURATION_MS),
        }
    }
}

impl PoolSettings {
    /// The settings read at first use and shared by every session in the process
    pub fn global() -> &'static PoolSettings {
        &GLOBAL_SETTINGS
    }

    /// Load settings from `HTTP_*` environment variables
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::from_config(&config)
    }

    /// Build settings from an explicit configuration, using defaults for
    /// missing keys
    pub fn from_config(config: &Config) -> Result<Self> {
        let keep_alive = optional(config.get_bool("keep_alive"))?.unwrap_or(true);

        let max_connections = match optional(config.get_int("max_connections"))? {
            Some(n) if n < 0 => {
                return Err(Error::Config(format!("max_connections must not be negative: {}", n)))
            }
            Some(n) => n as usize,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let duration_ms = match optional(config.get_int("keep_alive_duration"))? {
            Some(ms) if ms < 0 => {
                return Err(Error::Config(format!("keep_alive_duration must not be negative: {}", ms)))
            }
            Some(ms) => ms as u64,
            None => DEFAULT_KEEP_ALIVE_DURATION_MS,
        };

        Ok(Self {
            keep_alive,
            max_idle_connections: if keep_alive { max_connections } else { 0 },
            keep_alive_duration: Duration::from_millis(duration_ms),
        })
    }
}

fn optional<T>(value: std::result::Result<T, ConfigError>) -> Result<Option<T>> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = PoolSettings::from_config(&config_with(&[])).unwrap();
        assert_eq!(settings, PoolSettings::default());
        assert_eq!(settings.max_idle_connections, 5);
        assert_eq!(settings.keep_alive_duration, Duration::from_millis(300_000));
    }

    #[test]
    fn explicit_values() {
        let settings = PoolSettings::from_config(&config_with(&[
            ("max_connections", "8"),
            ("keep_alive_duration", "1500"),
        ]))
        .unwrap();
        assert!(settings.keep_alive);
        assert_eq!(settings.max_idle_connections, 8);
        assert_eq!(settings.keep_alive_duration, Duration::from_millis(1500));
    }

    #[test]
    fn keep_alive_disabled_forces_empty_pool() {
        let settings = PoolSettings::from_config(&config_with(&[
            ("keep_alive", "false"),
            ("max_connections", "8"),
        ]))
        .unwrap();
        assert!(!settings.keep_alive);
        assert_eq!(settings.max_idle_connections, 0);
    }

    #[test]
    fn rejects_garbage() {
        let err = PoolSettings::from_config(&config_with(&[("max_connections", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = PoolSettings::from_config(&config_with(&[("keep_alive_duration", "-1")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
