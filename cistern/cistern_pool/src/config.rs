//! Pool configuration.
//!
//! A [`PoolConfig`] is built once, validated, and handed to the pool as an
//! immutable value. It can be loaded from a TOML document or from the older
//! `key=value` line format:
//!
//! ```text
//! # comment lines have no '='
//! ip=127.0.0.1
//! port=3306
//! username=root
//! password=123456
//! dbname=chat
//! initSize=10
//! maxSize=1024
//! maxIdleTime=60
//! connectionTimeout=100
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a connection pool
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Backend host name or IP address
    #[serde(alias = "ip")]
    pub address: String,

    /// Backend port
    pub port: u16,

    /// User name presented to the backend
    pub username: String,

    /// Password presented to the backend
    pub password: String,

    /// Database selected after connecting
    #[serde(alias = "dbname")]
    pub database: String,

    /// Connections opened at startup, and the floor the idle scanner keeps
    #[serde(alias = "initSize", alias = "init_size")]
    pub min_size: usize,

    /// Upper bound on live connections (idle + lent)
    #[serde(alias = "maxSize")]
    pub max_size: usize,

    /// Seconds a connection may sit idle before it can be evicted
    #[serde(alias = "maxIdleTime")]
    pub max_idle_secs: u64,

    /// Milliseconds an acquire waits for an idle connection
    #[serde(alias = "connectionTimeout")]
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            min_size: 10,
            max_size: 1024,
            max_idle_secs: 60,
            acquire_timeout_ms: 100,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("max_idle_secs", &self.max_idle_secs)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

impl PoolConfig {
    /// Load and validate a configuration file.
    ///
    /// Files ending in `.toml` are parsed as TOML; anything else is read as
    /// `key=value` lines.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading pool configuration from {}", path.display());

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config = if is_toml {
            Self::from_toml_str(&text)?
        } else {
            Self::from_legacy_str(&text)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse the `key=value` line format. Missing keys keep their defaults.
    pub fn from_legacy_str(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in text.lines() {
            // No '=' means a comment or a broken line
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "ip" => config.address = value.to_string(),
                "port" => config.port = parse_value(key, value)?,
                "username" => config.username = value.to_string(),
                "password" => config.password = value.to_string(),
                "dbname" => config.database = value.to_string(),
                "initSize" => config.min_size = parse_value(key, value)?,
                "maxSize" => config.max_size = parse_value(key, value)?,
                "maxIdleTime" => config.max_idle_secs = parse_value(key, value)?,
                "connectionTimeout" => config.acquire_timeout_ms = parse_value(key, value)?,
                _ => trace!("Ignoring unknown configuration key `{}`", key),
            }
        }

        Ok(config)
    }

    /// Check the sizing constraints the pool relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid(
                "max_size must be at least 1".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.max_idle_secs == 0 {
            return Err(ConfigError::Invalid(
                "max_idle_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum idle time, also the scanner's wake interval
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    /// Default wait applied by [`Pool::acquire`](crate::Pool::acquire)
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
