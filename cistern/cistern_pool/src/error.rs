//! Error types for the connection pool.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error returned by the pool's acquire and construction operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// No idle connection became available before the deadline
    #[error("timed out after {0:?} waiting for an idle connection")]
    AcquireTimeout(Duration),

    /// The idle set was empty on a non-blocking acquire
    #[error("no idle connection available")]
    Exhausted,

    /// The pool has been shut down
    #[error("connection pool is shut down")]
    ShutDown,

    /// [`GlobalPool`](crate::GlobalPool) was used before it was initialized
    #[error("connection pool has not been initialized")]
    Uninitialized,

    /// A background thread could not be started
    #[error("failed to spawn pool worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The configuration was rejected
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Error returned by a [`Connector`](crate::Connector) when a connection cannot be opened
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The backend could not be reached
    #[error("backend {address}:{port} unreachable: {reason}")]
    Unreachable {
        /// Backend address
        address: String,
        /// Backend port
        port: u16,
        /// Reason reported by the transport
        reason: String,
    },

    /// The backend refused the supplied credentials or database
    #[error("backend rejected the session: {0}")]
    Rejected(String),

    /// Underlying I/O failure
    #[error("I/O error while connecting: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by statements executed on a pooled connection
#[derive(Error, Debug)]
pub enum StatementError {
    /// The backend reported a failure for the statement
    #[error("statement failed: {0}")]
    Failed(String),

    /// The session was lost while the statement was running
    #[error("connection lost")]
    ConnectionLost,
}

/// Error raised while loading or validating a [`PoolConfig`](crate::PoolConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The TOML document could not be parsed
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A key carried a value of the wrong shape
    #[error("invalid value {value:?} for key `{key}`")]
    InvalidValue {
        /// Offending key
        key: String,
        /// Raw value as written in the file
        value: String,
    },

    /// The values parsed but violate a pool constraint
    #[error("{0}")]
    Invalid(String),
}
