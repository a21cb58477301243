#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Cistern Pool
//!
//! A bounded pool of reusable database connections for thread-based programs.
//!
//! Opening a database session is expensive; this crate keeps a set of open
//! sessions and lends them to concurrent callers:
//!
//! - [`Pool::acquire`] hands out an idle connection, waiting up to the
//!   configured timeout when none is idle
//! - [`PooledConnection`] returns its connection to the pool when dropped
//! - a producer thread opens a new connection whenever callers drain the pool,
//!   up to `max_size`
//! - a scanner thread closes connections idle for longer than
//!   `max_idle_secs`, down to `min_size`
//!
//! The wire protocol is supplied by the caller through the [`Connector`] and
//! [`Connection`] traits.

/// Pool configuration and file loading
pub mod config;

/// Connector and connection contracts
pub mod connection;

/// Error types
pub mod error;

/// Process-wide lazily initialized pool
pub mod global;

/// Scoped connection handle
pub mod handle;

/// The pool core
pub mod pool;

mod producer;
mod resource;
mod scanner;

pub use config::PoolConfig;
pub use connection::{Connection, Connector};
pub use error::{ConfigError, ConnectError, PoolError, StatementError};
pub use global::GlobalPool;
pub use handle::PooledConnection;
pub use pool::{Pool, PoolStats};
