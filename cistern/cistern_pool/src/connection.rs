//! Contracts between the pool and the database client it manages.
//!
//! The pool never speaks a wire protocol itself. It asks a [`Connector`] to
//! open sessions and hands them out as [`Connection`]s.

use crate::config::PoolConfig;
use crate::error::{ConnectError, StatementError};

/// A live session with the backing database
pub trait Connection: Send + 'static {
    /// Result set returned by [`Connection::query`]
    type Rows;

    /// Run an insert, update or delete and return the number of affected rows
    fn execute(&mut self, statement: &str) -> Result<u64, StatementError>;

    /// Run a select and return its result set
    fn query(&mut self, statement: &str) -> Result<Self::Rows, StatementError>;

    /// Close the session. Called once, when the pool destroys the connection.
    fn close(&mut self) {}
}

/// Opens new connections for the pool
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by this connector
    type Connection: Connection;

    /// Open a new session using the address, credentials and database in `config`
    fn connect(&self, config: &PoolConfig) -> Result<Self::Connection, ConnectError>;
}
