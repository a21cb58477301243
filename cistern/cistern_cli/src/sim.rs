//! Simulated database backend.
//!
//! Stands in for a real SQL client so the pool can be exercised without a
//! server: opening a session and running a statement each cost a fixed,
//! configurable delay, and every session writes into one shared table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cistern_pool::{ConnectError, Connection, Connector, PoolConfig, StatementError};
use log::trace;
use parking_lot::Mutex;

/// Opens [`SimConnection`]s against an in-process table
#[derive(Clone, Default)]
pub struct SimConnector {
    connect_latency: Duration,
    statement_latency: Duration,
    table: Arc<Mutex<Vec<String>>>,
    sessions_opened: Arc<AtomicU64>,
}

impl SimConnector {
    /// Create a backend with the given per-connect and per-statement cost
    pub fn new(connect_latency: Duration, statement_latency: Duration) -> Self {
        Self {
            connect_latency,
            statement_latency,
            ..Default::default()
        }
    }

    /// Rows written so far by all sessions
    pub fn row_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Sessions opened so far
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }
}

impl Connector for SimConnector {
    type Connection = SimConnection;

    fn connect(&self, config: &PoolConfig) -> Result<SimConnection, ConnectError> {
        if config.address.is_empty() {
            return Err(ConnectError::Unreachable {
                address: config.address.clone(),
                port: config.port,
                reason: "empty address".to_string(),
            });
        }

        if !self.connect_latency.is_zero() {
            thread::sleep(self.connect_latency);
        }

        let session = self.sessions_opened.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(
            "Simulated session {} opened to {}:{}/{} as {}",
            session,
            config.address,
            config.port,
            config.database,
            config.username
        );

        Ok(SimConnection {
            session,
            statement_latency: self.statement_latency,
            table: Arc::clone(&self.table),
            open: true,
        })
    }
}

/// A session with the simulated backend
pub struct SimConnection {
    session: u64,
    statement_latency: Duration,
    table: Arc<Mutex<Vec<String>>>,
    open: bool,
}

impl SimConnection {
    fn run(&self) -> Result<(), StatementError> {
        if !self.open {
            return Err(StatementError::ConnectionLost);
        }
        if !self.statement_latency.is_zero() {
            thread::sleep(self.statement_latency);
        }
        Ok(())
    }
}

impl Connection for SimConnection {
    type Rows = Vec<String>;

    fn execute(&mut self, statement: &str) -> Result<u64, StatementError> {
        self.run()?;

        let lowered = statement.trim_start().to_ascii_lowercase();
        if lowered.starts_with("insert") {
            self.table.lock().push(statement.to_string());
            Ok(1)
        } else if lowered.starts_with("delete") {
            let mut table = self.table.lock();
            let removed = table.len() as u64;
            table.clear();
            Ok(removed)
        } else if lowered.starts_with("update") {
            Ok(0)
        } else {
            Err(StatementError::Failed(format!(
                "unsupported statement: {}",
                statement
            )))
        }
    }

    fn query(&mut self, statement: &str) -> Result<Vec<String>, StatementError> {
        self.run()?;

        if !statement.trim_start().to_ascii_lowercase().starts_with("select") {
            return Err(StatementError::Failed(format!(
                "not a query: {}",
                statement
            )));
        }
        Ok(self.table.lock().clone())
    }

    fn close(&mut self) {
        trace!("Simulated session {} closed", self.session);
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(connector: &SimConnector) -> SimConnection {
        connector.connect(&PoolConfig::default()).unwrap()
    }

    #[test]
    fn test_statements_share_one_table() {
        let connector = SimConnector::default();
        let mut a = connect(&connector);
        let mut b = connect(&connector);

        assert_eq!(a.execute("insert into user values (1)").unwrap(), 1);
        assert_eq!(b.execute("INSERT into user values (2)").unwrap(), 1);
        assert_eq!(a.query("select * from user").unwrap().len(), 2);
        assert_eq!(connector.row_count(), 2);
        assert_eq!(connector.sessions_opened(), 2);

        assert_eq!(b.execute("delete from user").unwrap(), 2);
        assert_eq!(connector.row_count(), 0);
    }

    #[test]
    fn test_unsupported_statements_fail() {
        let connector = SimConnector::default();
        let mut conn = connect(&connector);

        assert!(matches!(
            conn.execute("drop table user"),
            Err(StatementError::Failed(_))
        ));
        assert!(conn.query("insert into user values (1)").is_err());
    }

    #[test]
    fn test_closed_session_rejects_statements() {
        let connector = SimConnector::default();
        let mut conn = connect(&connector);
        conn.close();
        assert!(matches!(
            conn.execute("insert into user values (1)"),
            Err(StatementError::ConnectionLost)
        ));
    }

    #[test]
    fn test_empty_address_is_unreachable() {
        let config = PoolConfig {
            address: String::new(),
            ..Default::default()
        };
        let result = SimConnector::default().connect(&config);
        assert!(matches!(result, Err(ConnectError::Unreachable { .. })));
    }
}
