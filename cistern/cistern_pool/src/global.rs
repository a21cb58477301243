//! Process-wide pool, initialized once on first use.
//!
//! ```ignore
//! static POOL: GlobalPool<MysqlConnector> = GlobalPool::new();
//!
//! let pool = POOL.get_or_try_init(|| {
//!     let config = PoolConfig::from_file("mysql.ini")?;
//!     Ok((config, MysqlConnector::default()))
//! })?;
//! let mut conn = pool.acquire()?;
//! conn.execute("insert into user(name) values('zhang san')")?;
//! ```

use log::info;
use once_cell::sync::OnceCell;

use crate::config::PoolConfig;
use crate::connection::Connector;
use crate::error::PoolError;
use crate::handle::PooledConnection;
use crate::pool::Pool;

/// A lazily initialized pool meant to live in a `static`
pub struct GlobalPool<C: Connector> {
    cell: OnceCell<Pool<C>>,
}

impl<C: Connector> GlobalPool<C> {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Return the pool, building it with `init` if this is the first call.
    ///
    /// Concurrent first callers block until one of them finishes; if `init`
    /// or pool construction fails the slot stays empty and a later call may
    /// try again.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<&Pool<C>, PoolError>
    where
        F: FnOnce() -> Result<(PoolConfig, C), PoolError>,
    {
        self.cell.get_or_try_init(|| {
            let (config, connector) = init()?;
            info!("Initializing process-wide connection pool");
            Pool::new(config, connector)
        })
    }

    /// The pool, if it has been initialized
    pub fn get(&self) -> Option<&Pool<C>> {
        self.cell.get()
    }

    /// Acquire from the initialized pool
    pub fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        self.get().ok_or(PoolError::Uninitialized)?.acquire()
    }

    /// Shut the pool down if it was ever initialized. The slot stays filled;
    /// later acquires fail with [`PoolError::ShutDown`].
    pub fn shutdown(&self) {
        if let Some(pool) = self.cell.get() {
            pool.shutdown();
        }
    }
}

impl<C: Connector> Default for GlobalPool<C> {
    fn default() -> Self {
        Self::new()
    }
}
