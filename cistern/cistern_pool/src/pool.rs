//! The pool core: idle set, live count and the acquire protocol.
//!
//! All mutable pool state sits behind one lock. Two condition variables hang
//! off it: `need_create` parks the producer thread until a consumer drains the
//! idle set, and `available` parks callers of [`Pool::acquire`] until a
//! connection is returned or produced. Backend calls (connect and close) are
//! never made while the lock is held.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use log::{debug, error, info, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::config::PoolConfig;
use crate::connection::Connector;
use crate::error::PoolError;
use crate::handle::PooledConnection;
use crate::resource::Resource;
use crate::{producer, scanner};

/// State guarded by the pool lock
pub(crate) struct PoolState<C: Connector> {
    /// Idle connections, earliest returned at the front
    pub(crate) idle: VecDeque<Resource<C::Connection>>,

    /// Set by consumers that found or left the idle set empty
    pub(crate) demand: bool,

    /// Whether the pool has been shut down
    pub(crate) shut_down: bool,
}

/// State shared between the pool, its handles and its background threads
pub(crate) struct Shared<C: Connector> {
    pub(crate) config: PoolConfig,

    pub(crate) connector: C,

    pub(crate) state: Mutex<PoolState<C>>,

    /// Idle + lent connections. Only changed while `state` is locked.
    pub(crate) live: AtomicUsize,

    /// Wakes the producer
    pub(crate) need_create: Condvar,

    /// Wakes callers blocked in acquire
    pub(crate) available: Condvar,

    pub(crate) created: AtomicU64,

    pub(crate) closed: AtomicU64,

    pub(crate) timeouts: AtomicU64,
}

impl<C: Connector> Shared<C> {
    fn new(config: PoolConfig, connector: C) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_size),
                demand: false,
                shut_down: false,
            }),
            config,
            connector,
            live: AtomicUsize::new(0),
            need_create: Condvar::new(),
            available: Condvar::new(),
            created: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// Open the initial `min_size` connections. Failures are logged and skipped.
    fn populate(&self) {
        let mut opened = Vec::with_capacity(self.config.min_size);
        for _ in 0..self.config.min_size {
            match self.connector.connect(&self.config) {
                Ok(conn) => opened.push(Resource::new(conn)),
                Err(e) => warn!("Failed to open connection during initialization: {}", e),
            }
        }

        let count = opened.len();
        {
            let mut state = self.state.lock();
            for mut res in opened {
                res.refresh_idle();
                state.idle.push_back(res);
            }
            self.live.fetch_add(count, Ordering::SeqCst);
        }
        self.created.fetch_add(count as u64, Ordering::Relaxed);

        info!(
            "Connection pool for {}:{}/{} started with {} of {} initial connections (max {})",
            self.config.address,
            self.config.port,
            self.config.database,
            count,
            self.config.min_size,
            self.config.max_size
        );
    }

    /// Pop the earliest idle connection and nudge the producer
    fn take_idle(&self, state: &mut PoolState<C>) -> Option<Resource<C::Connection>> {
        let res = state.idle.pop_front()?;
        if state.idle.is_empty() {
            state.demand = true;
        }
        self.need_create.notify_one();
        Some(res)
    }

    /// Put a lent connection back at the tail of the idle set
    pub(crate) fn release(&self, mut res: Resource<C::Connection>) {
        let mut state = self.state.lock();

        if state.shut_down {
            self.live.fetch_sub(1, Ordering::SeqCst);
            drop(state);
            trace!("Pool is shut down, closing returned connection {}", res.id());
            self.destroy(res);
            return;
        }

        trace!("Connection {} returned to the pool", res.id());
        res.refresh_idle();
        state.idle.push_back(res);
        state.demand = false;
        drop(state);

        self.available.notify_one();
    }

    /// Drop a lent connection instead of returning it
    pub(crate) fn discard(&self, res: Resource<C::Connection>) {
        {
            let mut state = self.state.lock();
            self.live.fetch_sub(1, Ordering::SeqCst);
            if !state.shut_down && state.idle.is_empty() {
                state.demand = true;
                self.need_create.notify_one();
            }
        }

        debug!("Discarding connection {} at caller request", res.id());
        self.destroy(res);
    }

    /// Close a connection that has already been removed from the live count
    pub(crate) fn destroy(&self, res: Resource<C::Connection>) {
        res.destroy();
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a pool's occupancy and lifetime counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open (idle + in use)
    pub live: usize,

    /// Connections waiting in the idle set
    pub idle: usize,

    /// Connections lent to callers
    pub in_use: usize,

    /// Configured floor
    pub min_size: usize,

    /// Configured ceiling
    pub max_size: usize,

    /// Connections opened since the pool started
    pub created: u64,

    /// Connections closed since the pool started
    pub closed: u64,

    /// Acquire calls that timed out
    pub timeouts: u64,
}

/// A bounded pool of reusable database connections.
///
/// Construction opens `min_size` connections and starts two background
/// threads: a producer that opens a new connection whenever consumers drain
/// the idle set, and a scanner that closes connections idle for longer than
/// `max_idle_secs` while more than `min_size` are open.
///
/// Dropping the pool shuts it down.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,

    /// Dropping the sender stops the scanner
    shutdown_tx: Mutex<Option<Sender<()>>>,

    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> Pool<C> {
    /// Validate `config`, open the initial connections and start the
    /// background threads.
    pub fn new(config: PoolConfig, connector: C) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config, connector));
        shared.populate();

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let pool = Self {
            shared: Arc::clone(&shared),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(Vec::with_capacity(2)),
        };

        let producer_shared = Arc::clone(&shared);
        let producer = thread::Builder::new()
            .name("cistern-producer".to_string())
            .spawn(move || producer::run(producer_shared))
            .map_err(PoolError::Spawn)?;
        pool.workers.lock().push(producer);

        let scanner_shared = Arc::clone(&shared);
        let scanner = thread::Builder::new()
            .name("cistern-scanner".to_string())
            .spawn(move || scanner::run(scanner_shared, shutdown_rx))
            .map_err(PoolError::Spawn)?;
        pool.workers.lock().push(scanner);

        Ok(pool)
    }

    /// Acquire a connection, waiting up to the configured acquire timeout
    pub fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        self.acquire_timeout(self.shared.config.acquire_timeout())
    }

    /// Acquire a connection, waiting up to `timeout` for one to become idle.
    ///
    /// Fails with [`PoolError::AcquireTimeout`] no earlier than `timeout`
    /// after the call started.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<C>, PoolError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();

        loop {
            if state.shut_down {
                return Err(PoolError::ShutDown);
            }

            if let Some(res) = self.shared.take_idle(&mut state) {
                drop(state);
                trace!("Connection {} acquired", res.id());
                return Ok(PooledConnection::new(res, Arc::clone(&self.shared)));
            }

            // Idle set is empty: ask the producer for more and wait
            state.demand = true;
            self.shared.need_create.notify_one();

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        drop(state);
                        self.shared.timeouts.fetch_add(1, Ordering::Relaxed);
                        warn!("Timed out after {:?} acquiring a connection", timeout);
                        return Err(PoolError::AcquireTimeout(timeout));
                    }
                    self.shared.available.wait_until(&mut state, deadline);
                }
                None => self.shared.available.wait(&mut state),
            }
        }
    }

    /// Take an idle connection if one is available, without blocking
    pub fn try_acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let mut state = self.shared.state.lock();

        if state.shut_down {
            return Err(PoolError::ShutDown);
        }

        match self.shared.take_idle(&mut state) {
            Some(res) => {
                drop(state);
                trace!("Connection {} acquired without waiting", res.id());
                Ok(PooledConnection::new(res, Arc::clone(&self.shared)))
            }
            None => {
                state.demand = true;
                self.shared.need_create.notify_one();
                Err(PoolError::Exhausted)
            }
        }
    }

    /// Stop the background threads and close every idle connection.
    ///
    /// Connections still lent out are closed when their handles are released.
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return;
            }
            info!("Shutting down connection pool...");
            state.shut_down = true;

            let drained: Vec<_> = state.idle.drain(..).collect();
            self.shared.live.fetch_sub(drained.len(), Ordering::SeqCst);
            drained
        };

        self.shared.need_create.notify_all();
        self.shared.available.notify_all();
        self.shutdown_tx.lock().take();

        for res in drained {
            self.shared.destroy(res);
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.join() {
                error!("Pool worker thread panicked during shutdown: {:?}", e);
            }
        }

        info!(
            "Connection pool shutdown complete ({} connections still lent)",
            self.shared.live.load(Ordering::SeqCst)
        );
    }

    /// Whether [`Pool::shutdown`] has run
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// The configuration this pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Current occupancy and lifetime counters
    pub fn stats(&self) -> PoolStats {
        let (idle, live) = {
            let state = self.shared.state.lock();
            (state.idle.len(), self.shared.live.load(Ordering::SeqCst))
        };

        PoolStats {
            live,
            idle,
            in_use: live - idle,
            min_size: self.shared.config.min_size,
            max_size: self.shared.config.max_size,
            created: self.shared.created.load(Ordering::Relaxed),
            closed: self.shared.closed.load(Ordering::Relaxed),
            timeouts: self.shared.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Number of open connections (idle + in use)
    pub fn live_count(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared<C>> {
        &self.shared
    }
}

impl<C: Connector> Drop for Pool<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::error::{ConnectError, StatementError};
    use std::sync::atomic::AtomicBool;

    struct TestConn {
        closed: Arc<AtomicUsize>,
    }

    impl Connection for TestConn {
        type Rows = Vec<String>;

        fn execute(&mut self, _statement: &str) -> Result<u64, StatementError> {
            Ok(1)
        }

        fn query(&mut self, statement: &str) -> Result<Vec<String>, StatementError> {
            Ok(vec![statement.to_string()])
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct TestConnector {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    impl Connector for TestConnector {
        type Connection = TestConn;

        fn connect(&self, config: &PoolConfig) -> Result<TestConn, ConnectError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ConnectError::Unreachable {
                    address: config.address.clone(),
                    port: config.port,
                    reason: "connection refused".to_string(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(TestConn {
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn config(min_size: usize, max_size: usize) -> PoolConfig {
        PoolConfig {
            min_size,
            max_size,
            max_idle_secs: 60,
            acquire_timeout_ms: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_basic() {
        let connector = TestConnector::default();
        let pool = Pool::new(config(2, 5), connector.clone()).unwrap();

        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.idle_count(), 2);

        let handle1 = pool.acquire().unwrap();
        assert_eq!(pool.idle_count(), 1);

        let handle2 = pool.acquire().unwrap();
        assert_ne!(handle1.id(), handle2.id());

        drop(handle1);
        drop(handle2);

        // The producer may have grown the pool after the set was drained
        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert!(stats.live >= 2 && stats.live <= 5);
        assert_eq!(stats.idle, stats.live);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Pool::new(config(3, 2), TestConnector::default());
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[test]
    fn test_initial_connect_failures_are_skipped() {
        let connector = TestConnector::default();
        connector.failing.store(true, Ordering::SeqCst);

        let pool = Pool::new(config(3, 5), connector.clone()).unwrap();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);

        // Nothing can be produced while the backend is down
        let err = pool.acquire_timeout(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));

        // Once it recovers the producer serves the next acquire
        connector.failing.store(false, Ordering::SeqCst);
        let handle = pool.acquire_timeout(Duration::from_secs(2)).unwrap();
        assert!(pool.live_count() >= 1);
        drop(handle);
    }

    #[test]
    fn test_producer_grows_to_max() {
        let connector = TestConnector::default();
        let pool = Pool::new(config(1, 3), connector.clone()).unwrap();

        let h1 = pool.acquire_timeout(Duration::from_secs(1)).unwrap();
        let h2 = pool.acquire_timeout(Duration::from_secs(1)).unwrap();
        let h3 = pool.acquire_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(pool.live_count(), 3);

        let err = pool.acquire_timeout(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));
        assert_eq!(pool.live_count(), 3);
        assert_eq!(connector.opened.load(Ordering::SeqCst), 3);

        drop((h1, h2, h3));
        assert_eq!(pool.idle_count(), 3);
    }

    #[test]
    fn test_release_wakes_waiter() {
        let pool = Arc::new(Pool::new(config(1, 1), TestConnector::default()).unwrap());
        let handle = pool.acquire().unwrap();
        let first_id = handle.id();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire_timeout(Duration::from_secs(2)).map(|h| h.id()))
        };

        thread::sleep(Duration::from_millis(50));
        drop(handle);

        let got = waiter.join().unwrap().unwrap();
        assert_eq!(got, first_id);
    }

    #[test]
    fn test_try_acquire_exhausted() {
        let pool = Pool::new(config(1, 1), TestConnector::default()).unwrap();
        let _handle = pool.try_acquire().unwrap();

        let result = pool.try_acquire();
        assert!(matches!(result, Err(PoolError::Exhausted)));
    }

    #[test]
    fn test_fifo_hand_out() {
        let pool = Pool::new(config(2, 2), TestConnector::default()).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let (a_id, b_id) = (a.id(), b.id());

        // b goes back first, so it is handed out first
        drop(b);
        drop(a);

        assert_eq!(pool.acquire().unwrap().id(), b_id);
        let next = pool.acquire().unwrap();
        assert!(next.id() == a_id || next.id() == b_id);
    }

    #[test]
    fn test_scanner_sweep_respects_floor() {
        let connector = TestConnector::default();
        let mut cfg = config(1, 3);
        cfg.max_idle_secs = 1;
        let pool = Pool::new(cfg, connector.clone()).unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| pool.acquire_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        drop(handles);
        assert_eq!(pool.live_count(), 3);

        // Nothing has been idle long enough yet
        assert_eq!(scanner::sweep(pool.shared()), 0);

        thread::sleep(Duration::from_millis(1100));
        let evicted = scanner::sweep(pool.shared());
        assert!(evicted <= 2);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_shutdown() {
        let connector = TestConnector::default();
        let pool = Pool::new(config(3, 5), connector.clone()).unwrap();

        let handle = pool.acquire().unwrap();
        pool.shutdown();
        assert!(pool.is_shut_down());

        let result = pool.acquire();
        assert!(matches!(result, Err(PoolError::ShutDown)));

        // The lent connection is closed when it comes back
        assert_eq!(pool.live_count(), 1);
        drop(handle);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(
            connector.closed.load(Ordering::SeqCst),
            connector.opened.load(Ordering::SeqCst)
        );

        // Second call is a no-op
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let pool = Arc::new(Pool::new(config(1, 1), TestConnector::default()).unwrap());
        let _held = pool.acquire().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire_timeout(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        pool.shutdown();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(PoolError::ShutDown)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
