//! A pooled connection together with its idle bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::connection::Connection;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A connection owned by the pool, either idle or lent to one caller
pub(crate) struct Resource<T: Connection> {
    /// Process-unique identity
    id: u64,

    /// The underlying session
    conn: T,

    /// When this connection was opened
    created_at: Instant,

    /// When this connection last entered the idle set
    idle_since: Instant,
}

impl<T: Connection> Resource<T> {
    /// Wrap a freshly opened connection
    pub(crate) fn new(conn: T) -> Self {
        let now = Instant::now();
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            conn,
            created_at: now,
            idle_since: now,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn conn(&self) -> &T {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn idle_since(&self) -> Instant {
        self.idle_since
    }

    /// Stamp the moment this connection goes back into the idle set
    pub(crate) fn refresh_idle(&mut self) {
        self.idle_since = Instant::now();
    }

    /// Time spent in the idle set since the last return
    pub(crate) fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }

    /// Whether this connection has sat idle for at least `max_idle_time`
    pub(crate) fn is_idle_timeout(&self, max_idle_time: Duration) -> bool {
        self.idle_for() >= max_idle_time
    }

    /// Close the underlying session and drop it
    pub(crate) fn destroy(mut self) {
        self.conn.close();
    }
}
