//! Scoped handle for a connection borrowed from the pool.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::Connector;
use crate::pool::Shared;
use crate::resource::Resource;

/// A connection borrowed from a [`Pool`](crate::Pool).
///
/// Dereferences to the underlying connection. When the handle goes out of
/// scope the connection goes back to the pool's idle set; it is not closed.
pub struct PooledConnection<C: Connector> {
    /// Taken exactly once, on release or discard
    resource: Option<Resource<C::Connection>>,

    /// State of the pool this connection belongs to
    shared: Arc<Shared<C>>,

    /// When this connection was acquired
    acquired_at: Instant,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(resource: Resource<C::Connection>, shared: Arc<Shared<C>>) -> Self {
        Self {
            resource: Some(resource),
            shared,
            acquired_at: Instant::now(),
        }
    }

    fn resource(&self) -> &Resource<C::Connection> {
        self.resource.as_ref().expect("connection already released")
    }

    /// Identity of the underlying connection, stable across loans
    pub fn id(&self) -> u64 {
        self.resource().id()
    }

    /// Time since this handle was acquired
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// When the connection last entered the idle set, before this loan
    pub fn idle_since(&self) -> Instant {
        self.resource().idle_since()
    }

    /// When the underlying connection was opened
    pub fn connected_at(&self) -> Instant {
        self.resource().created_at()
    }

    /// Return the connection to the pool now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }

    /// Close the connection instead of returning it, e.g. after the session
    /// reported an unrecoverable error
    pub fn discard(mut self) {
        if let Some(resource) = self.resource.take() {
            self.shared.discard(resource);
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.resource().conn()
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource
            .as_mut()
            .expect("connection already released")
            .conn_mut()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.shared.release(resource);
        }
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "PooledConnection({})", resource.id()),
            None => write!(f, "PooledConnection(released)"),
        }
    }
}
