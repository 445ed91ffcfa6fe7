//! Leased connections.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::lifecycle::{ConnectionMetadata, ManageConnection};
use crate::pool::{PooledConn, Shared};

/// A connection retrieved from the pool.
///
/// A lease grants exclusive use of one connection. It dereferences to the
/// manager's connection type and is returned to the pool exactly once: by
/// [`release`](Self::release), or automatically when dropped.
///
/// Release takes the lease by value, so releasing twice does not compile:
///
/// ```rust,compile_fail
/// # async fn demo<M: dbc_pool::ManageConnection>(pool: dbc_pool::Pool<M>) {
/// let lease = pool.get().await.unwrap();
/// lease.release();
/// lease.release();
/// # }
/// ```
pub struct Lease<M: ManageConnection> {
    // Returned in `drop` before `_permit` is released, so the connection is
    // idle by the time a waiter obtains the permit.
    conn: Option<PooledConn<M::Connection>>,
    pool: Arc<Shared<M>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> Lease<M> {
    pub(crate) fn new(
        conn: PooledConn<M::Connection>,
        pool: Arc<Shared<M>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            pool,
            broken: false,
            _permit: permit,
        }
    }

    fn pooled(&self) -> &PooledConn<M::Connection> {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("lease accessed after its connection was returned"),
        }
    }

    fn pooled_mut(&mut self) -> &mut PooledConn<M::Connection> {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("lease accessed after its connection was returned"),
        }
    }

    /// Metadata for the leased connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.pooled().meta
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ConnectionMetadata {
        &mut self.pooled_mut().meta
    }

    /// Mark the connection as broken.
    ///
    /// A broken connection is closed instead of being returned to the idle
    /// set when the lease is released.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Set or clear the broken flag.
    pub fn set_broken(&mut self, broken: bool) {
        self.broken = broken;
    }

    /// Check whether the lease has been marked broken.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Return the connection to the pool.
    pub fn release(mut self) {
        self.return_to_pool();
    }

    /// Detach the connection from the pool.
    ///
    /// The pool stops counting the connection and may open a replacement;
    /// the caller becomes responsible for closing it.
    pub fn detach(mut self) -> M::Connection {
        let conn = self.conn.take();
        self.pool.forget();
        match conn {
            Some(conn) => conn.raw,
            None => unreachable!("lease detached after its connection was returned"),
        }
    }

    fn return_to_pool(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn, self.broken);
        }
    }
}

impl<M: ManageConnection> Deref for Lease<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.pooled().raw
    }
}

impl<M: ManageConnection> DerefMut for Lease<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pooled_mut().raw
    }
}

impl<M: ManageConnection> Drop for Lease<M> {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}

impl<M: ManageConnection> fmt::Debug for Lease<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("metadata", &self.conn.as_ref().map(|conn| &conn.meta))
            .field("broken", &self.broken)
            .finish()
    }
}
