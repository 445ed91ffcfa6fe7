//! Connection pool implementation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lease::Lease;
use crate::lifecycle::{ConnectionMetadata, ManageConnection};
use crate::reaper;

/// Number of checkout attempts a single `get` makes before surfacing a
/// connection error.
const MAX_CHECKOUT_ATTEMPTS: usize = 2;

/// A physical connection together with the metadata the pool tracks for it.
pub(crate) struct PooledConn<C> {
    pub(crate) raw: C,
    pub(crate) meta: ConnectionMetadata,
}

/// Mutable pool state, guarded by a single mutex that is never held across
/// an `.await`.
pub(crate) struct Internals<C> {
    /// Idle connections, most recently returned at the back.
    pub(crate) idle: VecDeque<PooledConn<C>>,
    /// Live connections: idle, leased, or being opened.
    pub(crate) num_conns: u32,
    pub(crate) closed: bool,
}

pub(crate) struct Shared<M: ManageConnection> {
    pub(crate) manager: M,
    pub(crate) config: PoolConfig,
    pub(crate) internals: Mutex<Internals<M::Connection>>,
    /// One permit per connection that is leased or being opened.
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) shutdown: CancellationToken,
    next_id: AtomicU64,
    waiting: AtomicUsize,
}

impl<M: ManageConnection> Shared<M> {
    fn new(config: PoolConfig, manager: M) -> Self {
        Self {
            manager,
            semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
            config,
            internals: Mutex::new(Internals {
                idle: VecDeque::new(),
                num_conns: 0,
                closed: false,
            }),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            waiting: AtomicUsize::new(0),
        }
    }

    fn is_lifetime_expired(&self, meta: &ConnectionMetadata) -> bool {
        self.config
            .lifetime_limit()
            .is_some_and(|limit| meta.is_expired(limit))
    }

    /// Open a physical connection for a slot already counted in `num_conns`.
    async fn connect(
        &self,
        reservation: Reservation<'_, M>,
    ) -> Result<PooledConn<M::Connection>, PoolError> {
        let raw = self
            .manager
            .connect()
            .await
            .map_err(|e| PoolError::Connection(Box::new(e)))?;
        reservation.complete();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, "opened new connection");
        Ok(PooledConn {
            raw,
            meta: ConnectionMetadata::new(id),
        })
    }

    /// Open one idle connection if the pool is below its minimum size.
    ///
    /// Returns `Ok(false)` when nothing needed to be (or could be) opened.
    pub(crate) async fn open_idle(&self) -> Result<bool, PoolError> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Ok(false),
        };

        let reservation = {
            let mut internals = self.internals.lock();
            if internals.closed || internals.num_conns >= self.config.min_connections {
                return Ok(false);
            }
            internals.num_conns += 1;
            Reservation::new(self)
        };

        let mut conn = self.connect(reservation).await?;
        conn.meta.mark_checkin();

        let rejected = {
            let mut internals = self.internals.lock();
            if internals.closed {
                internals.num_conns = internals.num_conns.saturating_sub(1);
                Some(conn)
            } else {
                internals.idle.push_back(conn);
                None
            }
        };
        drop(rejected);
        drop(permit);
        Ok(true)
    }

    /// Top the pool back up to `min_connections`.
    pub(crate) async fn replenish(&self) {
        loop {
            match self.open_idle().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to replenish connection pool");
                    break;
                }
            }
        }
    }

    /// Close idle connections that exceeded their idle timeout (while above
    /// `min_connections`) or their maximum lifetime.
    pub(crate) fn reap(&self) {
        let idle_limit = self.config.idle_limit();
        let lifetime_limit = self.config.lifetime_limit();
        if idle_limit.is_none() && lifetime_limit.is_none() {
            return;
        }

        let evicted = {
            let mut guard = self.internals.lock();
            let internals = &mut *guard;
            let mut evicted = Vec::new();
            let mut index = 0;
            while index < internals.idle.len() {
                let meta = &internals.idle[index].meta;
                let expired = lifetime_limit.is_some_and(|limit| meta.is_expired(limit));
                let stale = idle_limit.is_some_and(|limit| meta.is_idle_expired(limit))
                    && internals.num_conns > self.config.min_connections;

                if expired || stale {
                    if let Some(conn) = internals.idle.remove(index) {
                        internals.num_conns = internals.num_conns.saturating_sub(1);
                        evicted.push(conn);
                    }
                } else {
                    index += 1;
                }
            }
            evicted
        };

        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "closed idle connections");
        }
    }

    /// Take back a connection from a lease.
    pub(crate) fn put_back(&self, mut conn: PooledConn<M::Connection>, broken: bool) {
        let broken = broken || self.manager.has_broken(&mut conn.raw);
        let expired = self.is_lifetime_expired(&conn.meta);

        let discarded = {
            let mut internals = self.internals.lock();
            if broken || expired || internals.closed {
                internals.num_conns = internals.num_conns.saturating_sub(1);
                Some(conn)
            } else {
                conn.meta.mark_checkin();
                internals.idle.push_back(conn);
                None
            }
        };

        match discarded {
            Some(conn) if broken => {
                tracing::warn!(id = conn.meta.id, "discarding broken connection");
            }
            Some(conn) => {
                tracing::debug!(id = conn.meta.id, "closing returned connection");
            }
            None => tracing::trace!("returned connection to pool"),
        }
    }

    /// Drop a detached connection from the pool's accounting.
    pub(crate) fn forget(&self) {
        let mut internals = self.internals.lock();
        internals.num_conns = internals.num_conns.saturating_sub(1);
    }

    pub(crate) fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut internals = self.internals.lock();
            if internals.closed {
                return 0;
            }
            internals.closed = true;
            let drained: Vec<_> = internals.idle.drain(..).collect();
            let count = u32::try_from(drained.len()).unwrap_or(u32::MAX);
            internals.num_conns = internals.num_conns.saturating_sub(count);
            drained
        };

        self.semaphore.close();
        self.shutdown.cancel();
        drained.len()
    }
}

/// A connection slot counted in `num_conns` whose connection is still being
/// opened. Un-counts the slot if the open fails or is cancelled.
struct Reservation<'a, M: ManageConnection> {
    shared: &'a Shared<M>,
    armed: bool,
}

impl<'a, M: ManageConnection> Reservation<'a, M> {
    fn new(shared: &'a Shared<M>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl<M: ManageConnection> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            let mut internals = self.shared.internals.lock();
            internals.num_conns = internals.num_conns.saturating_sub(1);
        }
    }
}

/// Counts a caller inside `get` for as long as the guard lives.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

enum Slot<C> {
    Idle(PooledConn<C>),
    Create,
}

/// A bounded pool of connections produced by a [`ManageConnection`].
///
/// The pool keeps at least `min_connections` connections open, never more
/// than `max_connections`, and hands them out as [`Lease`]s. Cloning a pool
/// is cheap and yields another handle to the same connections.
pub struct Pool<M: ManageConnection> {
    shared: Arc<Shared<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Create a pool and pre-warm it with `min_connections` connections.
    ///
    /// Fails if the configuration is invalid or if one of the minimum
    /// connections cannot be opened.
    pub async fn new(config: PoolConfig, manager: M) -> Result<Self, PoolError> {
        config.validate()?;

        let pool = Self {
            shared: Arc::new(Shared::new(config, manager)),
        };

        loop {
            match pool.shared.open_idle().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    pool.shared.close();
                    return Err(e);
                }
            }
        }

        reaper::spawn(&pool.shared);

        tracing::info!(
            min = pool.shared.config.min_connections,
            max = pool.shared.config.max_connections,
            "connection pool created"
        );
        Ok(pool)
    }

    /// Start building a pool.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Get a connection from the pool.
    ///
    /// This will either return an existing idle connection or create a new one
    /// if the pool is not at capacity. If all connections are in use and the
    /// pool is at capacity, this will wait until a connection becomes available
    /// or the configured connection timeout is reached.
    pub async fn get(&self) -> Result<Lease<M>, PoolError> {
        self.acquire(self.shared.config.acquire_timeout()).await
    }

    /// Get a connection from the pool, waiting at most `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Lease<M>, PoolError> {
        self.acquire(Some(timeout)).await
    }

    /// Get an idle connection without waiting and without opening a new one.
    ///
    /// Returns `Ok(None)` when no idle connection is available. No liveness
    /// query is run, only the synchronous broken check.
    pub fn try_get(&self) -> Result<Option<Lease<M>>, PoolError> {
        let permit = match Arc::clone(&self.shared.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Ok(None),
            Err(TryAcquireError::Closed) => return Err(PoolError::PoolClosed),
        };

        let mut discarded = Vec::new();
        let conn = loop {
            let candidate = {
                let mut internals = self.shared.internals.lock();
                if internals.closed {
                    return Err(PoolError::PoolClosed);
                }
                internals.idle.pop_back()
            };
            let Some(mut conn) = candidate else {
                break None;
            };
            if self.shared.manager.has_broken(&mut conn.raw)
                || self.shared.is_lifetime_expired(&conn.meta)
            {
                self.shared.forget();
                discarded.push(conn);
                continue;
            }
            break Some(conn);
        };

        if !discarded.is_empty() {
            tracing::debug!(count = discarded.len(), "discarded unusable idle connections");
        }

        Ok(conn.map(|conn| {
            let mut lease = Lease::new(conn, Arc::clone(&self.shared), permit);
            lease.metadata_mut().mark_checkout();
            lease
        }))
    }

    async fn acquire(&self, timeout: Option<Duration>) -> Result<Lease<M>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let start = Instant::now();
        tracing::trace!("acquiring connection from pool");

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.checkout_with_retry()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(timeout = ?limit, "connection acquisition timed out");
                    Err(PoolError::Timeout(limit))
                }
            },
            None => self.checkout_with_retry().await,
        };

        if let Ok(lease) = &result {
            tracing::trace!(
                id = lease.metadata().id,
                wait = ?start.elapsed(),
                "connection acquired"
            );
        }
        result
    }

    /// Take a permit, counting the caller as waiting only if none is free.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        match Arc::clone(&self.shared.semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let _waiting = WaitingGuard::new(&self.shared.waiting);
        Arc::clone(&self.shared.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::PoolClosed)
    }

    async fn checkout_with_retry(&self) -> Result<Lease<M>, PoolError> {
        let mut attempt = 1;
        let mut fresh = false;
        loop {
            let permit = self.acquire_permit().await?;

            match self.checkout(permit, fresh).await {
                Ok(lease) => return Ok(lease),
                Err(e) if e.is_connection_error() && attempt < MAX_CHECKOUT_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "connection checkout failed, retrying");
                    // A connection that failed its health check is replaced
                    // by a new one, not by another idle connection.
                    fresh = matches!(e, PoolError::UnhealthyConnection(_));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Check out an idle connection, or open one when none is usable.
    ///
    /// With `fresh` set, idle connections are skipped and a new connection is
    /// always opened.
    async fn checkout(
        &self,
        permit: OwnedSemaphorePermit,
        fresh: bool,
    ) -> Result<Lease<M>, PoolError> {
        let (slot, discarded) = {
            let mut guard = self.shared.internals.lock();
            let internals = &mut *guard;
            if internals.closed {
                return Err(PoolError::PoolClosed);
            }

            let mut discarded = Vec::new();
            let slot = if fresh {
                // Close the oldest idle connection if the new one would not fit.
                if internals.num_conns >= self.shared.config.max_connections {
                    if let Some(conn) = internals.idle.pop_front() {
                        internals.num_conns = internals.num_conns.saturating_sub(1);
                        discarded.push(conn);
                    }
                }
                internals.num_conns += 1;
                Slot::Create
            } else {
                loop {
                    match internals.idle.pop_back() {
                        Some(mut conn) => {
                            if self.shared.is_lifetime_expired(&conn.meta)
                                || self.shared.manager.has_broken(&mut conn.raw)
                            {
                                internals.num_conns = internals.num_conns.saturating_sub(1);
                                discarded.push(conn);
                            } else {
                                break Slot::Idle(conn);
                            }
                        }
                        None => {
                            internals.num_conns += 1;
                            break Slot::Create;
                        }
                    }
                }
            };
            (slot, discarded)
        };

        if !discarded.is_empty() {
            tracing::debug!(count = discarded.len(), "closed unusable idle connections");
            drop(discarded);
        }

        let mut lease = match slot {
            Slot::Idle(conn) => {
                let mut lease = Lease::new(conn, Arc::clone(&self.shared), permit);
                if self.shared.config.test_on_checkout {
                    if let Err(e) = self.shared.manager.is_valid(&mut *lease).await {
                        tracing::warn!(
                            id = lease.metadata().id,
                            error = %e,
                            "connection failed health check on checkout"
                        );
                        lease.mark_broken();
                        return Err(PoolError::UnhealthyConnection(Box::new(e)));
                    }
                }
                lease
            }
            Slot::Create => {
                let reservation = Reservation::new(&self.shared);
                let conn = self.shared.connect(reservation).await?;
                Lease::new(conn, Arc::clone(&self.shared), permit)
            }
        };

        lease.metadata_mut().mark_checkout();
        Ok(lease)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let internals = self.shared.internals.lock();
        let available = u32::try_from(internals.idle.len()).unwrap_or(u32::MAX);
        PoolStatus {
            available,
            in_use: internals.num_conns.saturating_sub(available),
            total: internals.num_conns,
            max: self.shared.config.max_connections,
            waiting: u32::try_from(self.shared.waiting.load(Ordering::Relaxed))
                .unwrap_or(u32::MAX),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed immediately, callers waiting in
    /// [`get`](Self::get) fail with [`PoolError::PoolClosed`], and leased
    /// connections are closed as they are released.
    pub async fn close(&self) {
        let closed = self.shared.close();
        tracing::info!(closed, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.internals.lock().closed
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the connection manager.
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::sync::Weak<Shared<M>> {
        Arc::downgrade(&self.shared)
    }
}

/// Builder for [`Pool`].
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .max_connections(5)
///     .build(manager)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a builder with the default pool configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    /// Enable or disable testing connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.config.test_on_checkout = enabled;
        self
    }

    /// Set the reaper interval.
    #[must_use]
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    /// Allow the pool to be dropped once all handles are gone.
    #[must_use]
    pub fn exit_on_idle(mut self, enabled: bool) -> Self {
        self.config.exit_on_idle = enabled;
        self
    }

    /// Build the pool, pre-warming `min_connections` connections.
    pub async fn build<M: ManageConnection>(self, manager: M) -> Result<Pool<M>, PoolError> {
        Pool::new(self.config, manager).await
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently leased or being opened.
    pub in_use: u32,
    /// Total number of live connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Number of callers blocked waiting for a connection slot.
    pub waiting: u32,
}
