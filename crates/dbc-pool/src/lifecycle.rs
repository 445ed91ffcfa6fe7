//! Connection lifecycle management.
//!
//! This module defines the trait the pool uses to open and check physical
//! connections, and the metadata the pool tracks for each of them.

use std::time::Duration;

use tokio::time::Instant;

/// Trait for opening and checking physical connections.
///
/// The pool never talks to the backing store itself. It asks the manager to
/// open connections, to verify that an idle connection is still usable
/// before handing it out, and to report whether a returned connection has
/// broken.
///
/// `#[async_trait]` keeps the futures `Send`, so the pool can drive them from
/// spawned tasks.
#[async_trait::async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    /// The physical connection type.
    type Connection: Send + 'static;

    /// The error produced when opening or checking a connection.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new physical connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Check that an idle connection is alive and responsive.
    ///
    /// Typically executes a lightweight query such as `SELECT 1`.
    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Synchronously check whether the connection has broken.
    ///
    /// This is called when a connection is returned to the pool, so it must
    /// be cheap and must not perform I/O.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool;
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
        }
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Check if the connection has exceeded its maximum lifetime.
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    /// Check if the connection has been idle too long.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.last_used_at.elapsed() > idle_timeout
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }
}
