//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by connection managers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Failed to acquire a connection within the timeout.
    #[error("connection acquisition timeout after {0:?}")]
    Timeout(Duration),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    Connection(#[source] BoxError),

    /// Connection failed its liveness check on checkout.
    #[error("connection health check failed: {0}")]
    UnhealthyConnection(#[source] BoxError),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if this error concerns a physical connection, as opposed to
    /// pool state (timeout, closed) or configuration.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::UnhealthyConnection(_))
    }

    /// Check if retrying the acquisition may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::UnhealthyConnection(_)
        )
    }
}
