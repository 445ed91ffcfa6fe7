//! The explicit database handle.

use std::fmt;
use std::time::Duration;

use dbc_pool::{Lease, ManageConnection, Pool, PoolConfig, PoolStatus};

use crate::config::{Config, ConfigOverrides};
use crate::connection::PgConnectionManager;
use crate::env;
use crate::error::Result;
use crate::query::{Queryable, execute};
use crate::row::QueryResult;
use crate::value::SqlValue;

/// A pooled database.
///
/// Create one at startup and pass it (or clones of it) to the code that
/// needs it. Clones share the same pool.
pub struct Database<M: ManageConnection = PgConnectionManager> {
    pool: Pool<M>,
}

impl Database<PgConnectionManager> {
    /// Open a PostgreSQL database, pre-warming the pool.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let manager = PgConnectionManager::new(&config)?;
        Self::from_manager(config.pool, manager).await
    }
}

impl<M: ManageConnection> Database<M> {
    /// Create a database over an arbitrary connection manager.
    pub async fn from_manager(pool_config: PoolConfig, manager: M) -> Result<Self> {
        let pool = Pool::new(pool_config, manager).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<M>) -> Self {
        Self { pool }
    }

    /// Lease a connection, waiting up to the configured connection timeout.
    pub async fn acquire(&self) -> Result<Lease<M>> {
        Ok(self.pool.get().await?)
    }

    /// Lease a connection, waiting at most `timeout`.
    ///
    /// Fails with [`Error::PoolTimeout`](crate::Error::PoolTimeout) carrying
    /// `timeout` if no connection becomes available in time.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Lease<M>> {
        Ok(self.pool.get_timeout(timeout).await?)
    }

    /// Lease an idle connection if one is available right now.
    pub fn try_acquire(&self) -> Result<Option<Lease<M>>> {
        Ok(self.pool.try_get()?)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Close the pool. Later acquires fail with [`Error::PoolClosed`](crate::Error::PoolClosed).
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    /// Check if the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }
}

impl<M> Database<M>
where
    M: ManageConnection,
    M::Connection: Queryable,
{
    /// Acquire a connection, run one parameterized query and release it.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let lease = self.acquire().await?;
        execute(lease, sql, params).await
    }
}

impl<M: ManageConnection> Clone for Database<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for Database<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("pool", &self.pool).finish()
    }
}

/// Build a PostgreSQL database from the default configuration.
///
/// The connection string defaults to the `dbc_string` environment variable;
/// every field of `overrides` that is set replaces the default.
pub async fn make_pool(overrides: ConfigOverrides) -> Result<Database> {
    let config = env::config_from_env().with_overrides(&overrides);
    Database::connect(config).await
}
