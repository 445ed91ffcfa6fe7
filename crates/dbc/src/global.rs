//! Process-wide database instance.
//!
//! [`Registry`] holds at most one [`Database`], created on first use by an
//! initializer. The free functions in this module operate on the
//! process-wide PostgreSQL registry returned by [`global`], whose initializer
//! is [`make_pool`] with no overrides.
//!
//! The registry is a convenience. Prefer creating a [`Database`] at startup
//! and passing it explicitly.

use std::fmt;
use std::future::Future;

use dbc_pool::{Lease, ManageConnection};
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::config::ConfigOverrides;
use crate::connection::PgConnectionManager;
use crate::database::{Database, make_pool};
use crate::error::{Error, Result};
use crate::row::QueryResult;
use crate::value::SqlValue;

type Initializer<M> = Box<dyn Fn() -> BoxFuture<'static, Result<Database<M>>> + Send + Sync>;

struct Slot<M: ManageConnection> {
    db: Option<Database<M>>,
    shut_down: bool,
}

/// A lazily-initialized holder for one [`Database`].
pub struct Registry<M: ManageConnection> {
    slot: Mutex<Slot<M>>,
    init: Initializer<M>,
}

impl<M: ManageConnection> Registry<M> {
    /// Create an empty registry whose instance is built by `init` on first use.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Database<M>>> + Send + 'static,
    {
        Self {
            slot: Mutex::new(Slot {
                db: None,
                shut_down: false,
            }),
            init: Box::new(move || Box::pin(init())),
        }
    }

    /// Get the instance, creating it with the registry's initializer if needed.
    ///
    /// Concurrent first calls wait for a single initialization and observe
    /// the same instance. A failed initialization leaves the registry empty.
    pub async fn get(&self) -> Result<Database<M>> {
        self.get_or_init(|| (self.init)()).await
    }

    /// Get the instance, creating it with `init` if needed.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Database<M>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Database<M>>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(db) = &slot.db {
            return Ok(db.clone());
        }
        if slot.shut_down {
            return Err(Error::PoolClosed);
        }

        let db = init().await?;
        tracing::debug!("process-wide database initialized");
        slot.db = Some(db.clone());
        Ok(db)
    }

    /// Swap in `db`, returning the previous instance without closing it.
    pub async fn replace(&self, db: Database<M>) -> Option<Database<M>> {
        let mut slot = self.slot.lock().await;
        slot.shut_down = false;
        slot.db.replace(db)
    }

    /// Close the held instance.
    ///
    /// The closed instance stays in place, so later acquires through the
    /// registry fail with [`Error::PoolClosed`] rather than opening a new pool.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        slot.shut_down = true;
        if let Some(db) = &slot.db {
            db.shutdown().await;
        }
    }

    /// Check whether an instance has been created or installed.
    pub async fn is_initialized(&self) -> bool {
        self.slot.lock().await.db.is_some()
    }
}

impl<M: ManageConnection> fmt::Debug for Registry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

static GLOBAL: Lazy<Registry<PgConnectionManager>> =
    Lazy::new(|| Registry::new(|| make_pool(ConfigOverrides::default())));

/// The process-wide PostgreSQL registry.
pub fn global() -> &'static Registry<PgConnectionManager> {
    &GLOBAL
}

/// Create the process-wide instance with `overrides` applied, unless it
/// already exists. Returns the instance in use.
pub async fn configure(overrides: ConfigOverrides) -> Result<Database> {
    global().get_or_init(|| make_pool(overrides)).await
}

/// Lease a connection from the process-wide instance.
///
/// The lease is returned to the pool when dropped or released.
pub async fn get_client() -> Result<Lease<PgConnectionManager>> {
    global().get().await?.acquire().await
}

/// Run one parameterized query on the process-wide instance.
///
/// `params[0]` binds to `$1`, `params[1]` to `$2`, and so on. The connection
/// is released whether the query succeeds or fails.
pub async fn query(sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
    global().get().await?.query(sql, params).await
}

/// Close the process-wide instance.
pub async fn shutdown() {
    global().shutdown().await;
}

/// Install `db` as the process-wide instance, returning the previous one.
pub async fn install(db: Database) -> Option<Database> {
    global().replace(db).await
}
