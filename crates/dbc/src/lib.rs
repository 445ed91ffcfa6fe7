//! # dbc
//!
//! PostgreSQL query helper built on a pre-warmed, bounded connection pool.
//!
//! This is the primary public API surface of the workspace. It wires the
//! generic [`dbc_pool`] pool to the `tokio-postgres` driver and adds a query
//! helper that always gives its connection back, whatever happens to the
//! query.
//!
//! ## Features
//!
//! - **Opinionated defaults**: application name `dbc`, 3 pre-warmed
//!   connections, 5s connection timeout, 3s idle timeout, TCP keep-alive
//! - **Field-by-field overrides**: [`ConfigOverrides`] replaces only what it sets
//! - **Guaranteed release**: [`execute`] returns its lease on every exit path
//! - **Positional parameters**: `$1`, `$2`, ... bound by the driver, never
//!   spliced into the SQL text
//! - **Explicit handle or singleton**: pass a [`Database`] around, or use the
//!   lazily-initialized process-wide instance through [`query`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbc::{ConfigOverrides, SqlValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dbc::Error> {
//!     // Explicit handle, created once at startup
//!     let db = dbc::make_pool(ConfigOverrides::new().max_connections(20)).await?;
//!
//!     let result = db
//!         .query("SELECT id, name FROM users WHERE id = $1", &[SqlValue::from(1)])
//!         .await?;
//!
//!     for row in &result {
//!         let name: String = row.try_get(1)?;
//!         println!("User: {}", name);
//!     }
//!
//!     // Or the process-wide instance, configured from `dbc_string`
//!     let count = dbc::query("SELECT count(*) FROM users", &[]).await?;
//!     println!("{} users", count.scalar::<i64>()?);
//!
//!     dbc::shutdown().await;
//!     db.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod database;
pub mod env;
pub mod error;
pub mod global;
pub mod instrumentation;
mod numeric;
pub mod query;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use config::{Config, ConfigOverrides};
pub use connection::{PgConnection, PgConnectionManager};
pub use database::{Database, make_pool};
pub use dbc_pool::{Lease, Pool, PoolConfig, PoolError, PoolStatus};
pub use error::{Error, Result};
pub use global::{Registry, configure, get_client, global, install, query, shutdown};
pub use query::{Queryable, execute};
pub use row::{Column, QueryResult, Row};
pub use value::{FromValue, SqlValue};
