//! # dbc-pool
//!
//! Bounded async connection pool with lifecycle management.
//!
//! The pool is generic over a [`ManageConnection`] implementation, which knows
//! how to open a physical connection, check that it is alive and tell whether
//! it has broken. Everything else (sizing, waiting, eviction, accounting) is
//! handled here.
//!
//! ## Features
//!
//! - Configurable min/max pool sizes, with `min` connections pre-warmed at startup
//! - Connection timeout for acquisition, idle timeout and maximum lifetime
//! - Liveness checks on checkout, with one transparent retry
//! - FIFO-fair waiting for saturated pools
//! - Background reaper that evicts idle connections down to `min`
//! - Connections returned to the pool automatically when a [`Lease`] is dropped
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbc_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .min_connections(3)
//!     .max_connections(10)
//!     .idle_timeout(Duration::from_secs(300));
//!
//! let pool = Pool::new(config, manager).await?;
//! let conn = pool.get().await?;
//! // Use connection...
//! // Connection automatically returned to pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod pool;
mod reaper;

pub use config::PoolConfig;
pub use error::{BoxError, PoolError};
pub use lease::Lease;
pub use lifecycle::{ConnectionMetadata, ManageConnection};
pub use pool::{Pool, PoolBuilder, PoolStatus};
