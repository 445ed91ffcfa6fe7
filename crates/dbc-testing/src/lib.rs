//! # dbc-testing
//!
//! Test infrastructure for dbc.
//!
//! This crate provides utilities for testing pooled query code with or
//! without a PostgreSQL server.
//!
//! ## Features
//!
//! - Mock connection manager with scripted responses (no server required)
//! - Failure injection: refused connects, failed liveness checks, killed connections
//! - Open/close counters and query recording for leak checks
//! - PostgreSQL container management via testcontainers
//! - Schema-scoped test fixtures
//!
//! ## Mock Example
//!
//! ```rust,ignore
//! use dbc::{Database, PoolConfig, SqlValue};
//! use dbc_testing::{MockManager, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock() {
//!     let manager = MockManager::builder()
//!         .with_response("SELECT name FROM users WHERE id = $1", MockResponse::scalar_string("Alice"))
//!         .build();
//!
//!     let db = Database::from_manager(PoolConfig::new(), manager.clone()).await.unwrap();
//!     let result = db
//!         .query("SELECT name FROM users WHERE id = $1", &[SqlValue::from(1)])
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(result.scalar::<String>().unwrap(), "Alice");
//!     assert_eq!(manager.queries()[0].params, vec![SqlValue::from(1)]);
//! }
//! ```
//!
//! ## Container Example
//!
//! ```rust,ignore
//! use dbc_testing::PostgresContainer;
//! use testcontainers::runners::AsyncRunner;
//!
//! #[tokio::test]
//! async fn test_with_real_server() {
//!     let image = PostgresContainer::default();
//!     let container = image.clone().start().await.unwrap();
//!     let port = container.get_host_port_ipv4(5432).await.unwrap();
//!     let conn_str = image.connection_string("127.0.0.1", port);
//!     // Connect with dbc::Config::default().connection_string(conn_str)...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod container;
pub mod fixtures;
pub mod mock;

pub use container::PostgresContainer;
pub use fixtures::TestFixture;
pub use mock::{MockConnection, MockError, MockManager, MockManagerBuilder, MockResponse, RecordedQuery};
