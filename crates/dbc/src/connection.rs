//! PostgreSQL connections.
//!
//! [`PgConnectionManager`] opens and checks `tokio-postgres` connections for
//! the pool; [`PgConnection`] runs queries on one of them.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use dbc_pool::ManageConnection;
use futures_util::TryStreamExt;
use postgres_types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::Instrument;

use crate::config::Config;
use crate::env::CONNECTION_STRING_ENV;
use crate::error::{Error, Result};
use crate::instrumentation::DB_SYSTEM;
use crate::query::Queryable;
use crate::row::{Column, QueryResult, Row};
use crate::value::SqlValue;

/// Opens and checks PostgreSQL connections.
///
/// The connection string is parsed by `tokio-postgres`; the application name
/// and keep-alive flag from [`Config`] are applied on top of it, and the pool
/// connection timeout bounds connection establishment unless the string sets
/// `connect_timeout` itself. Connections are plaintext.
#[derive(Debug, Clone)]
pub struct PgConnectionManager {
    pg_config: tokio_postgres::Config,
    health_check_query: Arc<str>,
}

impl PgConnectionManager {
    /// Create a manager from application configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let conn_str = config.connection_string.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "no connection string configured (set {CONNECTION_STRING_ENV} or pass one explicitly)"
            ))
        })?;

        let mut pg_config: tokio_postgres::Config = conn_str
            .parse()
            .map_err(|e| Error::Config(format!("invalid connection string: {e}")))?;

        pg_config.application_name(&config.application_name);
        pg_config.keepalives(config.keep_alive);
        if pg_config.get_connect_timeout().is_none() {
            if let Some(timeout) = config.pool.acquire_timeout() {
                pg_config.connect_timeout(timeout);
            }
        }

        Ok(Self {
            pg_config,
            health_check_query: Arc::clone(&config.health_check_query),
        })
    }

    /// The driver configuration used for new connections.
    #[must_use]
    pub fn pg_config(&self) -> &tokio_postgres::Config {
        &self.pg_config
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = PgConnection;
    type Error = tokio_postgres::Error;

    async fn connect(&self) -> std::result::Result<PgConnection, tokio_postgres::Error> {
        let span = tracing::debug_span!("dbc.connect", db.system = DB_SYSTEM);
        async {
            let (client, connection) = self.pg_config.connect(NoTls).await?;

            // The connection object drives the socket; the client talks to it.
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "PostgreSQL connection terminated with error");
                }
            });

            tracing::debug!("PostgreSQL connection established");
            Ok(PgConnection { client })
        }
        .instrument(span)
        .await
    }

    async fn is_valid(&self, conn: &mut PgConnection) -> std::result::Result<(), tokio_postgres::Error> {
        conn.client.simple_query(&self.health_check_query).await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut PgConnection) -> bool {
        conn.client.is_closed()
    }
}

/// A physical PostgreSQL connection.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    /// The underlying driver client, for operations this crate does not wrap.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Check whether the server side of the connection has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

#[async_trait]
impl Queryable for PgConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        // Prepare first so parameters can be coerced to the inferred types.
        let statement = self.client.prepare(sql).await.map_err(map_pg_error)?;

        let columns: Arc<[Column]> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| Column::new(col.name(), idx, col.type_().name()))
            .collect();

        let stream = self
            .client
            .query_raw(
                &statement,
                params.iter().map(|p| p as &(dyn ToSql + Sync)),
            )
            .await
            .map_err(map_pg_error)?;
        let mut stream = std::pin::pin!(stream);

        let mut rows = Vec::new();
        while let Some(pg_row) = stream.try_next().await.map_err(map_pg_error)? {
            let values = (0..pg_row.len())
                .map(|idx| {
                    pg_row.try_get::<_, SqlValue>(idx).map_err(|e| {
                        Error::Type(format!("failed to decode column {}: {e}", columns[idx].name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(Row::new(Arc::clone(&columns), values));
        }

        let rows_affected = stream
            .rows_affected()
            .unwrap_or(u64::try_from(rows.len()).unwrap_or(u64::MAX));

        tracing::debug!(row_count = rows.len(), rows_affected, "query executed");
        Ok(QueryResult::new(columns, rows, rows_affected))
    }
}

/// Map a driver error onto the crate's error kinds.
///
/// Server errors keep their SQLSTATE and message verbatim.
pub(crate) fn map_pg_error(err: tokio_postgres::Error) -> Error {
    if let Some(db_error) = err.as_db_error() {
        return Error::Query {
            code: Some(db_error.code().code().to_string()),
            message: db_error.message().to_string(),
        };
    }

    let is_io = err
        .source()
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
    if err.is_closed() || is_io {
        return Error::Connection(Box::new(err));
    }

    let message = err.to_string();
    if message.starts_with("error serializing parameter")
        || message.starts_with("error deserializing column")
    {
        return Error::Type(message);
    }

    Error::Query {
        code: None,
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ConfigOverrides;

    #[test]
    fn test_manager_requires_connection_string() {
        let err = PgConnectionManager::new(&Config::default()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("dbc_string")));
    }

    #[test]
    fn test_manager_rejects_invalid_connection_string() {
        let config = Config::default().connection_string("postgres://host:notaport/db");
        assert!(matches!(
            PgConnectionManager::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_manager_applies_config() {
        let config = Config::default()
            .connection_string("host=localhost user=app dbname=app")
            .with_overrides(&ConfigOverrides::new().application_name("billing").keep_alive(false));

        let manager = PgConnectionManager::new(&config).unwrap();
        let pg = manager.pg_config();
        assert_eq!(pg.get_application_name(), Some("billing"));
        assert!(!pg.get_keepalives());
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_millis(5000)));
        assert_eq!(pg.get_user(), Some("app"));
    }

    #[test]
    fn test_connect_timeout_in_string_wins() {
        let config = Config::default().connection_string("host=localhost connect_timeout=2");
        let manager = PgConnectionManager::new(&config).unwrap();
        assert_eq!(
            manager.pg_config().get_connect_timeout(),
            Some(&Duration::from_secs(2))
        );
    }

    #[test]
    fn test_zero_connection_timeout_leaves_connect_unbounded() {
        let config = Config::default()
            .connection_string("host=localhost")
            .with_overrides(&ConfigOverrides::new().connection_timeout_ms(0));
        let manager = PgConnectionManager::new(&config).unwrap();
        assert_eq!(manager.pg_config().get_connect_timeout(), None);
    }
}
