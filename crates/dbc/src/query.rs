//! Query execution with guaranteed connection release.

use async_trait::async_trait;
use dbc_pool::{Lease, ManageConnection};
use tracing::Instrument;

use crate::error::Result;
use crate::instrumentation::{self, SanitizationConfig};
use crate::row::QueryResult;
use crate::value::SqlValue;

/// A connection that can run parameterized queries.
///
/// Parameters are positional: the first element of `params` binds to `$1`,
/// the second to `$2`, and so on. Implementations hand them to the driver
/// and never splice them into the SQL text.
#[async_trait]
pub trait Queryable: Send {
    /// Run `sql` with `params` and collect the full result.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult>;
}

/// Run one query on `lease`, then release it.
///
/// The lease is returned to the pool on every exit path. While the query is
/// in flight the lease is flagged broken, so if this future is dropped
/// mid-query the connection is discarded instead of recycled with an
/// unfinished exchange. On completion the flag is cleared unless the error
/// left the connection unusable.
///
/// No retries are attempted.
pub async fn execute<M>(mut lease: Lease<M>, sql: &str, params: &[SqlValue]) -> Result<QueryResult>
where
    M: ManageConnection,
    M::Connection: Queryable,
{
    let span = instrumentation::query_span(sql, &SanitizationConfig::default());
    instrumentation::record_connection(&span, lease.metadata().id);

    async move {
        lease.mark_broken();
        let result = lease.query(sql, params).await;

        match &result {
            Ok(rows) => {
                lease.set_broken(false);
                instrumentation::record_success(&tracing::Span::current(), rows.rows_affected());
                tracing::trace!(rows = rows.len(), "query completed");
            }
            Err(e) => {
                let fatal = e.is_connection_fatal();
                lease.set_broken(fatal);
                instrumentation::record_error(&tracing::Span::current(), e);
                if fatal {
                    tracing::warn!(error = %e, "query failed, discarding connection");
                } else {
                    tracing::debug!(error = %e, "query failed");
                }
            }
        }

        lease.release();
        result
    }
    .instrument(span)
    .await
}
