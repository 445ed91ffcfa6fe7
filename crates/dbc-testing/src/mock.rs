//! Mock connection manager for tests without a PostgreSQL server.
//!
//! [`MockManager`] implements [`ManageConnection`] and produces
//! [`MockConnection`]s that answer queries from a table of scripted
//! [`MockResponse`]s. The manager records every query and counts every
//! connection it opens and closes, so tests can assert that nothing leaks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbc::{Column, Error, QueryResult, Queryable, Row, SqlValue};
use dbc_pool::ManageConnection;
use parking_lot::Mutex;

/// A scripted response to a query.
#[derive(Clone)]
pub enum MockResponse {
    /// Return a single value in a single row.
    Scalar(SqlValue),

    /// Return multiple rows with columns.
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
    },

    /// Return rows affected count (for INSERT/UPDATE/DELETE).
    RowsAffected(u64),

    /// Fail with a server error.
    Error {
        /// SQLSTATE code.
        code: String,
        /// Error message.
        message: String,
    },

    /// Drop the connection mid-query.
    Disconnect,

    /// Wait before producing the inner response.
    Delayed(Duration, Box<MockResponse>),

    /// Execute a custom handler.
    Custom(Arc<dyn Fn(&str, &[SqlValue]) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Delayed(d, inner) => f.debug_tuple("Delayed").field(d).field(inner).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl MockResponse {
    /// Create a scalar response.
    pub fn scalar(value: impl Into<SqlValue>) -> Self {
        Self::Scalar(value.into())
    }

    /// Create a scalar integer response.
    #[must_use]
    pub fn scalar_int(value: i32) -> Self {
        Self::Scalar(SqlValue::Int(value))
    }

    /// Create a scalar string response.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self::Scalar(SqlValue::String(value.into()))
    }

    /// Create an empty result with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::RowsAffected(0)
    }

    /// Create a rows affected response.
    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create a server error response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a multi-row response.
    pub fn rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Create a response that kills the connection.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::Disconnect
    }

    /// Delay `inner` by `delay`.
    #[must_use]
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delayed(delay, Box::new(inner))
    }

    /// Create a response computed from the query and its parameters.
    pub fn custom<F>(handler: F) -> Self
    where
        F: Fn(&str, &[SqlValue]) -> MockResponse + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(handler))
    }
}

/// A query observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    /// Id of the connection that ran the query.
    pub connection_id: u64,
    /// SQL text, as sent.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<SqlValue>,
}

/// Errors produced by the mock manager.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

struct MockState {
    responses: Mutex<HashMap<String, MockResponse>>,
    default_response: Mutex<MockResponse>,
    connect_delay: Mutex<Option<Duration>>,
    health_check_delay: Mutex<Option<Duration>>,
    queries: Mutex<Vec<RecordedQuery>>,
    next_id: AtomicU64,
    generation: AtomicU64,
    fail_connects: AtomicU32,
    fail_validations: AtomicU32,
    connects: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    validations: AtomicU64,
}

impl MockState {
    fn is_dead(&self, conn: &MockConnection) -> bool {
        conn.dead || conn.generation < self.generation.load(Ordering::SeqCst)
    }
}

// Decrement `counter` if it is non-zero; report whether it was.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Builder for [`MockManager`].
#[derive(Debug)]
pub struct MockManagerBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    connect_delay: Option<Duration>,
    health_check_delay: Option<Duration>,
}

impl Default for MockManagerBuilder {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::empty(),
            connect_delay: None,
            health_check_delay: None,
        }
    }
}

impl MockManagerBuilder {
    /// Answer `sql` with `response`. Matching ignores surrounding whitespace.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into().trim().to_string(), response);
        self
    }

    /// Answer unmatched queries with `response`.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Make every connect take `delay`.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Make every liveness check take `delay`.
    #[must_use]
    pub fn with_health_check_delay(mut self, delay: Duration) -> Self {
        self.health_check_delay = Some(delay);
        self
    }

    /// Build the manager.
    #[must_use]
    pub fn build(self) -> MockManager {
        MockManager {
            state: Arc::new(MockState {
                responses: Mutex::new(self.responses),
                default_response: Mutex::new(self.default_response),
                connect_delay: Mutex::new(self.connect_delay),
                health_check_delay: Mutex::new(self.health_check_delay),
                queries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                fail_connects: AtomicU32::new(0),
                fail_validations: AtomicU32::new(0),
                connects: AtomicU64::new(0),
                opened: AtomicU64::new(0),
                closed: AtomicU64::new(0),
                validations: AtomicU64::new(0),
            }),
        }
    }
}

/// A scripted [`ManageConnection`] implementation.
///
/// Clones share state, so a test can keep a clone to inspect counters and
/// inject failures after handing the manager to a pool.
#[derive(Clone)]
pub struct MockManager {
    state: Arc<MockState>,
}

impl Default for MockManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for MockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockManager")
            .field("opened", &self.opened())
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

impl MockManager {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> MockManagerBuilder {
        MockManagerBuilder::default()
    }

    /// Create a manager with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or add a scripted response.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.state
            .responses
            .lock()
            .insert(sql.into().trim().to_string(), response);
    }

    /// Replace the response for unmatched queries.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.state.default_response.lock() = response;
    }

    /// Change the connect delay for future connects.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` liveness checks.
    pub fn fail_next_validations(&self, count: u32) {
        self.state.fail_validations.store(count, Ordering::SeqCst);
    }

    /// Kill every connection opened so far, as if the server restarted.
    ///
    /// Killed connections fail liveness checks and queries, and report
    /// themselves broken. Connections opened afterwards are healthy.
    pub fn kill_connections(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of connection attempts, successful or not.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of connections successfully opened.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed (dropped).
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of connections currently open.
    #[must_use]
    pub fn open_now(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    /// Number of liveness checks run.
    #[must_use]
    pub fn validations(&self) -> u64 {
        self.state.validations.load(Ordering::SeqCst)
    }

    /// All queries run so far, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.state.queries.lock().clone()
    }

    /// Forget recorded queries.
    pub fn clear_queries(&self) {
        self.state.queries.lock().clear();
    }
}

#[async_trait]
impl ManageConnection for MockManager {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self) -> Result<MockConnection, MockError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if take_one(&self.state.fail_connects) {
            return Err(MockError("connection refused".into()));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id, "mock connection opened");
        Ok(MockConnection {
            id,
            generation: self.state.generation.load(Ordering::SeqCst),
            dead: false,
            state: Arc::clone(&self.state),
        })
    }

    async fn is_valid(&self, conn: &mut MockConnection) -> Result<(), MockError> {
        self.state.validations.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.health_check_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.is_dead(conn) {
            return Err(MockError("server closed the connection unexpectedly".into()));
        }
        if take_one(&self.state.fail_validations) {
            return Err(MockError("health check failed".into()));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut MockConnection) -> bool {
        self.state.is_dead(conn)
    }
}

/// A connection produced by [`MockManager`].
pub struct MockConnection {
    id: u64,
    generation: u64,
    dead: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Id assigned by the manager, starting at 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the connection has been killed.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state.is_dead(self)
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("dead", &self.is_dead())
            .finish()
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(id = self.id, "mock connection closed");
    }
}

fn disconnected() -> Error {
    Error::Connection(Box::new(MockError(
        "server closed the connection unexpectedly".into(),
    )))
}

fn scalar_result(value: SqlValue) -> QueryResult {
    let columns: Arc<[Column]> = Arc::from(vec![Column::new(
        "?column?",
        0,
        value.type_name().to_ascii_lowercase(),
    )]);
    let row = Row::new(Arc::clone(&columns), vec![value]);
    QueryResult::new(columns, vec![row], 1)
}

fn rows_result(names: Vec<String>, rows: Vec<Vec<SqlValue>>) -> QueryResult {
    let columns: Arc<[Column]> = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let type_name = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .find(|value| !value.is_null())
                .map_or_else(|| "unknown".to_string(), |v| v.type_name().to_ascii_lowercase());
            Column::new(name, idx, type_name)
        })
        .collect();
    let count = u64::try_from(rows.len()).unwrap_or(u64::MAX);
    let rows = rows
        .into_iter()
        .map(|values| Row::new(Arc::clone(&columns), values))
        .collect();
    QueryResult::new(columns, rows, count)
}

#[async_trait]
impl Queryable for MockConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, Error> {
        self.state.queries.lock().push(RecordedQuery {
            connection_id: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        if self.is_dead() {
            return Err(disconnected());
        }

        let mut response = {
            let responses = self.state.responses.lock();
            match responses.get(sql.trim()) {
                Some(response) => response.clone(),
                None => self.state.default_response.lock().clone(),
            }
        };

        loop {
            response = match response {
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    *inner
                }
                MockResponse::Custom(handler) => handler(sql, params),
                MockResponse::Scalar(value) => return Ok(scalar_result(value)),
                MockResponse::Rows { columns, rows } => return Ok(rows_result(columns, rows)),
                MockResponse::RowsAffected(count) => return Ok(QueryResult::empty(count)),
                MockResponse::Error { code, message } => {
                    return Err(Error::query(Some(code), message));
                }
                MockResponse::Disconnect => {
                    self.dead = true;
                    return Err(disconnected());
                }
            };
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses() {
        let manager = MockManager::builder()
            .with_response("SELECT 1", MockResponse::scalar_int(1))
            .with_response(
                "SELECT id, name FROM users",
                MockResponse::rows(
                    vec!["id", "name"],
                    vec![
                        vec![SqlValue::Int(1), SqlValue::from("alice")],
                        vec![SqlValue::Int(2), SqlValue::Null],
                    ],
                ),
            )
            .with_default_response(MockResponse::affected(3))
            .build();

        let mut conn = manager.connect().await.unwrap();

        let one = conn.query(" SELECT 1 ", &[]).await.unwrap();
        assert_eq!(one.scalar::<i32>().unwrap(), 1);

        let users = conn.query("SELECT id, name FROM users", &[]).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users.columns()[0].type_name, "int4");
        assert_eq!(users.columns()[1].type_name, "text");

        let other = conn.query("UPDATE users SET x = 1", &[]).await.unwrap();
        assert_eq!(other.rows_affected(), 3);
        assert_eq!(manager.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_error_and_custom_responses() {
        let manager = MockManager::builder()
            .with_response("bad", MockResponse::error("42601", "syntax error"))
            .with_default_response(MockResponse::custom(|_, params| {
                MockResponse::Scalar(params.first().cloned().unwrap_or_default())
            }))
            .build();
        let mut conn = manager.connect().await.unwrap();

        let err = conn.query("bad", &[]).await.unwrap_err();
        assert_eq!(err.code(), Some("42601"));

        let echoed = conn.query("SELECT $1", &[SqlValue::from("x")]).await.unwrap();
        assert_eq!(echoed.scalar::<String>().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_disconnect_kills_connection() {
        let manager = MockManager::builder()
            .with_response("boom", MockResponse::disconnect())
            .build();
        let mut conn = manager.connect().await.unwrap();

        let err = conn.query("boom", &[]).await.unwrap_err();
        assert!(err.is_connection_fatal());
        assert!(conn.is_dead());
        assert!(manager.has_broken(&mut conn));
        assert!(manager.is_valid(&mut conn).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection_and_counters() {
        let manager = MockManager::new();
        manager.fail_next_connects(1);

        assert!(manager.connect().await.is_err());
        let mut first = manager.connect().await.unwrap();
        assert_eq!(manager.connects(), 2);
        assert_eq!(manager.opened(), 1);

        manager.fail_next_validations(1);
        assert!(manager.is_valid(&mut first).await.is_err());
        assert!(manager.is_valid(&mut first).await.is_ok());
        assert_eq!(manager.validations(), 2);

        manager.kill_connections();
        assert!(manager.has_broken(&mut first));
        let mut second = manager.connect().await.unwrap();
        assert!(!manager.has_broken(&mut second));

        drop(first);
        drop(second);
        assert_eq!(manager.closed(), 2);
        assert_eq!(manager.open_now(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_response() {
        let manager = MockManager::builder()
            .with_default_response(MockResponse::delayed(
                Duration::from_secs(2),
                MockResponse::scalar_int(9),
            ))
            .build();
        let mut conn = manager.connect().await.unwrap();

        let start = tokio::time::Instant::now();
        let result = conn.query("SELECT slow()", &[]).await.unwrap();
        assert_eq!(result.scalar::<i32>().unwrap(), 9);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
