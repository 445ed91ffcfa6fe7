//! Error types for pooled query execution.

use std::time::Duration;

use dbc_pool::{BoxError, PoolError};
use thiserror::Error;

/// Errors that can occur while configuring the pool or running queries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No connection became available within the connection timeout.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// The pool has been shut down.
    #[error("pool is closed")]
    PoolClosed,

    /// A physical connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// The database rejected the query.
    ///
    /// `code` is the SQLSTATE reported by the server, when there is one.
    #[error("query error{}: {message}", code_suffix(.code))]
    Query {
        /// SQLSTATE error code.
        code: Option<String>,
        /// Driver message, verbatim.
        message: String,
    },

    /// A value could not be converted to or from its SQL representation.
    #[error("type error: {0}")]
    Type(String),
}

impl Error {
    /// Create a query error with an optional SQLSTATE code.
    pub fn query(code: Option<impl Into<String>>, message: impl Into<String>) -> Self {
        Self::Query {
            code: code.map(Into::into),
            message: message.into(),
        }
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// The executor never retries on its own; this is for callers that do.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PoolTimeout(_) | Self::Connection(_) => true,
            // 40001 serialization_failure, 40P01 deadlock_detected
            Self::Query { code: Some(code), .. } => code == "40001" || code == "40P01",
            _ => false,
        }
    }

    /// Check if the connection that produced this error must be discarded.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            // Class 08: connection exception; 57P01..57P03: server shutting down
            Self::Query { code: Some(code), .. } => {
                code.starts_with("08") || matches!(code.as_str(), "57P01" | "57P02" | "57P03")
            }
            _ => false,
        }
    }

    /// The SQLSTATE code, if this is a query error that carries one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(waited) => Self::PoolTimeout(waited),
            PoolError::PoolClosed => Self::PoolClosed,
            PoolError::Connection(source) | PoolError::UnhealthyConnection(source) => {
                Self::Connection(source)
            }
            PoolError::Configuration(message) => Self::Config(message),
            other => Self::Connection(Box::new(other)),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|code| format!(" [{code}]"))
        .unwrap_or_default()
}

/// Result type for dbc operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_mapping() {
        let timeout = Error::from(PoolError::Timeout(Duration::from_millis(5000)));
        assert!(matches!(timeout, Error::PoolTimeout(d) if d == Duration::from_millis(5000)));

        assert!(matches!(Error::from(PoolError::PoolClosed), Error::PoolClosed));

        let config = Error::from(PoolError::Configuration("max_connections must be greater than 0".into()));
        assert!(matches!(config, Error::Config(_)));

        let conn = Error::from(PoolError::Connection("refused".into()));
        assert_eq!(conn.to_string(), "connection error: refused");
    }

    #[test]
    fn test_query_error_display() {
        let err = Error::query(Some("42P01"), "relation \"missing\" does not exist");
        assert_eq!(
            err.to_string(),
            "query error [42P01]: relation \"missing\" does not exist"
        );
        assert_eq!(err.code(), Some("42P01"));

        let err = Error::query(None::<String>, "boom");
        assert_eq!(err.to_string(), "query error: boom");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::PoolTimeout(Duration::from_secs(1)).is_transient());
        assert!(Error::query(Some("40P01"), "deadlock").is_transient());
        assert!(!Error::query(Some("23505"), "duplicate key").is_transient());
        assert!(!Error::PoolClosed.is_transient());

        assert!(Error::Connection("reset".into()).is_connection_fatal());
        assert!(Error::query(Some("08006"), "connection failure").is_connection_fatal());
        assert!(Error::query(Some("57P01"), "admin shutdown").is_connection_fatal());
        assert!(!Error::query(Some("42601"), "syntax error").is_connection_fatal());
        assert!(!Error::Type("bad".into()).is_connection_fatal());
    }
}
