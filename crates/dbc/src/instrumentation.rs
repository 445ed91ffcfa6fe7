//! Tracing instrumentation for database operations.
//!
//! Spans follow the OpenTelemetry semantic conventions for database clients,
//! so a `tracing-opentelemetry` layer exports them without renaming:
//! - `db.system`: "postgresql"
//! - `db.operation`: Query operation type (SELECT, INSERT, etc.)
//! - `db.statement`: SQL statement (sanitized by default)
//! - `db.rows_affected`: Rows returned or affected, recorded on success
//! - `error.type`: Error category, recorded on failure

use tracing::Span;

use crate::error::Error;

/// Database system identifier for PostgreSQL.
pub const DB_SYSTEM: &str = "postgresql";

/// Attribute keys following OpenTelemetry semantic conventions.
pub mod attributes {
    /// Database system type.
    pub const DB_SYSTEM: &str = "db.system";
    /// SQL statement (may be sanitized).
    pub const DB_STATEMENT: &str = "db.statement";
    /// Database operation type.
    pub const DB_OPERATION: &str = "db.operation";
    /// Number of rows affected.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
    /// Connection ID.
    pub const DB_CONNECTION_ID: &str = "db.connection_id";
    /// Error type.
    pub const ERROR_TYPE: &str = "error.type";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        truncate_string(&sanitize_sql(sql, &self.placeholder), self.max_length)
    }
}

/// Replace string and numeric literals with `placeholder`.
///
/// Positional parameters (`$1`) and quoted identifiers are kept.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // Doubled quotes are escapes, not terminators
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                        }
                        Some('\'') | None => break,
                        Some(_) => {}
                    }
                }
                result.push_str(placeholder);
            }
            '"' => {
                result.push(c);
                for ident in chars.by_ref() {
                    result.push(ident);
                    if ident == '"' {
                        break;
                    }
                }
            }
            c if c.is_ascii_digit()
                && !result.ends_with(|prev: char| prev.is_alphanumeric() || prev == '_' || prev == '$') =>
            {
                while chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_digit() || *next == '.')
                {
                    chars.next();
                }
                result.push_str(placeholder);
            }
            c => result.push(c),
        }
    }

    result
}

/// Truncate a string to at most `max_len` bytes, on a char boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" | "VALUES" | "TABLE" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "MERGE" => "MERGE",
        "CALL" => "CALL",
        "BEGIN" | "START" => "BEGIN",
        "COMMIT" | "END" => "COMMIT",
        "ROLLBACK" | "ABORT" => "ROLLBACK",
        "SAVEPOINT" | "RELEASE" => "SAVEPOINT",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        "TRUNCATE" => "TRUNCATE",
        "COPY" => "COPY",
        _ => "OTHER",
    }
}

/// Create the span wrapping one query execution.
#[must_use]
pub fn query_span(sql: &str, sanitization: &SanitizationConfig) -> Span {
    tracing::debug_span!(
        "dbc.query",
        db.system = DB_SYSTEM,
        db.operation = extract_operation(sql),
        db.statement = %sanitization.sanitize(sql),
        db.connection_id = tracing::field::Empty,
        db.rows_affected = tracing::field::Empty,
        "error.type" = tracing::field::Empty,
    )
}

/// Record the connection serving the query.
pub fn record_connection(span: &Span, connection_id: u64) {
    span.record(attributes::DB_CONNECTION_ID, connection_id);
}

/// Record success with the row count.
pub fn record_success(span: &Span, rows_affected: u64) {
    span.record(attributes::DB_ROWS_AFFECTED, rows_affected);
}

/// Record an error category.
pub fn record_error(span: &Span, error: &Error) {
    span.record(attributes::ERROR_TYPE, error_type(error));
}

/// Low-cardinality category for an error.
#[must_use]
pub fn error_type(error: &Error) -> &'static str {
    match error {
        Error::Config(_) => "config",
        Error::PoolTimeout(_) => "pool_timeout",
        Error::PoolClosed => "pool_closed",
        Error::Connection(_) => "connection",
        Error::Query { .. } => "query",
        Error::Type(_) => "type",
    }
}
