//! Test fixture utilities.

use std::sync::atomic::{AtomicU64, Ordering};

use dbc::{Database, Queryable};
use dbc_pool::ManageConnection;

static NEXT_FIXTURE: AtomicU64 = AtomicU64::new(0);

/// Generate a name that is unique within this process and unlikely to clash
/// with concurrent test processes.
#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let seq = NEXT_FIXTURE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{seq}", std::process::id())
}

/// Quote an identifier for PostgreSQL.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Schema-scoped fixture for setting up and tearing down test data.
///
/// Every table lives in the fixture's own schema, so dropping the schema
/// removes everything the test created.
#[derive(Debug, Clone)]
pub struct TestFixture {
    /// Schema name.
    pub schema: String,
    /// Tables created by this fixture, as `(name, column definitions)`.
    pub tables: Vec<(String, String)>,
}

impl TestFixture {
    /// Create a fixture for `schema`.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: Vec::new(),
        }
    }

    /// Create a fixture with a generated schema name.
    #[must_use]
    pub fn unique() -> Self {
        Self::new(unique_name("dbc_test"))
    }

    /// Add a table, given its column definitions.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, columns: impl Into<String>) -> Self {
        self.tables.push((table.into(), columns.into()));
        self
    }

    /// Schema-qualified, quoted name of `table`.
    #[must_use]
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// Generate SQL to create the schema.
    #[must_use]
    pub fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema))
    }

    /// Generate SQL to create each table.
    #[must_use]
    pub fn create_tables_sql(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|(name, columns)| {
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({columns})",
                    self.qualified(name)
                )
            })
            .collect()
    }

    /// Generate SQL to drop the schema and everything in it.
    #[must_use]
    pub fn drop_schema_sql(&self) -> String {
        format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(&self.schema))
    }

    /// Create the schema and its tables.
    pub async fn setup<M>(&self, db: &Database<M>) -> dbc::Result<()>
    where
        M: ManageConnection,
        M::Connection: Queryable,
    {
        db.query(&self.create_schema_sql(), &[]).await?;
        for sql in self.create_tables_sql() {
            db.query(&sql, &[]).await?;
        }
        tracing::debug!(schema = %self.schema, tables = self.tables.len(), "fixture created");
        Ok(())
    }

    /// Drop the schema.
    pub async fn teardown<M>(&self, db: &Database<M>) -> dbc::Result<()>
    where
        M: ManageConnection,
        M::Connection: Queryable,
    {
        db.query(&self.drop_schema_sql(), &[]).await?;
        tracing::debug!(schema = %self.schema, "fixture dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_sql() {
        let fixture = TestFixture::new("it")
            .with_table("users", "id INT PRIMARY KEY, name TEXT NOT NULL");

        assert_eq!(fixture.create_schema_sql(), "CREATE SCHEMA IF NOT EXISTS \"it\"");
        assert_eq!(
            fixture.create_tables_sql(),
            vec![
                "CREATE TABLE IF NOT EXISTS \"it\".\"users\" (id INT PRIMARY KEY, name TEXT NOT NULL)"
                    .to_string()
            ]
        );
        assert_eq!(fixture.drop_schema_sql(), "DROP SCHEMA IF EXISTS \"it\" CASCADE");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(unique_name("t"), unique_name("t"));
        assert!(TestFixture::unique().schema.starts_with("dbc_test_"));
    }
}
