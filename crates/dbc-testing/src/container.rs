//! PostgreSQL container support via testcontainers.

use testcontainers::Image;
use testcontainers::core::{ContainerPort, WaitFor};

/// Port PostgreSQL listens on inside the container.
pub const POSTGRES_PORT: u16 = 5432;

/// PostgreSQL container image.
///
/// Uses the official `postgres` image from Docker Hub.
#[derive(Debug, Clone)]
pub struct PostgresContainer {
    /// Superuser name.
    pub user: String,
    /// Superuser password.
    pub password: String,
    /// Database created at startup.
    pub db: String,
    /// Container tag (version).
    pub tag: String,
}

impl Default for PostgresContainer {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            db: "postgres".to_string(),
            tag: "16-alpine".to_string(),
        }
    }
}

impl PostgresContainer {
    /// Create a new PostgreSQL container configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the superuser name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the superuser password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database created at startup.
    #[must_use]
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Set the container tag (PostgreSQL version).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Connection string for a container reachable at `host:port`.
    #[must_use]
    pub fn connection_string(&self, host: &str, port: u16) -> String {
        format!(
            "host={host} port={port} user={} password={} dbname={}",
            self.user, self.password, self.db
        )
    }
}

impl Image for PostgresContainer {
    fn name(&self) -> &str {
        "postgres"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        // The entrypoint starts a temporary server for initdb first; the
        // second message comes from the real one.
        vec![
            WaitFor::message_on_stderr("database system is ready to accept connections"),
            WaitFor::message_on_stdout("database system is ready to accept connections"),
        ]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<
        Item = (
            impl Into<std::borrow::Cow<'_, str>>,
            impl Into<std::borrow::Cow<'_, str>>,
        ),
    > {
        vec![
            ("POSTGRES_USER", self.user.as_str()),
            ("POSTGRES_PASSWORD", self.password.as_str()),
            ("POSTGRES_DB", self.db.as_str()),
        ]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[ContainerPort::Tcp(POSTGRES_PORT)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        let image = PostgresContainer::new()
            .with_user("app")
            .with_password("secret")
            .with_db("appdb");
        assert_eq!(
            image.connection_string("127.0.0.1", 49153),
            "host=127.0.0.1 port=49153 user=app password=secret dbname=appdb"
        );
        assert_eq!(image.name(), "postgres");
        assert_eq!(image.tag(), "16-alpine");
    }
}
