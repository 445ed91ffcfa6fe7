//! Application-level configuration.
//!
//! [`Config`] carries everything needed to open and pool connections. Its
//! defaults are opinionated; [`ConfigOverrides`] replaces individual fields
//! without touching the rest.

use std::sync::Arc;
use std::time::Duration;

use dbc_pool::PoolConfig;

use crate::error::{Error, Result};

/// Default application name reported to the server.
pub const DEFAULT_APPLICATION_NAME: &str = "dbc";

/// Default liveness query.
pub const DEFAULT_HEALTH_CHECK_QUERY: &str = "SELECT 1";

/// Configuration for a pooled database handle.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Application name reported to the server.
    pub application_name: String,
    /// libpq-style connection string or URL.
    pub connection_string: Option<String>,
    /// Whether TCP keep-alive is enabled on physical connections.
    pub keep_alive: bool,
    /// Query used to check that an idle connection is alive.
    pub health_check_query: Arc<str>,
    /// Pool sizing and timing.
    pub pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            connection_string: None,
            keep_alive: true,
            health_check_query: Arc::from(DEFAULT_HEALTH_CHECK_QUERY),
            pool: PoolConfig::new()
                .min_connections(3)
                .max_connections(10)
                .connection_timeout(Duration::from_millis(5000))
                .idle_timeout(Duration::from_millis(3000))
                .exit_on_idle(true),
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection string.
    #[must_use]
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the liveness query.
    #[must_use]
    pub fn health_check_query(mut self, query: impl AsRef<str>) -> Self {
        self.health_check_query = Arc::from(query.as_ref());
        self
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Apply overrides field by field; unset fields keep their value.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(name) = &overrides.application_name {
            self.application_name.clone_from(name);
        }
        if let Some(conn) = &overrides.connection_string {
            self.connection_string = Some(conn.clone());
        }
        if let Some(query) = &overrides.health_check_query {
            self.health_check_query = Arc::from(query.as_str());
        }
        if let Some(keep_alive) = overrides.keep_alive {
            self.keep_alive = keep_alive;
        }

        let mut pool = self.pool;
        if let Some(min) = overrides.min_connections {
            pool = pool.min_connections(min);
        }
        if let Some(max) = overrides.max_connections {
            pool = pool.max_connections(max);
        }
        if let Some(timeout) = overrides.connection_timeout {
            pool = pool.connection_timeout(timeout);
        }
        if let Some(timeout) = overrides.idle_timeout {
            pool = pool.idle_timeout(timeout);
        }
        if let Some(lifetime) = overrides.max_lifetime {
            pool = pool.max_lifetime(lifetime);
        }
        if let Some(exit) = overrides.exit_on_idle {
            pool = pool.exit_on_idle(exit);
        }
        self.pool = pool;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.application_name.is_empty() {
            return Err(Error::Config("application_name cannot be empty".into()));
        }
        if self.health_check_query.trim().is_empty() {
            return Err(Error::Config("health_check_query cannot be empty".into()));
        }
        if self.connection_string.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Config("connection_string cannot be empty".into()));
        }
        self.pool.validate()?;
        Ok(())
    }
}

// The connection string may embed a password.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("application_name", &self.application_name)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("keep_alive", &self.keep_alive)
            .field("health_check_query", &self.health_check_query)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Caller-supplied configuration overrides.
///
/// Every field is optional. Fields left as `None` keep the default.
///
/// # Example
///
/// ```rust
/// use dbc::{Config, ConfigOverrides};
///
/// let overrides = ConfigOverrides::new()
///     .max_connections(20)
///     .idle_timeout_ms(10_000);
///
/// let config = Config::default().with_overrides(&overrides);
/// assert_eq!(config.pool.max_connections, 20);
/// assert_eq!(config.pool.min_connections, 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Application name.
    pub application_name: Option<String>,
    /// Connection string.
    pub connection_string: Option<String>,
    /// Minimum pool size.
    pub min_connections: Option<u32>,
    /// Maximum pool size.
    pub max_connections: Option<u32>,
    /// Connection acquisition timeout.
    pub connection_timeout: Option<Duration>,
    /// Idle eviction timeout.
    pub idle_timeout: Option<Duration>,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
    /// TCP keep-alive.
    pub keep_alive: Option<bool>,
    /// Allow the pool to be dropped once all handles are gone.
    pub exit_on_idle: Option<bool>,
    /// Liveness query.
    pub health_check_query: Option<String>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Override the connection string.
    #[must_use]
    pub fn connection_string(mut self, conn: impl Into<String>) -> Self {
        self.connection_string = Some(conn.into());
        self
    }

    /// Override the minimum pool size.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = Some(count);
        self
    }

    /// Override the maximum pool size.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = Some(count);
        self
    }

    /// Override the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Override the connection timeout, in milliseconds.
    #[must_use]
    pub fn connection_timeout_ms(self, millis: u64) -> Self {
        self.connection_timeout(Duration::from_millis(millis))
    }

    /// Override the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Override the idle timeout, in milliseconds.
    #[must_use]
    pub fn idle_timeout_ms(self, millis: u64) -> Self {
        self.idle_timeout(Duration::from_millis(millis))
    }

    /// Override the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Override TCP keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = Some(enabled);
        self
    }

    /// Override exit-on-idle.
    #[must_use]
    pub fn exit_on_idle(mut self, enabled: bool) -> Self {
        self.exit_on_idle = Some(enabled);
        self
    }

    /// Override the liveness query.
    #[must_use]
    pub fn health_check_query(mut self, query: impl Into<String>) -> Self {
        self.health_check_query = Some(query.into());
        self
    }
}
