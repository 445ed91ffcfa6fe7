//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for the connection pool.
///
/// A zero duration disables the corresponding limit: a zero
/// `connection_timeout` waits indefinitely, a zero `idle_timeout` never
/// evicts idle connections and a zero `max_lifetime` lets connections live
/// forever.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Minimum number of connections to maintain.
    pub min_connections: u32,

    /// Maximum number of connections allowed.
    pub max_connections: u32,

    /// Time to wait for a connection before timing out.
    pub connection_timeout: Duration,

    /// Time a connection can be idle before being closed.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,

    /// Whether to test connections on checkout.
    pub test_on_checkout: bool,

    /// Interval between reaper passes over the idle set.
    pub reaper_interval: Duration,

    /// Whether the pool may be dropped once every handle to it is gone.
    ///
    /// When disabled, the background reaper keeps the pool alive until
    /// [`Pool::close`](crate::Pool::close) is called.
    pub exit_on_idle: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            test_on_checkout: true,
            reaper_interval: Duration::from_secs(1),
            exit_on_idle: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Enable or disable testing connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Set the reaper interval.
    #[must_use]
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Allow the pool to be dropped once all handles are gone.
    #[must_use]
    pub fn exit_on_idle(mut self, enabled: bool) -> Self {
        self.exit_on_idle = enabled;
        self
    }

    /// Acquisition timeout, or `None` when waiting is unbounded.
    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        non_zero(self.connection_timeout)
    }

    /// Idle timeout, or `None` when idle eviction is disabled.
    #[must_use]
    pub fn idle_limit(&self) -> Option<Duration> {
        non_zero(self.idle_timeout)
    }

    /// Maximum lifetime, or `None` when connections never expire.
    #[must_use]
    pub fn lifetime_limit(&self) -> Option<Duration> {
        non_zero(self.max_lifetime)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        if self.reaper_interval.is_zero() {
            return Err(PoolError::Configuration(
                "reaper_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 10);
        assert!(config.test_on_checkout);
        assert!(!config.exit_on_idle);
        assert_eq!(config.reaper_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_config_builder_methods() {
        let config = PoolConfig::new()
            .min_connections(5)
            .max_connections(50)
            .connection_timeout(Duration::from_secs(60))
            .idle_timeout(Duration::from_secs(120))
            .max_lifetime(Duration::from_secs(3600))
            .test_on_checkout(false)
            .reaper_interval(Duration::from_millis(250))
            .exit_on_idle(true);

        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.connection_timeout, Duration::from_secs(60));
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.max_lifetime, Duration::from_secs(3600));
        assert!(!config.test_on_checkout);
        assert_eq!(config.reaper_interval, Duration::from_millis(250));
        assert!(config.exit_on_idle);
    }

    #[test]
    fn test_zero_durations_disable_limits() {
        let config = PoolConfig::new()
            .connection_timeout(Duration::ZERO)
            .idle_timeout(Duration::ZERO)
            .max_lifetime(Duration::ZERO);

        assert_eq!(config.acquire_timeout(), None);
        assert_eq!(config.idle_limit(), None);
        assert_eq!(config.lifetime_limit(), None);
        assert!(config.validate().is_ok());

        let config = PoolConfig::new().idle_timeout(Duration::from_millis(3000));
        assert_eq!(config.idle_limit(), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_config_validation_success() {
        let config = PoolConfig::new().min_connections(1).max_connections(10);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_min_greater_than_max() {
        let config = PoolConfig::new().min_connections(20).max_connections(10);

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("min_connections cannot be greater than max_connections")
        );
    }

    #[test]
    fn test_config_validation_zero_max() {
        let config = PoolConfig::new().min_connections(0).max_connections(0);

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("max_connections must be greater than 0")
        );
    }

    #[test]
    fn test_config_validation_zero_reaper_interval() {
        let config = PoolConfig::new().reaper_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_equal_min_max() {
        let config = PoolConfig::new().min_connections(5).max_connections(5);

        assert!(config.validate().is_ok());
    }
}
