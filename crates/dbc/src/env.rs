//! Environment boundary.
//!
//! The only place that reads process environment. Everything else takes
//! configuration as an explicit [`Config`].

use crate::config::Config;

/// Environment variable holding the default connection string.
pub const CONNECTION_STRING_ENV: &str = "dbc_string";

/// Default configuration with the connection string taken from
/// [`CONNECTION_STRING_ENV`], when it is set.
#[must_use]
pub fn config_from_env() -> Config {
    config_from_lookup(|key| std::env::var(key).ok())
}

/// Default configuration resolved through `lookup` instead of the process
/// environment.
pub fn config_from_lookup<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    config.connection_string = lookup(CONNECTION_STRING_ENV).filter(|value| !value.is_empty());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_sets_connection_string() {
        let config = config_from_lookup(|key| {
            (key == CONNECTION_STRING_ENV).then(|| "host=db user=app".to_string())
        });
        assert_eq!(config.connection_string.as_deref(), Some("host=db user=app"));
        assert_eq!(config.application_name, "dbc");
    }

    #[test]
    fn test_missing_or_empty_variable() {
        assert_eq!(config_from_lookup(|_| None).connection_string, None);
        assert_eq!(
            config_from_lookup(|_| Some(String::new())).connection_string,
            None
        );
    }
}
