//! Runner configuration loaded from environment variables.

use saga::SagaConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Runner configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: Postgres connection string (default: unset, in-memory store)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - the `SAGA_*` variables read by [`SagaConfig`]
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_level: String,
    pub log_format: LogFormat,
    pub saga: SagaConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.max_connections),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            saga: SagaConfig::from_lookup(&lookup),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            saga: SagaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.saga, SagaConfig::default());
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/sagas"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("RUST_LOG", "saga=debug"),
            ("LOG_FORMAT", "JSON"),
            ("SAGA_MAX_RETRIES", "3"),
            ("SAGA_STEP_TIMEOUT_MS", "1500"),
        ]));

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/sagas")
        );
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.log_level, "saga=debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.saga.max_retries, 3);
        assert_eq!(config.saga.step_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "  ")]));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_unknown_log_format_is_pretty() {
        let config = Config::from_lookup(lookup(&[("LOG_FORMAT", "xml")]));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }
}
