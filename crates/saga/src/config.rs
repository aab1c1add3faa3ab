//! Orchestrator configuration.

use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry and timeout settings applied to every step of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    /// Retries allowed per step after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    /// Upper bound on a single forward or compensating action.
    pub step_timeout: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::from_millis(100),
            step_timeout: Duration::from_secs(30),
        }
    }
}

impl SagaConfig {
    /// Loads configuration from environment variables.
    ///
    /// - `SAGA_MAX_RETRIES` (default: 0)
    /// - `SAGA_RETRY_BACKOFF_MS` (default: 100)
    /// - `SAGA_STEP_TIMEOUT_MS` (default: 30000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        Self {
            max_retries: lookup("SAGA_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_backoff: millis("SAGA_RETRY_BACKOFF_MS").unwrap_or(defaults.retry_backoff),
            step_timeout: millis("SAGA_STEP_TIMEOUT_MS").unwrap_or(defaults.step_timeout),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Delay before retry number `attempt` (1-based), capped at 30s.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SagaConfig::default();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
        assert_eq!(config.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("SAGA_MAX_RETRIES", "3"),
            ("SAGA_RETRY_BACKOFF_MS", "250"),
            ("SAGA_STEP_TIMEOUT_MS", "not-a-number"),
        ]);
        let config = SagaConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SagaConfig::default().with_retry_backoff(Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for(40), Duration::from_secs(30));
    }
}
