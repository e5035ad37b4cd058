//! Configuration management for callgate.
//!
//! Settings are a flat record so they map one-to-one onto the
//! `RATE_LIMIT_*` environment variables. Durations are floating seconds.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{CallgateError, Result};

/// Prefix shared by every environment variable the governor reads.
pub const ENV_PREFIX: &str = "RATE_LIMIT";

/// Settings for one quota domain, as read from a file or the environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GovernorConfig {
    /// Maximum grants inside any window of `period` seconds
    #[serde(default = "default_max_calls")]
    pub max_calls: i64,

    /// Window length in seconds
    #[serde(default = "default_period")]
    pub period: f64,

    /// Retries callers may perform after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Backoff for the first retry, in seconds
    #[serde(default = "default_base_backoff")]
    pub base_backoff: f64,

    /// Upper clamp for the un-jittered backoff, in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period: default_period(),
            max_retries: default_max_retries(),
            base_backoff: default_base_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_max_calls() -> i64 {
    4
}

fn default_period() -> f64 {
    1.0
}

fn default_max_retries() -> i64 {
    4
}

fn default_base_backoff() -> f64 {
    1.0
}

fn default_max_backoff() -> f64 {
    12.0
}

/// Validated sliding window parameters.
///
/// Only [`RateLimiterConfig::new`] and `Default` build one, so a zero quota
/// or a zero-length window never reaches a limiter.
///
/// ```compile_fail
/// use std::time::Duration;
/// use callgate::RateLimiterConfig;
///
/// let config = RateLimiterConfig { max_calls: 0, period: Duration::ZERO };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Quota size, at least 1
    max_calls: usize,
    /// Window length, never zero
    period: Duration,
}

impl RateLimiterConfig {
    /// Build a config, rejecting a zero quota or a zero-length window.
    pub fn new(max_calls: usize, period: Duration) -> Result<Self> {
        if max_calls == 0 {
            return Err(CallgateError::Config(
                "max_calls must be at least 1".to_string(),
            ));
        }
        if period.is_zero() {
            return Err(CallgateError::Config(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_calls, period })
    }

    /// Quota size.
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls() as usize,
            period: Duration::from_secs_f64(default_period()),
        }
    }
}

/// Validated retry parameters.
///
/// `max_retries` is advisory: the limiter never looks at it, the retry
/// driver and other calling code do.
///
/// ```compile_fail
/// use std::time::Duration;
/// use callgate::RetryPolicyConfig;
///
/// let policy = RetryPolicyConfig {
///     base_backoff: Duration::ZERO,
///     max_backoff: Duration::ZERO,
///     max_retries: 4,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicyConfig {
    /// Backoff for attempt 0
    base_backoff: Duration,
    /// Clamp applied before jitter
    max_backoff: Duration,
    /// Retries allowed after the first attempt
    max_retries: u32,
}

impl RetryPolicyConfig {
    /// Build a policy, rejecting zero-length backoffs.
    pub fn new(base_backoff: Duration, max_backoff: Duration, max_retries: u32) -> Result<Self> {
        if base_backoff.is_zero() {
            return Err(CallgateError::Config(
                "base_backoff must be greater than zero".to_string(),
            ));
        }
        if max_backoff.is_zero() {
            return Err(CallgateError::Config(
                "max_backoff must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            base_backoff,
            max_backoff,
            max_retries,
        })
    }

    /// Backoff for attempt 0.
    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    /// Clamp applied before jitter.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Advisory retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs_f64(default_base_backoff()),
            max_backoff: Duration::from_secs_f64(default_max_backoff()),
            max_retries: default_max_retries() as u32,
        }
    }
}

impl GovernorConfig {
    /// Load configuration from defaults, an optional YAML file and the
    /// `RATE_LIMIT_*` environment variables, later sources winning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`GovernorConfig::load`], reading variables from `env` instead
    /// of the process environment when it is given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading governor configuration");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config: GovernorConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CallgateError::Config(format!("Failed to load settings: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GovernorConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CallgateError::Config(format!("Failed to parse settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiter()?;
        self.retry_policy()?;
        Ok(())
    }

    /// The sliding window parameters described by these settings.
    pub fn rate_limiter(&self) -> Result<RateLimiterConfig> {
        let max_calls = usize::try_from(self.max_calls)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| {
                CallgateError::Config(format!(
                    "max_calls must be between 1 and {}, got {}",
                    usize::MAX,
                    self.max_calls
                ))
            })?;
        let period = positive_secs("period", self.period)?;
        RateLimiterConfig::new(max_calls, period)
    }

    /// The retry parameters described by these settings.
    pub fn retry_policy(&self) -> Result<RetryPolicyConfig> {
        let max_retries = u32::try_from(self.max_retries).map_err(|_| {
            CallgateError::Config(format!(
                "max_retries must be between 0 and {}, got {}",
                u32::MAX,
                self.max_retries
            ))
        })?;
        let base_backoff = positive_secs("base_backoff", self.base_backoff)?;
        let max_backoff = positive_secs("max_backoff", self.max_backoff)?;
        RetryPolicyConfig::new(base_backoff, max_backoff, max_retries)
    }
}

fn positive_secs(field: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CallgateError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            field, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CallgateError::Config(format!("{} is out of range: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> config::Map<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = GovernorConfig::default();
        assert_eq!(config.max_calls, 4);
        assert_eq!(config.period, 1.0);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.base_backoff, 1.0);
        assert_eq!(config.max_backoff, 12.0);

        let limiter = config.rate_limiter().unwrap();
        assert_eq!(limiter, RateLimiterConfig::default());
        let retry = config.retry_policy().unwrap();
        assert_eq!(retry, RetryPolicyConfig::default());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
max_calls: 10
period: 0.5
"#;
        let config = GovernorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_calls, 10);
        assert_eq!(config.period, 0.5);
        assert_eq!(config.max_backoff, 12.0);

        let limiter = config.rate_limiter().unwrap();
        assert_eq!(limiter.period(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_yaml_rejects_zero_calls() {
        let err = GovernorConfig::from_yaml("max_calls: 0").unwrap_err();
        assert!(matches!(err, CallgateError::Config(_)));
        assert!(err.to_string().contains("max_calls"));
    }

    #[test]
    fn test_validate_rejects_bad_period() {
        for period in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = GovernorConfig {
                period,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "period {} accepted", period);
        }
    }

    #[test]
    fn test_validate_rejects_negative_retries() {
        let config = GovernorConfig {
            max_retries: -1,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_rate_limiter_config_new() {
        assert!(RateLimiterConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimiterConfig::new(1, Duration::ZERO).is_err());
        assert!(RateLimiterConfig::new(1, Duration::from_nanos(1)).is_ok());
    }

    #[test]
    fn test_rejects_negative_max_calls() {
        let config = GovernorConfig {
            max_calls: -3,
            ..Default::default()
        };
        let err = config.rate_limiter().unwrap_err();
        assert!(err.to_string().contains("max_calls"));
    }

    #[test]
    fn test_accessors_expose_validated_values() {
        let limits = RateLimiterConfig::new(3, Duration::from_millis(250)).unwrap();
        assert_eq!(limits.max_calls(), 3);
        assert_eq!(limits.period(), Duration::from_millis(250));

        let policy =
            RetryPolicyConfig::new(Duration::from_secs(2), Duration::from_secs(9), 1).unwrap();
        assert_eq!(policy.base_backoff(), Duration::from_secs(2));
        assert_eq!(policy.max_backoff(), Duration::from_secs(9));
        assert_eq!(policy.max_retries(), 1);
    }

    #[test]
    fn test_retry_policy_allows_zero_retries() {
        let policy =
            RetryPolicyConfig::new(Duration::from_secs(1), Duration::from_secs(2), 0).unwrap();
        assert_eq!(policy.max_retries(), 0);
        assert!(RetryPolicyConfig::new(Duration::ZERO, Duration::from_secs(2), 0).is_err());
    }

    #[test]
    fn test_load_from_env() {
        let vars = env(&[
            ("RATE_LIMIT_MAX_CALLS", "7"),
            ("RATE_LIMIT_PERIOD", "2.5"),
            ("RATE_LIMIT_MAX_BACKOFF", "30"),
        ]);
        let config = GovernorConfig::load_with_env(None, Some(vars)).unwrap();
        assert_eq!(config.max_calls, 7);
        assert_eq!(config.period, 2.5);
        assert_eq!(config.max_backoff, 30.0);
        assert_eq!(config.max_retries, 4);
    }

    #[test]
    fn test_env_overrides_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/callgate.example.yaml");
        let vars = env(&[("RATE_LIMIT_MAX_RETRIES", "0")]);
        let config = GovernorConfig::load_with_env(Some(path.as_path()), Some(vars)).unwrap();
        assert_eq!(config.max_calls, 4);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_load_from_env_invalid() {
        let vars = env(&[("RATE_LIMIT_MAX_CALLS", "0")]);
        let err = GovernorConfig::load_with_env(None, Some(vars)).unwrap_err();
        assert!(matches!(err, CallgateError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = GovernorConfig::from_file("/nonexistent/callgate.yaml").unwrap_err();
        assert!(matches!(err, CallgateError::Io(_)));
    }
}
