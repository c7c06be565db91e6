// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Deserializable resilience configuration.
//!
//! [`ResilienceConfig`] is meant to be embedded in an application's configuration file.
//! Durations are integer milliseconds and every field is optional:
//!
//! ```json
//! {
//!     "breakers": {
//!         "ai-service": { "failure_threshold": 3, "timeout_ms": 30000 }
//!     },
//!     "breaker_defaults": { "success_threshold": 1 },
//!     "retry": { "max_attempts": 4, "initial_delay_ms": 500 }
//! }
//! ```
//!
//! Unlike the code-level builders, which silently clamp out-of-range values, the
//! conversions in this module reject them with a [`ConfigError`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::breaker::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_SUCCESS_THRESHOLD, DEFAULT_TIMEOUT, MAX_TIMEOUT};
use crate::retry::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_USE_JITTER,
};
use crate::retry::{RetryOptions, RetryPolicy};
use crate::{BreakerOptions, ConfigError};

/// Breakers by name, defaults for unnamed breakers and the default retry policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ResilienceConfig {
    /// Breakers registered up front, keyed by dependency name.
    pub breakers: BTreeMap<String, BreakerConfig>,
    /// Options of breakers created on demand for names not listed in `breakers`.
    pub breaker_defaults: BreakerConfig,
    /// Retry policy used by calls that pass no explicit options.
    pub retry: RetryConfig,
}

impl ResilienceConfig {
    /// Options of the breaker named `name`, or of `breaker_defaults` when the name is not listed.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the selected entry is out of range.
    pub fn breaker_options(&self, name: &str) -> Result<BreakerOptions, ConfigError> {
        self.breakers.get(name).unwrap_or(&self.breaker_defaults).try_into()
    }

    /// Options of breakers created on demand.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `breaker_defaults` is out of range.
    pub fn default_breaker_options(&self) -> Result<BreakerOptions, ConfigError> {
        (&self.breaker_defaults).try_into()
    }

    /// The default retry policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the retry section is out of range.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        (&self.retry).try_into()
    }

    /// The default retry policy as options for operations failing with `E`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the retry section is out of range.
    pub fn retry_options<E>(&self) -> Result<RetryOptions<E>, ConfigError> {
        self.retry_policy().map(RetryOptions::from)
    }
}

/// Serialized form of [`BreakerOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct BreakerConfig {
    /// Consecutive failed calls that open the breaker. At least 1.
    pub failure_threshold: u32,
    /// Consecutive successful trial calls that close the breaker. At least 1.
    pub success_threshold: u32,
    /// Time the breaker stays open, in milliseconds. At most one year.
    pub timeout_ms: u64,
    /// Trial calls allowed in flight at once. Defaults to `success_threshold`.
    pub half_open_max_calls: Option<u32>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout_ms: duration_to_ms(DEFAULT_TIMEOUT),
            half_open_max_calls: None,
        }
    }
}

impl TryFrom<&BreakerConfig> for BreakerOptions {
    type Error = ConfigError;

    fn try_from(config: &BreakerConfig) -> Result<Self, Self::Error> {
        if config.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be at least 1"));
        }

        if config.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold", "must be at least 1"));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        if timeout > MAX_TIMEOUT {
            return Err(ConfigError::invalid("timeout_ms", "must not exceed one year"));
        }

        let options = Self::default()
            .failure_threshold(config.failure_threshold)
            .success_threshold(config.success_threshold)
            .timeout(timeout);

        match config.half_open_max_calls {
            Some(0) => Err(ConfigError::invalid("half_open_max_calls", "must be at least 1")),
            Some(max_calls) => Ok(options.half_open_max_calls(max_calls)),
            None => Ok(options),
        }
    }
}

/// Serialized form of [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct RetryConfig {
    /// Attempts per logical call, the first one included. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound of every delay, in milliseconds. Not below `initial_delay_ms`.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays. Finite and at least 1.
    pub backoff_factor: f64,
    /// Randomizes every delay by ±25 %.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: duration_to_ms(DEFAULT_INITIAL_DELAY),
            max_delay_ms: duration_to_ms(DEFAULT_MAX_DELAY),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_USE_JITTER,
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        if config.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }

        if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
            return Err(ConfigError::invalid("backoff_factor", "must be a finite number of at least 1"));
        }

        if config.initial_delay_ms > config.max_delay_ms {
            return Err(ConfigError::invalid("initial_delay_ms", "must not exceed max_delay_ms"));
        }

        let backoff = Backoff::default()
            .initial_delay(Duration::from_millis(config.initial_delay_ms))
            .max_delay(Duration::from_millis(config.max_delay_ms))
            .factor(config.backoff_factor)
            .jitter(config.jitter);

        Ok(Self::default().max_attempts(config.max_attempts).backoff(backoff))
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: ResilienceConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, ResilienceConfig::default());
        assert_eq!(config.breaker_options("anything").unwrap(), BreakerOptions::default());

        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.get_max_attempts(), 3);
        assert_eq!(policy.get_backoff().get_initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.get_backoff().get_max_delay(), Duration::from_secs(30));
    }

    #[test]
    fn named_breakers_and_retry_are_parsed() {
        let config: ResilienceConfig = serde_json::from_str(
            r#"{
                "breakers": {
                    "ai-service": { "failure_threshold": 3, "timeout_ms": 30000, "half_open_max_calls": 1 }
                },
                "breaker_defaults": { "success_threshold": 1 },
                "retry": { "max_attempts": 4, "initial_delay_ms": 500, "backoff_factor": 3.0, "jitter": true }
            }"#,
        )
        .unwrap();

        let named = config.breaker_options("ai-service").unwrap();
        assert_eq!(named.get_failure_threshold(), 3);
        assert_eq!(named.get_success_threshold(), 2);
        assert_eq!(named.get_timeout(), Duration::from_secs(30));
        assert_eq!(named.get_half_open_max_calls(), 1);

        let other = config.breaker_options("database").unwrap();
        assert_eq!(other.get_failure_threshold(), 5);
        assert_eq!(other.get_success_threshold(), 1);

        let options = config.retry_options::<std::io::Error>().unwrap();
        let backoff = options.policy().get_backoff();
        assert_eq!(options.policy().get_max_attempts(), 4);
        assert_eq!(backoff.get_initial_delay(), Duration::from_millis(500));
        assert!((backoff.get_factor() - 3.0).abs() < f64::EPSILON);
        assert!(backoff.has_jitter());
    }

    #[rstest]
    #[case(r#"{ "failure_threshold": 0 }"#, "failure_threshold")]
    #[case(r#"{ "success_threshold": 0 }"#, "success_threshold")]
    #[case(r#"{ "half_open_max_calls": 0 }"#, "half_open_max_calls")]
    #[case(r#"{ "timeout_ms": 18446744073709551615 }"#, "timeout_ms")]
    fn invalid_breaker_config_is_rejected(#[case] json: &str, #[case] field: &str) {
        let config: BreakerConfig = serde_json::from_str(json).unwrap();

        let error = BreakerOptions::try_from(&config).unwrap_err();

        assert!(matches!(error, ConfigError::Invalid { field: f, .. } if f == field));
    }

    #[rstest]
    #[case(r#"{ "max_attempts": 0 }"#, "max_attempts")]
    #[case(r#"{ "backoff_factor": 0.5 }"#, "backoff_factor")]
    #[case(r#"{ "initial_delay_ms": 5000, "max_delay_ms": 1000 }"#, "initial_delay_ms")]
    fn invalid_retry_config_is_rejected(#[case] json: &str, #[case] field: &str) {
        let config: RetryConfig = serde_json::from_str(json).unwrap();

        let error = RetryPolicy::try_from(&config).unwrap_err();

        assert!(matches!(error, ConfigError::Invalid { field: f, .. } if f == field));
    }

    #[test]
    fn non_finite_factor_is_rejected() {
        let config = RetryConfig {
            backoff_factor: f64::NAN,
            ..RetryConfig::default()
        };

        assert_eq!(
            RetryPolicy::try_from(&config).unwrap_err().to_string(),
            "invalid backoff_factor: must be a finite number of at least 1"
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = ResilienceConfig::default();
        config.breakers.insert("ai-service".to_string(), BreakerConfig::default());

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ResilienceConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
        assert!(json.contains("\"timeout_ms\":60000"));
    }
}
