// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_SUCCESS_THRESHOLD, DEFAULT_TIMEOUT, MAX_TIMEOUT};

/// Thresholds and timeout of a [`CircuitBreaker`][super::CircuitBreaker].
///
/// | Option                | Default                 |
/// |-----------------------|-------------------------|
/// | `failure_threshold`   | 5                       |
/// | `success_threshold`   | 2                       |
/// | `timeout`             | 60 s                    |
/// | `half_open_max_calls` | `success_threshold`     |
///
/// Setters never fail: counts are raised to at least 1 and the timeout is capped at one year.
///
/// ```rust
/// use std::time::Duration;
///
/// use airbag::BreakerOptions;
///
/// let options = BreakerOptions::default()
///     .failure_threshold(3)
///     .timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerOptions {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    half_open_max_calls: Option<u32>,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            half_open_max_calls: None,
        }
    }
}

impl BreakerOptions {
    /// Consecutive failed calls that open a closed breaker.
    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Consecutive successful trial calls that close a half-open breaker.
    #[must_use]
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// How long the breaker stays open before admitting a trial call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    /// Trial calls allowed in flight at once while half-open.
    #[must_use]
    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.half_open_max_calls = Some(max_calls.max(1));
        self
    }

    /// Consecutive failed calls that open a closed breaker.
    #[must_use]
    pub fn get_failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Consecutive successful trial calls that close a half-open breaker.
    #[must_use]
    pub fn get_success_threshold(&self) -> u32 {
        self.success_threshold
    }

    /// How long the breaker stays open before admitting a trial call.
    #[must_use]
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Trial calls allowed in flight at once while half-open.
    #[must_use]
    pub fn get_half_open_max_calls(&self) -> u32 {
        self.half_open_max_calls.unwrap_or(self.success_threshold)
    }
}
