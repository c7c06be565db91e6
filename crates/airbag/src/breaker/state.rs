// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::time::{Duration, SystemTime};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CircuitState {
    /// Calls pass through and failures are counted.
    Closed,
    /// Calls are short-circuited until the timeout elapses.
    Open,
    /// Trial calls probe whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns the `snake_case` name of the state, as used in telemetry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a breaker, for health and monitoring endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize))]
#[non_exhaustive]
pub struct BreakerStats {
    /// Name of the breaker.
    pub name: String,
    /// Current state. An open breaker whose timeout elapsed stays `Open` until the next call.
    pub state: CircuitState,
    /// Consecutive failures counted toward opening the breaker.
    pub failures: u32,
    /// Consecutive successes counted toward closing a half-open breaker.
    pub successes: u32,
    /// Wall-clock time of the most recent failure.
    pub last_failure_time: Option<SystemTime>,
    /// Time left until a trial call is admitted. Only set while `Open`.
    pub next_attempt_in: Option<Duration>,
    /// Calls made through the breaker, short-circuited ones included.
    pub total_calls: u64,
    /// Calls whose operation failed.
    pub total_failures: u64,
}
