// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};

/// Returned when a circuit breaker short-circuits a call.
///
/// `retry_after` is the time left until the breaker admits a trial call. It is zero
/// when the breaker is already half-open and every probe slot is taken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit '{name}' is open, retry after {retry_after:?}")]
pub struct CircuitOpen {
    name: String,
    retry_after: Duration,
}

impl CircuitOpen {
    pub(crate) fn new(name: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            name: name.into(),
            retry_after,
        }
    }

    /// Name of the breaker that rejected the call.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time left until the breaker admits a trial call.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

impl Recovery for CircuitOpen {
    fn recovery(&self) -> RecoveryInfo {
        RecoveryInfo::unavailable().delay(self.retry_after)
    }
}

/// Failure of a logical call made through [`Retry`][crate::retry::Retry] or
/// [`Resilient`][crate::Resilient].
///
/// `E` is the error type of the protected operation. Every variant that carries an
/// operation error keeps it intact, so callers can still inspect the root cause.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The breaker short-circuited the call and no fallback was configured.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    /// The operation failed with an error classified as non-retryable.
    #[error("operation failed with a non-retryable error after {attempts} attempt(s)")]
    Permanent {
        /// Number of times the operation ran.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: E,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("operation failed after {attempts} attempt(s)")]
    RetriesExhausted {
        /// Number of times the operation ran.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: E,
    },

    /// The caller canceled the logical call.
    #[error("operation canceled after {attempts} attempt(s)")]
    Canceled {
        /// Number of attempts that ran to completion before cancellation.
        attempts: u32,
        /// The error of the last completed attempt, if any attempt completed.
        last_error: Option<E>,
    },

    /// The fallback ran and failed. Fallback failures never reach breaker bookkeeping.
    #[error("fallback failed")]
    Fallback {
        /// The error returned by the fallback.
        #[source]
        source: E,
    },
}

impl<E> Error<E> {
    /// Returns `true` if the call was short-circuited by an open breaker.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    /// Number of operation attempts behind this error. Zero when the operation never ran
    /// or when the error comes from the fallback.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::RetriesExhausted { attempts, .. } | Self::Canceled { attempts, .. } => *attempts,
            Self::CircuitOpen(_) | Self::Fallback { .. } => 0,
        }
    }

    /// The operation (or fallback) error carried by this error, if any.
    #[must_use]
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Permanent { source, .. } | Self::RetriesExhausted { source, .. } | Self::Fallback { source } => Some(source),
            Self::Canceled { last_error, .. } => last_error.as_ref(),
            Self::CircuitOpen(_) => None,
        }
    }

    /// Consumes the error and returns the operation (or fallback) error, if any.
    #[must_use]
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Permanent { source, .. } | Self::RetriesExhausted { source, .. } | Self::Fallback { source } => Some(source),
            Self::Canceled { last_error, .. } => last_error,
            Self::CircuitOpen(_) => None,
        }
    }
}

impl<E> Recovery for Error<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::CircuitOpen(open) => open.recovery(),
            Self::RetriesExhausted { .. } => RecoveryInfo::retry(),
            Self::Permanent { .. } | Self::Canceled { .. } | Self::Fallback { .. } => RecoveryInfo::never(),
        }
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field holds a value outside of its allowed range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What the field must satisfy.
        reason: &'static str,
    },
}

impl ConfigError {
    #[cfg(any(feature = "serde", test))]
    pub(crate) const fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
