// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::Duration;

use recoverable::Recovery;
use tokio_util::sync::CancellationToken;

use super::constants::DEFAULT_MAX_ATTEMPTS;
use crate::backoff::Backoff;
use crate::utils::define_fn_wrapper;

define_fn_wrapper!(ShouldRetry<E>(Fn(error: &E) -> bool));

/// How many times an operation runs and how long to wait in between.
///
/// A `RetryPolicy` is independent of the operation's error type, which lets the
/// [`Resilient`][crate::Resilient] invoker hold one default policy for every call.
///
/// Defaults: 3 attempts, delays of 1 s, 2 s, 4 s ... capped at 30 s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Sets the total number of attempts, including the first one. Raised to at least 1.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Replaces the backoff used between attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// The total number of attempts, including the first one.
    #[must_use]
    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The backoff used between attempts.
    #[must_use]
    pub fn get_backoff(&self) -> &Backoff {
        &self.backoff
    }
}

/// Options of one retried logical call.
///
/// Wraps a [`RetryPolicy`] with the parts that depend on the operation's error type
/// (the retry predicate) or on the caller (the cancellation token).
///
/// ```rust
/// use std::time::Duration;
///
/// use airbag::retry::{RetryOptions, predicates};
///
/// let options = RetryOptions::<std::io::Error>::default()
///     .max_attempts(4)
///     .initial_delay(Duration::from_millis(200))
///     .max_delay(Duration::from_secs(5))
///     .should_retry(predicates::network_error);
/// ```
pub struct RetryOptions<E> {
    pub(crate) policy: RetryPolicy,
    pub(crate) should_retry: Option<ShouldRetry<E>>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::from(RetryPolicy::default())
    }
}

impl<E> From<RetryPolicy> for RetryOptions<E> {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: None,
            cancellation: None,
        }
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            should_retry: self.should_retry.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<E> Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("policy", &self.policy)
            .field("should_retry", &self.should_retry)
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

impl<E> RetryOptions<E> {
    /// Sets the total number of attempts, including the first one. Raised to at least 1.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy = self.policy.max_attempts(max_attempts);
        self
    }

    /// Sets the delay slept after the first failed attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.backoff = self.policy.backoff.initial_delay(delay);
        self
    }

    /// Sets the ceiling no delay ever exceeds.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.backoff = self.policy.backoff.max_delay(delay);
        self
    }

    /// Sets the growth factor of the delays. Values below `1.0` are raised to `1.0`.
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.policy.backoff = self.policy.backoff.factor(factor);
        self
    }

    /// Randomizes every delay by up to ±25 %.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.policy.backoff = self.policy.backoff.jitter(enabled);
        self
    }

    /// Replaces the whole backoff.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// Classifies errors: `true` retries, `false` stops immediately with
    /// [`Error::Permanent`][crate::Error::Permanent]. Without a predicate every error is retried.
    #[must_use]
    pub fn should_retry(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(ShouldRetry::new(predicate));
        self
    }

    /// Retries only the errors whose [`Recovery`] classification is `Retry`.
    #[must_use]
    pub fn recovery(self) -> Self
    where
        E: Recovery + 'static,
    {
        self.should_retry(super::predicates::recoverable::<E>)
    }

    /// Aborts the logical call as soon as `token` is canceled, including while an attempt
    /// is in flight or while sleeping between attempts.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The error-independent part of these options.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn is_retryable(&self, error: &E) -> bool {
        self.should_retry.as_ref().is_none_or(|predicate| predicate.call(error))
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
