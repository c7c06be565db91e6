// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::pin;
use std::time::Duration;

use futures_util::future::{Either, select};
use tick::Clock;

use super::constants::RETRY_STRATEGY_NAME;
use super::{RetryOptions, RetryReport};
use crate::telemetry::{RETRY_EVENT, TelemetryHelper};
use crate::{Context, Error};

/// Re-invokes a fallible async operation according to [`RetryOptions`].
///
/// Every attempt calls the operation closure again. When an attempt fails:
///
/// - a non-retryable error stops immediately with [`Error::Permanent`],
/// - the last allowed attempt stops with [`Error::RetriesExhausted`],
/// - otherwise the executor sleeps for the next backoff delay and tries again.
///
/// Sleeping goes through the [`Clock`] of the [`Context`], so it never blocks other tasks.
///
/// ```rust
/// use airbag::Context;
/// use airbag::retry::{Retry, RetryOptions};
/// use tick::Clock;
///
/// # async fn fetch() -> Result<u32, std::io::Error> { Ok(42) }
/// # async fn example(clock: Clock) -> Result<(), airbag::Error<std::io::Error>> {
/// let retry = Retry::new(&Context::new(&clock));
/// let value = retry.run(fetch, &RetryOptions::default().max_attempts(5)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Retry {
    clock: Clock,
    telemetry: TelemetryHelper,
}

impl Retry {
    /// Creates an executor using the clock and telemetry settings of `context`.
    #[must_use]
    pub fn new(context: &Context) -> Self {
        Self {
            clock: context.clock().clone(),
            telemetry: context.telemetry(RETRY_STRATEGY_NAME),
        }
    }

    /// Runs `operation` until it succeeds or the options say to stop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permanent`], [`Error::RetriesExhausted`] or [`Error::Canceled`]
    /// carrying the error of the last completed attempt.
    pub async fn run<T, E, F, Fut>(&self, operation: F, options: &RetryOptions<E>) -> Result<T, Error<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(operation, options).await.0
    }

    /// Same as [`run`][Self::run], additionally reporting the number of attempts and the
    /// total elapsed time. Retry behavior is identical.
    pub async fn run_with_stats<T, E, F, Fut>(&self, operation: F, options: &RetryOptions<E>) -> RetryReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let stopwatch = self.clock.stopwatch();
        let (result, attempts) = self.execute(operation, options).await;

        RetryReport {
            result,
            attempts,
            total_duration: stopwatch.elapsed(),
        }
    }

    async fn execute<T, E, F, Fut>(&self, mut operation: F, options: &RetryOptions<E>) -> (Result<T, Error<E>>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = options.policy.max_attempts;
        let mut delays = options.policy.backoff.delays();
        let mut attempts: u32 = 0;
        let mut last_error: Option<E> = None;

        loop {
            if options.is_canceled() {
                return (Err(Error::Canceled { attempts, last_error }), attempts);
            }

            let outcome = match &options.cancellation {
                Some(token) => match select(pin!(operation()), pin!(token.cancelled())).await {
                    Either::Left((outcome, _)) => outcome,
                    Either::Right(_) => return (Err(Error::Canceled { attempts, last_error }), attempts),
                },
                None => operation().await,
            };

            attempts = attempts.saturating_add(1);

            let error = match outcome {
                Ok(value) => return (Ok(value), attempts),
                Err(error) => error,
            };

            if !options.is_retryable(&error) {
                self.emit_permanent(attempts);
                return (Err(Error::Permanent { attempts, source: error }), attempts);
            }

            if attempts >= max_attempts {
                self.emit_exhausted(attempts);
                return (Err(Error::RetriesExhausted { attempts, source: error }), attempts);
            }

            let delay = delays.next().unwrap_or_default();
            self.emit_retry(attempts, max_attempts, delay);
            last_error = Some(error);

            match &options.cancellation {
                Some(token) => {
                    if let Either::Right(_) = select(pin!(self.clock.delay(delay)), pin!(token.cancelled())).await {
                        return (Err(Error::Canceled { attempts, last_error }), attempts);
                    }
                }
                None => self.clock.delay(delay).await,
            }
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "unused when logs feature not used")
    )]
    fn emit_retry(&self, attempt: u32, max_attempts: u32, delay: Duration) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "airbag.retry",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                retry.attempt = attempt,
                retry.max_attempts = max_attempts,
                retry.delay = delay.as_secs_f32(),
            );
        }

        self.telemetry.report_event(RETRY_EVENT);
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs feature not used")
    )]
    fn emit_exhausted(&self, attempts: u32) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "airbag.retry.exhausted",
                tracing::Level::ERROR,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                retry.attempts = attempts,
            );
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs feature not used")
    )]
    fn emit_permanent(&self, attempts: u32) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "airbag.retry.permanent",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                retry.attempts = attempts,
            );
        }
    }
}
