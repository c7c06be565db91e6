// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::engine::{Engine, EnterResult, ExecutionMode, Outcome, Transition};
use super::{BreakerOptions, BreakerStats, CircuitState, Permit};
use crate::telemetry::{
    CIRCUIT_CLOSED_EVENT, CIRCUIT_HALF_OPEN_EVENT, CIRCUIT_OPENED_EVENT, CIRCUIT_REJECTED_EVENT, FALLBACK_EVENT, TelemetryHelper,
};
use crate::{CircuitOpen, Context};

/// Why a fallback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FallbackReason {
    CircuitOpen,
    Failure,
}

impl FallbackReason {
    #[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "only used by logs"))]
    fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Failure => "failure",
        }
    }
}

/// Circuit breaker guarding one named dependency.
///
/// The breaker starts `Closed`. After `failure_threshold` consecutive failed calls it
/// opens and short-circuits every call for `timeout`. The first call arriving after the
/// timeout moves it to `HalfOpen` and runs as a trial; `success_threshold` consecutive
/// successful trials close it again, while a single failed trial reopens it.
///
/// The transition out of `Open` happens lazily, when a call arrives. A breaker that
/// sees no traffic stays `Open` indefinitely.
///
/// All state lives behind one mutex, so concurrent callers observe atomic transitions.
///
/// ```rust
/// use airbag::{BreakerOptions, CircuitBreaker, CircuitOpen, Context};
/// use tick::Clock;
///
/// #[derive(Debug)]
/// enum CallError {
///     Rejected(CircuitOpen),
///     Io(std::io::Error),
/// }
///
/// impl From<CircuitOpen> for CallError {
///     fn from(open: CircuitOpen) -> Self {
///         Self::Rejected(open)
///     }
/// }
///
/// # async fn example(clock: Clock) -> Result<(), CallError> {
/// let breaker = CircuitBreaker::new("ai-service", BreakerOptions::default(), &Context::new(&clock));
/// let answer = breaker
///     .execute(|| async { Ok::<_, CallError>("answer".to_string()) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    engine: Engine,
    telemetry: TelemetryHelper,
}

impl CircuitBreaker {
    /// Creates a closed breaker named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, options: BreakerOptions, context: &Context) -> Self {
        let name = name.into();

        Self {
            telemetry: context.telemetry(name.clone()),
            engine: Engine::new(options, context.clock().clone()),
            name,
        }
    }

    /// Name of the guarded dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options the breaker was created with.
    #[must_use]
    pub fn options(&self) -> &BreakerOptions {
        self.engine.options()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.engine.state()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> BreakerStats {
        self.engine.stats(&self.name)
    }

    /// Closes the breaker and clears every counter, lifetime totals included.
    ///
    /// Outcomes of calls admitted before the reset no longer affect the state.
    pub fn reset(&self) {
        self.engine.reset();
    }

    /// Moves the breaker to `state` without touching the counters.
    ///
    /// Forcing `Open` starts a full timeout from now.
    pub fn force_state(&self, state: CircuitState) {
        self.engine.force_state(state);
    }

    /// Runs `operation` if the breaker admits the call and records its outcome.
    ///
    /// # Errors
    ///
    /// Returns the operation's error untouched, or `E::from(CircuitOpen)` when the call
    /// is short-circuited.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        let permit = self.acquire(false)?;
        let result = operation().await;

        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }

        result
    }

    /// Like [`execute`][Self::execute], but runs `fallback` when the call is short-circuited
    /// or when `operation` fails. The failure is recorded before the fallback runs; the
    /// fallback's own result is returned as-is and never recorded.
    ///
    /// # Errors
    ///
    /// Returns the fallback's error if the fallback ran and failed.
    pub async fn execute_with_fallback<T, E, F, Fut, FB, FbFut>(&self, operation: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        let Ok(permit) = self.acquire(true) else {
            self.emit_fallback(FallbackReason::CircuitOpen);
            return fallback().await;
        };

        if let Ok(value) = operation().await {
            permit.success();
            return Ok(value);
        }

        permit.failure();
        self.emit_fallback(FallbackReason::Failure);
        fallback().await
    }

    pub(crate) fn acquire(&self, has_fallback: bool) -> Result<Permit<'_>, CircuitOpen> {
        match self.engine.enter() {
            EnterResult::Accepted(admission) => {
                if let Some(transition) = admission.transition {
                    self.emit_transition(transition);
                }
                Ok(Permit::new(self, admission))
            }
            EnterResult::Rejected { retry_after } => {
                self.emit_rejected(retry_after, has_fallback);
                Err(CircuitOpen::new(self.name.clone(), retry_after))
            }
        }
    }

    pub(crate) fn on_exit(&self, mode: ExecutionMode, generation: u64, outcome: Outcome) {
        if let Some(transition) = self.engine.exit(mode, generation, outcome) {
            self.emit_transition(transition);
        }
    }

    fn emit_transition(&self, transition: Transition) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            self.log_transition(transition);
        }

        self.telemetry.report_event(match transition {
            Transition::Opened { .. } | Transition::Reopened => CIRCUIT_OPENED_EVENT,
            Transition::HalfOpened => CIRCUIT_HALF_OPEN_EVENT,
            Transition::Closed { .. } => CIRCUIT_CLOSED_EVENT,
        });
    }

    #[cfg(any(feature = "logs", test))]
    fn log_transition(&self, transition: Transition) {
        match transition {
            Transition::Opened { failures } => tracing::event!(
                name: "airbag.breaker.opened",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                breaker.failures = failures,
                breaker.failure_threshold = self.options().get_failure_threshold(),
                breaker.timeout = self.options().get_timeout().as_secs_f32(),
            ),
            Transition::Reopened => tracing::event!(
                name: "airbag.breaker.opened",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                breaker.reopened = true,
                breaker.timeout = self.options().get_timeout().as_secs_f32(),
            ),
            Transition::HalfOpened => tracing::event!(
                name: "airbag.breaker.half_open",
                tracing::Level::INFO,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                breaker.state = CircuitState::HalfOpen.as_str(),
            ),
            Transition::Closed { open_duration } => tracing::event!(
                name: "airbag.breaker.closed",
                tracing::Level::INFO,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                breaker.state = CircuitState::Closed.as_str(),
                breaker.open.duration = open_duration.as_secs_f32(),
            ),
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "unused when logs feature not used")
    )]
    fn emit_rejected(&self, retry_after: Duration, has_fallback: bool) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "airbag.breaker.rejected",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
                breaker.retry_after = retry_after.as_secs_f32(),
                breaker.fallback = has_fallback,
            );
        }

        self.telemetry.report_event(CIRCUIT_REJECTED_EVENT);
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "unused when logs feature not used")
    )]
    pub(crate) fn emit_fallback(&self, reason: FallbackReason) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "airbag.fallback",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                breaker.name = %self.name,
                fallback.reason = reason.as_str(),
            );
        }

        self.telemetry.report_event(FALLBACK_EVENT);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::FutureExt;
    use static_assertions::assert_impl_all;
    use tick::{Clock, ClockControl};

    use super::*;
    use crate::testing::LogCapture;

    assert_impl_all!(CircuitBreaker: Send, Sync, std::fmt::Debug);

    #[derive(Debug, PartialEq, Eq, thiserror::Error)]
    enum CallError {
        #[error(transparent)]
        Open(#[from] CircuitOpen),
        #[error("dependency failed")]
        Failed,
    }

    fn breaker(clock: &Clock) -> CircuitBreaker {
        let options = BreakerOptions::default()
            .failure_threshold(2)
            .success_threshold(1)
            .timeout(Duration::from_secs(10));
        CircuitBreaker::new("ai-service", options, &Context::new(clock))
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<u32, CallError> {
        breaker.execute(|| async { Err(CallError::Failed) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, CallError> {
        breaker.execute(|| async { Ok(7) }).await
    }

    #[tokio::test]
    async fn passes_results_through_while_closed() {
        let breaker = breaker(&Clock::new_frozen());

        assert_eq!(succeed(&breaker).await, Ok(7));
        assert_eq!(fail(&breaker).await, Err(CallError::Failed));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().total_calls, 2);
        assert_eq!(breaker.stats().total_failures, 1);
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_running_operation() {
        let breaker = breaker(&Clock::new_frozen());
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        let calls = AtomicU32::new(0);

        let result: Result<u32, CallError> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;

        let Err(CallError::Open(open)) = result else {
            panic!("expected a short-circuited call, got {result:?}");
        };
        assert_eq!(open.name(), "ai-service");
        assert_eq!(open.retry_after(), Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().total_calls, 3);
        assert_eq!(breaker.stats().total_failures, 2);
    }

    #[tokio::test]
    async fn trial_call_after_timeout_closes_breaker() {
        let control = ClockControl::new();
        let breaker = breaker(&control.to_clock());
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        control.advance(Duration::from_secs(10));
        assert_eq!(breaker.state(), CircuitState::Open);

        assert_eq!(succeed(&breaker).await, Ok(7));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn fallback_runs_when_open_and_after_failure() {
        let breaker = breaker(&Clock::new_frozen());

        let after_failure = breaker
            .execute_with_fallback(|| async { Err::<&str, _>(CallError::Failed) }, || async { Ok("fallback") })
            .await;
        assert_eq!(after_failure, Ok("fallback"));
        assert_eq!(breaker.stats().failures, 1);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let short_circuited = breaker
            .execute_with_fallback(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("primary")
                },
                || async { Ok::<_, CallError>("fallback") },
            )
            .await;
        assert_eq!(short_circuited, Ok("fallback"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_failure_is_not_recorded() {
        let breaker = breaker(&Clock::new_frozen());

        let result = breaker
            .execute_with_fallback(|| async { Ok::<u32, _>(1) }, || async { Err(CallError::Failed) })
            .await;
        assert_eq!(result, Ok(1));

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        let result = breaker
            .execute_with_fallback(|| async { Ok::<u32, _>(1) }, || async { Err(CallError::Failed) })
            .await;

        assert_eq!(result, Err(CallError::Failed));
        assert_eq!(breaker.stats().total_failures, 2);
    }

    #[test]
    fn dropped_call_is_abandoned() {
        let control = ClockControl::new();
        let breaker = CircuitBreaker::new(
            "ai-service",
            BreakerOptions::default()
                .failure_threshold(1)
                .half_open_max_calls(1)
                .timeout(Duration::from_secs(1)),
            &Context::new(control.to_clock()),
        );
        breaker.force_state(CircuitState::Open);
        control.advance(Duration::from_secs(1));

        // the trial call never completes and its future is dropped
        let pending = breaker.execute(|| std::future::pending::<Result<(), CallError>>());
        assert!(pending.now_or_never().is_none());

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.total_failures, 0);

        let permit = breaker.acquire(false).unwrap();
        assert!(permit.is_probe());
    }

    #[tokio::test]
    async fn reset_and_force_state() {
        let breaker = breaker(&Clock::new_frozen());
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        breaker.reset();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.last_failure_time, None);

        breaker.force_state(CircuitState::Open);
        assert_eq!(breaker.stats().next_attempt_in, Some(Duration::from_secs(10)));
        breaker.force_state(CircuitState::Closed);
        assert_eq!(succeed(&breaker).await, Ok(7));
    }

    #[tokio::test]
    async fn transitions_emit_logs() {
        use tracing_subscriber::util::SubscriberInitExt;

        let log_capture = LogCapture::default();
        let _guard = log_capture.subscriber().set_default();

        let control = ClockControl::new();
        let context = Context::new(control.to_clock()).name("chat").enable_logs();
        let breaker = CircuitBreaker::new(
            "ai-service",
            BreakerOptions::default().failure_threshold(1).success_threshold(1),
            &context,
        );

        let _ = fail(&breaker).await;
        let _ = succeed(&breaker).await;
        control.advance(Duration::from_secs(60));
        let _ = succeed(&breaker).await;

        log_capture.assert_contains("breaker.name=ai-service");
        log_capture.assert_contains("pipeline.name=chat");
        log_capture.assert_contains("breaker.failure_threshold=1");
        log_capture.assert_contains("breaker.fallback=false");
        log_capture.assert_contains("breaker.state=\"half_open\"");
        log_capture.assert_contains("breaker.open.duration");
        log_capture.assert_contains("breaker.state=\"closed\"");
    }

    #[cfg(not(miri))]
    #[tokio::test]
    async fn transitions_report_metrics() {
        let exporter = opentelemetry_sdk::metrics::InMemoryMetricExporter::default();
        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_periodic_exporter(exporter.clone())
            .build();
        let context = Context::new(Clock::new_frozen()).enable_metrics(&provider);
        let breaker = CircuitBreaker::new("ai-service", BreakerOptions::default().failure_threshold(1), &context);

        let _ = fail(&breaker).await;
        let _ = breaker
            .execute_with_fallback(|| async { Ok::<u32, CallError>(1) }, || async { Ok(2) })
            .await;
        provider.force_flush().unwrap();

        let dump = format!("{:?}", exporter.get_finished_metrics().unwrap());
        assert!(dump.contains(CIRCUIT_OPENED_EVENT));
        assert!(dump.contains(CIRCUIT_REJECTED_EVENT));
        assert!(dump.contains(FALLBACK_EVENT));
        assert!(dump.contains("ai-service"));
    }
}
