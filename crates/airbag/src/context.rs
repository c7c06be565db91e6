// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use tick::Clock;

use crate::telemetry::TelemetryHelper;

pub(crate) const DEFAULT_PIPELINE_NAME: &str = "default";

/// Shared dependencies of every resilience component: the clock and the telemetry switches.
///
/// Build one `Context` at startup and hand it to the [`BreakerRegistry`][crate::BreakerRegistry],
/// the [`Resilient`][crate::Resilient] invoker or a standalone [`Retry`][crate::retry::Retry]
/// so that all of them agree on time and report under the same pipeline name.
///
/// ```rust
/// use airbag::Context;
/// use tick::Clock;
///
/// # fn example(clock: Clock) {
/// let context = Context::new(&clock).name("chat_handler");
/// # }
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Context {
    clock: Clock,
    name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
    logs_enabled: bool,
}

impl Context {
    /// Creates a context driven by `clock`. The pipeline name defaults to `"default"`.
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            clock: clock.as_ref().clone(),
            name: Cow::Borrowed(DEFAULT_PIPELINE_NAME),
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            logs_enabled: false,
        }
    }

    /// Sets the pipeline name used to correlate telemetry. Prefer `snake_case`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables the `resilience.event` counter on the given OpenTelemetry meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::telemetry::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Enables structured `tracing` events for breaker transitions, retries and fallbacks.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "logs")))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// The clock every time-dependent decision is based on.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The pipeline name reported with every telemetry event.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.name
    }

    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(unused_variables, reason = "unused when neither logs nor metrics are enabled")
    )]
    pub(crate) fn telemetry(&self, strategy_name: impl Into<Cow<'static, str>>) -> TelemetryHelper {
        TelemetryHelper {
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            pipeline_name: self.name.clone(),
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            strategy_name: strategy_name.into(),
            #[cfg(any(feature = "metrics", test))]
            event_reporter: self
                .meter
                .as_ref()
                .map(crate::telemetry::metrics::create_resilience_event_counter),
            #[cfg(any(feature = "logs", test))]
            logs_enabled: self.logs_enabled,
        }
    }
}

impl AsRef<Clock> for Context {
    fn as_ref(&self) -> &Clock {
        &self.clock
    }
}
