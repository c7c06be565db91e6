// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Per-component telemetry handle created by [`Context::telemetry`][crate::Context].
#[derive(Debug, Clone)]
pub(crate) struct TelemetryHelper {
    #[cfg(any(feature = "metrics", feature = "logs", test))]
    pub(crate) pipeline_name: std::borrow::Cow<'static, str>,
    #[cfg(any(feature = "metrics", feature = "logs", test))]
    pub(crate) strategy_name: std::borrow::Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    #[cfg(any(feature = "logs", test))]
    pub(crate) logs_enabled: bool,
}

impl TelemetryHelper {
    /// Increments the `resilience.event` counter, if metrics are enabled.
    #[cfg_attr(
        not(any(feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when metrics feature not used")
    )]
    pub(crate) fn report_event(&self, event_name: &'static str) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.event_reporter {
            use super::{EVENT_NAME, PIPELINE_NAME, STRATEGY_NAME};

            reporter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(PIPELINE_NAME, self.pipeline_name.clone()),
                    opentelemetry::KeyValue::new(STRATEGY_NAME, self.strategy_name.clone()),
                    opentelemetry::KeyValue::new(EVENT_NAME, event_name),
                ],
            );
        }
    }
}
