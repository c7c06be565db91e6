// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Well-known telemetry keys.
//!
//! The constants below are the attribute keys attached to the `resilience.event`
//! counter (feature `metrics`). Structured log events (feature `logs`) use the shorter
//! `pipeline.name` / `breaker.name` fields instead.
//!
//! Names follow the [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations).

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

mod helper;
pub(crate) use helper::TelemetryHelper;

/// Key used to annotate the name of the pipeline, taken from [`Context::name`][crate::Context::name].
pub const PIPELINE_NAME: &str = "resilience.pipeline.name";

/// Key used to annotate the strategy that emitted an event: the breaker name or `retry`.
pub const STRATEGY_NAME: &str = "resilience.strategy.name";

/// Key used to annotate the resilience event itself, for example `circuit_opened` or `retry`.
pub const EVENT_NAME: &str = "resilience.event.name";

pub(crate) const CIRCUIT_OPENED_EVENT: &str = "circuit_opened";
pub(crate) const CIRCUIT_CLOSED_EVENT: &str = "circuit_closed";
pub(crate) const CIRCUIT_HALF_OPEN_EVENT: &str = "circuit_half_open";
pub(crate) const CIRCUIT_REJECTED_EVENT: &str = "circuit_rejected";
pub(crate) const RETRY_EVENT: &str = "retry";
pub(crate) const FALLBACK_EVENT: &str = "fallback";

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_keys_are_stable() {
        assert_eq!(PIPELINE_NAME, "resilience.pipeline.name");
        assert_eq!(STRATEGY_NAME, "resilience.strategy.name");
        assert_eq!(EVENT_NAME, "resilience.event.name");
    }
}
