// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Shields an application from a slow or failing downstream dependency.
//!
//! The crate combines three classic resilience mechanisms behind a single entry point:
//!
//! - [`backoff`]: computes the (capped, exponential) delays between retry attempts.
//! - [`retry`]: re-invokes a fallible operation until it succeeds, hits a permanent
//!   error, or runs out of attempts.
//! - [`breaker`]: a per-dependency circuit breaker that stops calling a dependency
//!   after repeated failures and lazily probes it again once a timeout has elapsed.
//!
//! [`BreakerRegistry`] keeps one named [`CircuitBreaker`] per dependency and
//! [`Resilient`] composes everything: the breaker wraps the retry loop, and an optional
//! fallback produces a value when the primary path is unavailable.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use airbag::retry::RetryOptions;
//! use airbag::{Context, Error, Resilient};
//! use tick::Clock;
//!
//! # async fn ask_rag_service(_: &str) -> Result<String, std::io::Error> { Ok("answer".to_string()) }
//! # async fn example(clock: Clock) {
//! let context = Context::new(&clock).name("chat");
//! let resilient = Resilient::new(&context);
//!
//! let options = RetryOptions::default()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(500));
//!
//! let reply: Result<String, Error<std::io::Error>> = resilient
//!     .execute_with_fallback(
//!         "ai-service",
//!         || ask_rag_service("Which aid can my child receive?"),
//!         || async { Ok("The assistant is unavailable right now, please try again later.".to_string()) },
//!         Some(&options),
//!     )
//!     .await;
//! # }
//! ```
//!
//! # Time
//!
//! Every time-dependent decision goes through the [`Clock`][tick::Clock] carried by
//! [`Context`]. Production code drives the clock from an async runtime (for example
//! `Clock::new_tokio()` with the `tokio` feature), while tests use
//! `tick::ClockControl` to move time forward without sleeping.
//!
//! # Features
//!
//! - `logs`: emits structured [`tracing`](https://docs.rs/tracing) events for breaker
//!   transitions, retries and fallbacks once [`Context::enable_logs`] is called.
//! - `metrics`: reports the `resilience.event` OpenTelemetry counter once
//!   `Context::enable_metrics` is called.
//! - `serde`: enables the `config` module and makes [`BreakerStats`] serializable.
//! - `tokio`: lets the `tick` clock be driven by the Tokio runtime.

#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

mod utils;

mod context;
pub use context::Context;

mod error;
pub use error::{CircuitOpen, ConfigError, Error};

mod rnd;

pub mod backoff;

pub mod retry;

pub mod breaker;
#[doc(inline)]
pub use breaker::{BreakerOptions, BreakerStats, CircuitBreaker, CircuitState};

mod registry;
pub use registry::BreakerRegistry;

mod invoker;
pub use invoker::Resilient;

pub mod telemetry;

#[cfg(any(feature = "serde", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
pub mod config;

#[cfg(test)]
mod testing;
