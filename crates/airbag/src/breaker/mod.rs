// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-dependency circuit breaker.
//!
//! A [`CircuitBreaker`] moves between three states:
//!
//! ```text
//!            failure_threshold consecutive failures
//!   Closed ──────────────────────────────────────────▶ Open
//!     ▲                                                 │
//!     │ success_threshold                               │ first call after `timeout`
//!     │ consecutive successes                           ▼
//!     └──────────────────────────────────────────── HalfOpen
//!                        any failure: back to Open ◀───┘
//! ```
//!
//! - **Closed**: calls pass through. A success clears the failure streak.
//! - **Open**: calls are rejected with [`CircuitOpen`][crate::CircuitOpen] (or routed to a
//!   fallback) without reaching the dependency.
//! - **HalfOpen**: up to `half_open_max_calls` trial calls run at once; the rest are rejected.
//!
//! # Defaults
//!
//! | Option                | Default             |
//! |-----------------------|---------------------|
//! | `failure_threshold`   | 5                   |
//! | `success_threshold`   | 2                   |
//! | `timeout`             | 60 s                |
//! | `half_open_max_calls` | `success_threshold` |
//!
//! Breakers are usually obtained by name from a [`BreakerRegistry`][crate::BreakerRegistry],
//! which keeps one breaker per dependency for the lifetime of the process.

pub(crate) mod constants;

mod options;
pub use options::BreakerOptions;

mod state;
pub use state::{BreakerStats, CircuitState};

mod engine;

mod permit;
pub(crate) use permit::Permit;

mod circuit_breaker;
pub(crate) use circuit_breaker::FallbackReason;
pub use circuit_breaker::CircuitBreaker;
