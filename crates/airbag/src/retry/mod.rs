// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retry with exponential backoff.
//!
//! [`Retry`] runs an async operation up to `max_attempts` times. Between two attempts
//! it sleeps for the next delay of the configured [`Backoff`][crate::backoff::Backoff].
//! A retry predicate (see [`predicates`]) separates transient failures, which are
//! retried, from permanent ones, which stop the loop at once.
//!
//! # Defaults
//!
//! | Option           | Default      |
//! |------------------|--------------|
//! | `max_attempts`   | 3            |
//! | `initial_delay`  | 1 s          |
//! | `max_delay`      | 30 s         |
//! | `backoff_factor` | 2.0          |
//! | `jitter`         | off          |
//! | `should_retry`   | every error  |
//!
//! # Cancellation
//!
//! A [`CancellationToken`][tokio_util::sync::CancellationToken] passed through
//! [`RetryOptions::cancellation`] aborts the loop, whether an attempt is in flight or
//! the executor is sleeping. The result is [`Error::Canceled`][crate::Error::Canceled].

pub(crate) mod constants;

mod options;
pub use options::{RetryOptions, RetryPolicy};

pub mod predicates;

mod report;
pub use report::RetryReport;

mod service;
pub use service::Retry;
