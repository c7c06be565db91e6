// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::Error;

/// Outcome of [`Retry::run_with_stats`][super::Retry::run_with_stats]: the result plus
/// the number of attempts and the total time spent, backoff delays included.
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub(crate) result: Result<T, Error<E>>,
    pub(crate) attempts: u32,
    pub(crate) total_duration: Duration,
}

impl<T, E> RetryReport<T, E> {
    /// Returns `true` if one of the attempts succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// Number of times the operation ran.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time elapsed between the first attempt and the final outcome.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// The result of the logical call.
    #[must_use]
    pub fn result(&self) -> &Result<T, Error<E>> {
        &self.result
    }

    /// Consumes the report and returns the result of the logical call.
    pub fn into_result(self) -> Result<T, Error<E>> {
        self.result
    }
}
