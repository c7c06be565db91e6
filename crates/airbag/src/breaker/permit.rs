// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::CircuitBreaker;
use super::engine::{Admission, ExecutionMode, Outcome};

/// Admission ticket of one call through a [`CircuitBreaker`].
///
/// The outcome must be reported exactly once. A permit dropped without an outcome
/// (for example because the caller's future was dropped) is abandoned: it frees its
/// half-open slot and counts neither as a success nor as a failure.
#[derive(Debug)]
#[must_use]
pub(crate) struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    mode: ExecutionMode,
    generation: u64,
    finished: bool,
}

impl<'a> Permit<'a> {
    pub(super) fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            mode: admission.mode,
            generation: admission.generation,
            finished: false,
        }
    }

    pub fn success(mut self) {
        self.finish(Outcome::Success);
    }

    pub fn failure(mut self) {
        self.finish(Outcome::Failure);
    }

    pub fn abandon(mut self) {
        self.finish(Outcome::Abandoned);
    }

    #[cfg(test)]
    pub(crate) fn is_probe(&self) -> bool {
        self.mode == ExecutionMode::Probe
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }

        self.finished = true;
        self.breaker.on_exit(self.mode, self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.finish(Outcome::Abandoned);
    }
}
