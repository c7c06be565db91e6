// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use tick::Clock;

use super::{BreakerOptions, BreakerStats, CircuitState};
use crate::utils::ERR_POISONED_LOCK;

/// How an admitted call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    Normal,
    Probe,
}

/// Outcome reported when a call finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failure,
    /// The call ended without a verdict (dropped or canceled before the operation ran).
    Abandoned,
}

/// State change caused by `enter` or `exit`, reported to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Opened { failures: u32 },
    Reopened,
    HalfOpened,
    Closed { open_duration: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Admission {
    pub mode: ExecutionMode,
    pub generation: u64,
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnterResult {
    Accepted(Admission),
    Rejected { retry_after: Duration },
}

/// Mutex-guarded state machine of a single breaker.
#[derive(Debug)]
pub(crate) struct Engine {
    state: Mutex<State>,
    options: BreakerOptions,
    clock: Clock,
}

impl Engine {
    pub fn new(options: BreakerOptions, clock: Clock) -> Self {
        Self {
            state: Mutex::new(State::default()),
            options,
            clock,
        }
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    pub fn enter(&self) -> EnterResult {
        let now = self.clock.instant();

        // NOTE: Remember to execute all expensive operations (like time checks) outside the lock.
        self.state.lock().expect(ERR_POISONED_LOCK).enter(now, &self.options)
    }

    pub fn exit(&self, mode: ExecutionMode, generation: u64, outcome: Outcome) -> Option<Transition> {
        let now = self.clock.instant();
        let wall = self.clock.system_time();

        self.state
            .lock()
            .expect(ERR_POISONED_LOCK)
            .exit(mode, generation, outcome, now, wall, &self.options)
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().expect(ERR_POISONED_LOCK).phase.circuit_state()
    }

    pub fn stats(&self, name: &str) -> BreakerStats {
        let now = self.clock.instant();
        let state = self.state.lock().expect(ERR_POISONED_LOCK).clone();

        BreakerStats {
            name: name.to_string(),
            state: state.phase.circuit_state(),
            failures: state.failure_count,
            successes: state.success_count,
            last_failure_time: state.last_failure,
            next_attempt_in: match state.phase {
                Phase::Open { until, .. } => Some(until.saturating_duration_since(now)),
                Phase::Closed | Phase::HalfOpen { .. } => None,
            },
            total_calls: state.total_calls,
            total_failures: state.total_failures,
        }
    }

    pub fn reset(&self) {
        self.state.lock().expect(ERR_POISONED_LOCK).reset();
    }

    pub fn force_state(&self, target: CircuitState) {
        let now = self.clock.instant();

        self.state
            .lock()
            .expect(ERR_POISONED_LOCK)
            .force(target, now, &self.options);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open { until: Instant, since: Instant },
    HalfOpen { in_flight: u32, since: Instant },
}

impl Phase {
    fn circuit_state(self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
struct State {
    phase: Phase,
    // Bumped on every phase change; outcomes of calls admitted under an older
    // generation only count toward the lifetime totals.
    generation: u64,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<SystemTime>,
    total_calls: u64,
    total_failures: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            generation: 0,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            total_calls: 0,
            total_failures: 0,
        }
    }
}

impl State {
    fn enter(&mut self, now: Instant, options: &BreakerOptions) -> EnterResult {
        self.total_calls = self.total_calls.saturating_add(1);

        match self.phase {
            Phase::Closed => self.accept(ExecutionMode::Normal, None),
            Phase::Open { until, since } => {
                if now >= until {
                    self.set_phase(Phase::HalfOpen { in_flight: 1, since });
                    self.success_count = 0;
                    self.accept(ExecutionMode::Probe, Some(Transition::HalfOpened))
                } else {
                    EnterResult::Rejected {
                        retry_after: until.saturating_duration_since(now),
                    }
                }
            }
            Phase::HalfOpen { in_flight, since } => {
                if in_flight < options.get_half_open_max_calls() {
                    self.phase = Phase::HalfOpen {
                        in_flight: in_flight.saturating_add(1),
                        since,
                    };
                    self.accept(ExecutionMode::Probe, None)
                } else {
                    EnterResult::Rejected {
                        retry_after: Duration::ZERO,
                    }
                }
            }
        }
    }

    fn exit(
        &mut self,
        mode: ExecutionMode,
        generation: u64,
        outcome: Outcome,
        now: Instant,
        wall: SystemTime,
        options: &BreakerOptions,
    ) -> Option<Transition> {
        if outcome == Outcome::Failure {
            self.total_failures = self.total_failures.saturating_add(1);
            self.last_failure = Some(wall);
        }

        if generation != self.generation {
            return None;
        }

        if let (ExecutionMode::Probe, Phase::HalfOpen { in_flight, since }) = (mode, self.phase) {
            self.phase = Phase::HalfOpen {
                in_flight: in_flight.saturating_sub(1),
                since,
            };
        }

        match (self.phase, outcome) {
            (_, Outcome::Abandoned) | (Phase::Open { .. }, _) => None,
            (Phase::Closed, Outcome::Success) => {
                self.failure_count = 0;
                None
            }
            (Phase::Closed, Outcome::Failure) => {
                self.failure_count = self.failure_count.saturating_add(1);
                if self.failure_count < options.get_failure_threshold() {
                    return None;
                }

                self.set_phase(Phase::Open {
                    until: now + options.get_timeout(),
                    since: now,
                });
                self.success_count = 0;
                Some(Transition::Opened {
                    failures: self.failure_count,
                })
            }
            (Phase::HalfOpen { since, .. }, Outcome::Success) => {
                self.failure_count = 0;
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count < options.get_success_threshold() {
                    return None;
                }

                self.set_phase(Phase::Closed);
                self.success_count = 0;
                Some(Transition::Closed {
                    open_duration: now.saturating_duration_since(since),
                })
            }
            (Phase::HalfOpen { since, .. }, Outcome::Failure) => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.set_phase(Phase::Open {
                    until: now + options.get_timeout(),
                    since,
                });
                self.success_count = 0;
                Some(Transition::Reopened)
            }
        }
    }

    fn reset(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            generation,
            ..Self::default()
        };
    }

    fn force(&mut self, target: CircuitState, now: Instant, options: &BreakerOptions) {
        let phase = match target {
            CircuitState::Closed => Phase::Closed,
            CircuitState::Open => Phase::Open {
                until: now + options.get_timeout(),
                since: now,
            },
            CircuitState::HalfOpen => Phase::HalfOpen { in_flight: 0, since: now },
        };

        self.set_phase(phase);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.generation = self.generation.wrapping_add(1);
    }

    fn accept(&self, mode: ExecutionMode, transition: Option<Transition>) -> EnterResult {
        EnterResult::Accepted(Admission {
            mode,
            generation: self.generation,
            transition,
        })
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn options() -> BreakerOptions {
        BreakerOptions::default()
            .failure_threshold(3)
            .success_threshold(2)
            .timeout(TIMEOUT)
    }

    fn admission(result: EnterResult) -> Admission {
        match result {
            EnterResult::Accepted(admission) => admission,
            EnterResult::Rejected { .. } => panic!("expected the call to be accepted"),
        }
    }

    /// Drives `count` failing calls through the state machine.
    fn fail(state: &mut State, now: Instant, count: u32) -> Option<Transition> {
        let mut last = None;
        for _ in 0..count {
            let admitted = admission(state.enter(now, &options()));
            last = state.exit(admitted.mode, admitted.generation, Outcome::Failure, now, SystemTime::UNIX_EPOCH, &options());
        }
        last
    }

    fn open_state(now: Instant) -> State {
        let mut state = State::default();
        assert_eq!(fail(&mut state, now, 3), Some(Transition::Opened { failures: 3 }));
        state
    }

    #[test]
    fn closed_admits_normal_calls() {
        let mut state = State::default();
        let admitted = admission(state.enter(Instant::now(), &options()));

        assert_eq!(admitted.mode, ExecutionMode::Normal);
        assert_eq!(admitted.transition, None);
        assert_eq!(state.total_calls, 1);
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let now = Instant::now();
        let mut state = State::default();

        assert_eq!(fail(&mut state, now, 2), None);
        assert_eq!(state.phase, Phase::Closed);

        assert_eq!(fail(&mut state, now, 1), Some(Transition::Opened { failures: 3 }));
        assert_eq!(
            state.phase,
            Phase::Open {
                until: now + TIMEOUT,
                since: now
            }
        );
        assert_eq!(state.total_failures, 3);
        assert_eq!(state.success_count, 0);
    }

    #[test]
    fn success_in_closed_resets_failure_streak() {
        let now = Instant::now();
        let mut state = State::default();
        let _ = fail(&mut state, now, 2);

        let admitted = admission(state.enter(now, &options()));
        let _ = state.exit(admitted.mode, admitted.generation, Outcome::Success, now, SystemTime::UNIX_EPOCH, &options());
        assert_eq!(state.failure_count, 0);

        assert_eq!(fail(&mut state, now, 2), None);
        assert_eq!(state.phase, Phase::Closed);
    }

    #[test]
    fn open_rejects_until_timeout() {
        let now = Instant::now();
        let mut state = open_state(now);
        let later = now + Duration::from_secs(30);

        assert_eq!(
            state.enter(later, &options()),
            EnterResult::Rejected {
                retry_after: Duration::from_secs(30)
            }
        );
        assert_eq!(state.total_calls, 4);
    }

    #[test]
    fn first_call_after_timeout_becomes_the_only_probe() {
        let now = Instant::now();
        let options = options().half_open_max_calls(1);
        let mut state = open_state(now);
        let later = now + TIMEOUT;

        let probe = admission(state.enter(later, &options));
        assert_eq!(probe.mode, ExecutionMode::Probe);
        assert_eq!(probe.transition, Some(Transition::HalfOpened));
        assert_eq!(state.phase.circuit_state(), CircuitState::HalfOpen);

        assert_eq!(
            state.enter(later, &options),
            EnterResult::Rejected {
                retry_after: Duration::ZERO
            }
        );
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let now = Instant::now();
        let mut state = open_state(now);
        let later = now + TIMEOUT + Duration::from_millis(1);

        let probe = admission(state.enter(later, &options()));
        assert_eq!(
            state.exit(probe.mode, probe.generation, Outcome::Success, later, SystemTime::UNIX_EPOCH, &options()),
            None
        );
        assert_eq!(state.success_count, 1);

        let probe = admission(state.enter(later, &options()));
        assert_eq!(
            state.exit(probe.mode, probe.generation, Outcome::Success, later, SystemTime::UNIX_EPOCH, &options()),
            Some(Transition::Closed {
                open_duration: TIMEOUT + Duration::from_millis(1)
            })
        );
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.success_count, 0);
    }

    #[test]
    fn failure_in_half_open_reopens_with_new_deadline() {
        let now = Instant::now();
        let mut state = open_state(now);
        let later = now + Duration::from_secs(90);

        let probe = admission(state.enter(later, &options()));
        assert_eq!(
            state.exit(probe.mode, probe.generation, Outcome::Failure, later, SystemTime::UNIX_EPOCH, &options()),
            Some(Transition::Reopened)
        );
        assert_eq!(
            state.phase,
            Phase::Open {
                until: later + TIMEOUT,
                since: now
            }
        );
    }

    #[test]
    fn abandoned_probe_releases_slot_without_verdict() {
        let now = Instant::now();
        let options = options().half_open_max_calls(1);
        let mut state = open_state(now);
        let later = now + TIMEOUT;

        let probe = admission(state.enter(later, &options));
        assert_eq!(
            state.exit(probe.mode, probe.generation, Outcome::Abandoned, later, SystemTime::UNIX_EPOCH, &options),
            None
        );
        assert_eq!(state.phase, Phase::HalfOpen { in_flight: 0, since: now });
        assert_eq!(state.total_failures, 3);

        let next = admission(state.enter(later, &options));
        assert_eq!(next.mode, ExecutionMode::Probe);
        assert_eq!(next.transition, None);
    }

    #[test]
    fn stale_outcome_only_counts_toward_totals() {
        let now = Instant::now();
        let mut state = State::default();
        let slow = admission(state.enter(now, &options()));

        let _ = fail(&mut state, now, 3);
        let before = state.clone();

        assert_eq!(
            state.exit(slow.mode, slow.generation, Outcome::Failure, now, SystemTime::UNIX_EPOCH, &options()),
            None
        );
        assert_eq!(state.phase, before.phase);
        assert_eq!(state.failure_count, before.failure_count);
        assert_eq!(state.total_failures, before.total_failures + 1);
    }

    #[test]
    fn reset_clears_everything() {
        let now = Instant::now();
        let mut state = open_state(now);
        let generation = state.generation;

        state.reset();

        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.total_calls, 0);
        assert_eq!(state.total_failures, 0);
        assert_eq!(state.last_failure, None);
        assert_ne!(state.generation, generation);
    }

    #[test]
    fn force_open_recomputes_deadline() {
        let now = Instant::now();
        let mut state = State::default();

        state.force(CircuitState::Open, now, &options());

        assert_eq!(
            state.phase,
            Phase::Open {
                until: now + TIMEOUT,
                since: now
            }
        );
    }

    #[test]
    fn engine_stats_use_clock() {
        let control = ClockControl::new();
        let engine = Engine::new(options(), control.to_clock());

        for _ in 0..3 {
            let EnterResult::Accepted(admitted) = engine.enter() else {
                panic!("expected the call to be accepted");
            };
            let _ = engine.exit(admitted.mode, admitted.generation, Outcome::Failure);
        }
        control.advance(Duration::from_secs(20));

        let stats = engine.stats("ai-service");
        assert_eq!(stats.name, "ai-service");
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.next_attempt_in, Some(Duration::from_secs(40)));
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_failures, 3);
        assert!(stats.last_failure_time.is_some());
        assert_eq!(engine.state(), CircuitState::Open);
    }
}
