// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exponential backoff with a ceiling.
//!
//! A [`Backoff`] describes the delays slept between retry attempts: the first delay is
//! `initial_delay`, every following delay is the previous one multiplied by `factor`,
//! and no delay ever exceeds `max_delay`.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use airbag::backoff::Backoff;
//!
//! let backoff = Backoff::default()
//!     .initial_delay(Duration::from_millis(1000))
//!     .factor(2.0)
//!     .max_delay(Duration::from_millis(30_000));
//!
//! let millis: Vec<u128> = backoff.delays().take(7).map(|d| d.as_millis()).collect();
//! assert_eq!(millis, [1000, 2000, 4000, 8000, 16000, 30000, 30000]);
//! ```

use std::cmp::min;
use std::time::Duration;

use crate::retry::constants::{DEFAULT_BACKOFF_FACTOR, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, DEFAULT_USE_JITTER};
use crate::rnd::Rnd;

/// The factor used to determine the range of jitter applied to delays.
const JITTER_FACTOR: f64 = 0.5;

/// Value object computing the delays between retry attempts.
///
/// Defaults: `initial_delay` 1 s, `max_delay` 30 s, `factor` 2.0, no jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
    rnd: Rnd,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_USE_JITTER,
            rnd: Rnd::default(),
        }
    }
}

impl Backoff {
    /// Sets the delay slept after the first failed attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the ceiling no delay ever exceeds.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor applied after every attempt.
    ///
    /// Values below `1.0` (and `NaN`) are raised to `1.0`, which yields a constant backoff.
    #[must_use]
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = if factor >= 1.0 { factor } else { 1.0 };
        self
    }

    /// Randomizes every delay by up to ±25 % before applying the ceiling.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    #[cfg(test)]
    pub(crate) fn rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// The delay slept after the first failed attempt.
    #[must_use]
    pub fn get_initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// The ceiling no delay ever exceeds.
    #[must_use]
    pub fn get_max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The growth factor applied after every attempt.
    #[must_use]
    pub fn get_factor(&self) -> f64 {
        self.factor
    }

    /// Whether delays are randomized.
    #[must_use]
    pub fn has_jitter(&self) -> bool {
        self.jitter
    }

    /// Returns the endless sequence of delays, one per retry.
    #[must_use]
    pub fn delays(&self) -> Delays {
        Delays {
            current: self.initial_delay.as_secs_f64(),
            max_delay: self.max_delay,
            factor: self.factor,
            jitter: self.jitter,
            rnd: self.rnd.clone(),
        }
    }
}

/// Endless iterator over the delays of a [`Backoff`]. Created by [`Backoff::delays`].
#[derive(Debug, Clone)]
pub struct Delays {
    // Seconds of the next un-jittered delay, already capped.
    current: f64,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
    rnd: Rnd,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let max_secs = self.max_delay.as_secs_f64();
        let delay = clamp_to_max(secs_to_duration_saturating(self.current), self.max_delay);

        // zero stays zero, and a capped delay stays capped
        self.current = (self.current * self.factor).min(max_secs);

        if self.jitter {
            Some(clamp_to_max(apply_jitter(delay, &self.rnd), self.max_delay))
        } else {
            Some(delay)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

fn clamp_to_max(d: Duration, max: Duration) -> Duration {
    min(d, max)
}

/// Adds a symmetric, uniform jitter around the given delay.
///
/// With `JITTER_FACTOR = 0.5`, the result lies in `[0.75*delay, 1.25*delay]`.
#[inline]
fn apply_jitter(delay: Duration, rnd: &Rnd) -> Duration {
    let ms = delay.as_secs_f64() * 1000.0;
    let offset = (ms * JITTER_FACTOR) / 2.0;
    let random_delay = (ms * JITTER_FACTOR).mul_add(rnd.next_f64(), -offset);

    secs_to_duration_saturating((ms + random_delay) / 1000.0)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
