// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::utils::ERR_POISONED_LOCK;
use crate::{BreakerOptions, BreakerStats, CircuitBreaker, Context};

/// Table of named circuit breakers, one per downstream dependency.
///
/// Breakers are created lazily on the first [`get`][Self::get] for a name and live as
/// long as the registry. The registry is a plain value: build one at startup, wrap it in
/// an [`Arc`] and hand it to every request handler that talks to the same dependencies.
///
/// ```rust
/// use airbag::{BreakerOptions, BreakerRegistry, Context};
/// use tick::Clock;
///
/// # fn example(clock: Clock) {
/// let registry = BreakerRegistry::new(&Context::new(&clock));
///
/// let breaker = registry.get("ai-service");
/// assert_eq!(breaker.name(), "ai-service");
///
/// let stats = registry.stats();
/// assert!(stats.contains_key("ai-service"));
/// # }
/// ```
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    context: Context,
    default_options: BreakerOptions,
}

impl BreakerRegistry {
    /// Creates an empty registry whose breakers use `context` and the default options.
    #[must_use]
    pub fn new(context: &Context) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            context: context.clone(),
            default_options: BreakerOptions::default(),
        }
    }

    /// Options used by [`get`][Self::get] for breakers created from now on.
    #[must_use]
    pub fn with_default_options(self, options: BreakerOptions) -> Self {
        Self {
            default_options: options,
            ..self
        }
    }

    /// Returns the breaker named `name`, creating it with the default options if needed.
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, &self.default_options)
    }

    /// Returns the breaker named `name`, creating it with `options` if needed.
    ///
    /// The options only apply when the breaker is created. An existing breaker keeps
    /// the options it was created with.
    #[must_use]
    pub fn get_with(&self, name: &str, options: &BreakerOptions) -> Arc<CircuitBreaker> {
        self.get_or_create(name, options)
    }

    /// Returns `true` if a breaker named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.breakers.lock().expect(ERR_POISONED_LOCK).contains_key(name)
    }

    /// Number of breakers created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Returns `true` if no breaker was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the breaker named `name` and clears its counters. The breaker instance
    /// stays registered, so handles held by callers keep working.
    ///
    /// Returns `false` if no such breaker exists.
    pub fn reset(&self, name: &str) -> bool {
        let breaker = self.breakers.lock().expect(ERR_POISONED_LOCK).get(name).cloned();

        let Some(breaker) = breaker else {
            return false;
        };

        breaker.reset();
        true
    }

    /// Resets every registered breaker.
    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
    }

    /// Stats of every breaker, keyed and ordered by name.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, BreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    /// Stats of the breaker named `name`, if it exists.
    #[must_use]
    pub fn stats_for(&self, name: &str) -> Option<BreakerStats> {
        let breaker = self.breakers.lock().expect(ERR_POISONED_LOCK).get(name).cloned();

        breaker.map(|breaker| breaker.stats())
    }

    fn get_or_create(&self, name: &str, options: &BreakerOptions) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect(ERR_POISONED_LOCK);

        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::new(name, options.clone(), &self.context));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    // Breakers are handed out of the lock before touching their own state.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.lock().expect(ERR_POISONED_LOCK).values().cloned().collect()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use static_assertions::assert_impl_all;
    use tick::Clock;

    use super::*;
    use crate::CircuitState;

    assert_impl_all!(BreakerRegistry: Send, Sync, std::fmt::Debug);

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(&Context::new(Clock::new_frozen()))
    }

    #[test]
    fn get_returns_same_instance_per_name() {
        let registry = registry();

        assert!(registry.is_empty());
        assert!(Arc::ptr_eq(&registry.get("ai-service"), &registry.get("ai-service")));
        assert_eq!(registry.len(), 1);

        let _ = registry.get("database");
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("database"));
        assert!(!registry.contains("cache"));
    }

    #[test]
    fn options_apply_only_on_creation() {
        let registry = registry();
        let custom = BreakerOptions::default().failure_threshold(1);

        let first = registry.get_with("ai-service", &custom);
        let second = registry.get_with("ai-service", &BreakerOptions::default());

        assert_eq!(first.options().get_failure_threshold(), 1);
        assert_eq!(second.options().get_failure_threshold(), 1);
    }

    #[test]
    fn default_options_are_used_by_get() {
        let registry = registry().with_default_options(BreakerOptions::default().timeout(Duration::from_secs(5)));

        assert_eq!(registry.get("ai-service").options().get_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn reset_keeps_instance_and_closes_it() {
        let registry = registry();
        let breaker = registry.get("ai-service");
        breaker.force_state(CircuitState::Open);

        assert!(registry.reset("ai-service"));
        assert!(!registry.reset("unknown"));

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(Arc::ptr_eq(&breaker, &registry.get("ai-service")));
    }

    #[test]
    fn reset_all_closes_every_breaker() {
        let registry = registry();
        registry.get("a").force_state(CircuitState::Open);
        registry.get("b").force_state(CircuitState::HalfOpen);

        registry.reset_all();

        assert!(registry.stats().values().all(|stats| stats.state == CircuitState::Closed));
    }

    #[test]
    fn stats_are_ordered_by_name() {
        let registry = registry();
        let _ = registry.get("zeta");
        let _ = registry.get("alpha");
        registry.get("mid").force_state(CircuitState::Open);

        let stats = registry.stats();
        let names: Vec<_> = stats.keys().map(String::as_str).collect();

        assert_eq!(names, ["alpha", "mid", "zeta"]);
        assert_eq!(stats["mid"].state, CircuitState::Open);
        assert_eq!(registry.stats_for("mid"), Some(stats["mid"].clone()));
        assert_eq!(registry.stats_for("unknown"), None);
    }

    #[test]
    fn stats_serialize_for_health_endpoints() {
        let registry = registry();
        let _ = registry.get("ai-service");

        let json = serde_json::to_value(registry.stats()).unwrap();

        assert_eq!(json["ai-service"]["state"], "CLOSED");
        assert_eq!(json["ai-service"]["total_calls"], 0);
    }
}
