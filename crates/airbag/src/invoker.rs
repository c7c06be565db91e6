// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::breaker::FallbackReason;
use crate::retry::{Retry, RetryOptions, RetryPolicy};
use crate::{BreakerRegistry, BreakerStats, Context, Error};

/// Single entry point for calls to a protected dependency.
///
/// Every call goes through the named breaker first, then through the retry loop:
///
/// ```text
/// caller ─▶ breaker ─▶ retry ─▶ operation (attempt 1..=max_attempts)
///              │
///              └─▶ fallback (circuit open, or the retry loop failed)
/// ```
///
/// The breaker sees one outcome per logical call: success if any attempt succeeded,
/// failure if the retry loop gave up. The `failure_threshold` of a breaker therefore
/// counts failed logical calls, never individual attempts.
///
/// Cloning is cheap and every clone shares the same [`BreakerRegistry`].
///
/// ```rust
/// use airbag::retry::RetryOptions;
/// use airbag::{Context, Resilient};
/// use tick::Clock;
///
/// # async fn call_dependency() -> Result<String, std::io::Error> { Ok("answer".to_string()) }
/// # async fn example(clock: Clock) -> Result<(), airbag::Error<std::io::Error>> {
/// let resilient = Resilient::new(&Context::new(&clock));
///
/// let answer = resilient
///     .execute("ai-service", call_dependency, Some(&RetryOptions::default().max_attempts(2)))
///     .await?;
///
/// for (name, stats) in resilient.stats() {
///     println!("{name}: {} ({} calls)", stats.state, stats.total_calls);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Resilient {
    registry: Arc<BreakerRegistry>,
    retry: Retry,
    default_policy: RetryPolicy,
}

impl Resilient {
    /// Creates an invoker with its own, empty breaker registry.
    #[must_use]
    pub fn new(context: &Context) -> Self {
        Self::with_registry(context, Arc::new(BreakerRegistry::new(context)))
    }

    /// Creates an invoker on top of an existing registry.
    #[must_use]
    pub fn with_registry(context: &Context, registry: Arc<BreakerRegistry>) -> Self {
        Self {
            registry,
            retry: Retry::new(context),
            default_policy: RetryPolicy::default(),
        }
    }

    /// Creates an invoker from a deserialized configuration.
    ///
    /// The named breakers are registered up front, `breaker_defaults` applies to breakers
    /// created later on and `retry` becomes the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`][crate::ConfigError] if any section is out of range.
    #[cfg(any(feature = "serde", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
    pub fn from_config(context: &Context, config: &crate::config::ResilienceConfig) -> Result<Self, crate::ConfigError> {
        let registry = BreakerRegistry::new(context).with_default_options(config.default_breaker_options()?);
        for name in config.breakers.keys() {
            let _ = registry.get_with(name, &config.breaker_options(name)?);
        }

        Ok(Self::with_registry(context, Arc::new(registry)).with_default_retry(config.retry_policy()?))
    }

    /// Retry policy used when a call passes no [`RetryOptions`].
    #[must_use]
    pub fn with_default_retry(self, policy: RetryPolicy) -> Self {
        Self {
            default_policy: policy,
            ..self
        }
    }

    /// The registry holding the breakers of this invoker.
    #[must_use]
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Stats of every breaker, keyed and ordered by name.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, BreakerStats> {
        self.registry.stats()
    }

    /// Stats of the breaker named `name`, if it exists.
    #[must_use]
    pub fn stats_for(&self, name: &str) -> Option<BreakerStats> {
        self.registry.stats_for(name)
    }

    /// Closes the breaker named `name` and clears its counters.
    pub fn reset(&self, name: &str) -> bool {
        self.registry.reset(name)
    }

    /// Resets every breaker.
    pub fn reset_all(&self) {
        self.registry.reset_all();
    }

    /// Runs `operation` through the breaker named `name` and the retry loop.
    ///
    /// `options` falls back to the invoker's default retry policy (retrying every error)
    /// when `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::CircuitOpen`] when the breaker short-circuits the call.
    /// - [`Error::Permanent`], [`Error::RetriesExhausted`] or [`Error::Canceled`] from the
    ///   retry loop.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F, options: Option<&RetryOptions<E>>) -> Result<T, Error<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.invoke(name, operation, None::<fn() -> std::future::Ready<Result<T, E>>>, options)
            .await
    }

    /// Like [`execute`][Self::execute], but runs `fallback` when the breaker
    /// short-circuits the call or when the retry loop fails with a permanent or
    /// exhausted error. The failure is recorded by the breaker before the fallback runs.
    ///
    /// A canceled call propagates [`Error::Canceled`] without running the fallback.
    ///
    /// # Errors
    ///
    /// - [`Error::Fallback`] when the fallback ran and failed.
    /// - [`Error::Canceled`] when the caller canceled the call.
    pub async fn execute_with_fallback<T, E, F, Fut, FB, FbFut>(
        &self,
        name: &str,
        operation: F,
        fallback: FB,
        options: Option<&RetryOptions<E>>,
    ) -> Result<T, Error<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        self.invoke(name, operation, Some(fallback), options).await
    }

    async fn invoke<T, E, F, Fut, FB, FbFut>(
        &self,
        name: &str,
        operation: F,
        fallback: Option<FB>,
        options: Option<&RetryOptions<E>>,
    ) -> Result<T, Error<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        let breaker = self.registry.get(name);

        let permit = match breaker.acquire(fallback.is_some()) {
            Ok(permit) => permit,
            Err(open) => {
                return match fallback {
                    Some(fallback) => {
                        breaker.emit_fallback(FallbackReason::CircuitOpen);
                        fallback().await.map_err(|source| Error::Fallback { source })
                    }
                    None => Err(open.into()),
                };
            }
        };

        let default_options;
        let options = match options {
            Some(options) => options,
            None => {
                default_options = RetryOptions::from(self.default_policy.clone());
                &default_options
            }
        };

        let error = match self.retry.run(operation, options).await {
            Ok(value) => {
                permit.success();
                return Ok(value);
            }
            Err(error) => error,
        };

        if let Error::Canceled { last_error, .. } = &error {
            // no attempt completed, there is nothing to hold against the dependency
            if last_error.is_none() {
                permit.abandon();
            } else {
                permit.failure();
            }
            return Err(error);
        }

        permit.failure();

        match fallback {
            Some(fallback) => {
                breaker.emit_fallback(FallbackReason::Failure);
                fallback().await.map_err(|source| Error::Fallback { source })
            }
            None => Err(error),
        }
    }
}
