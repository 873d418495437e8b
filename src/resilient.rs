//! Composed resilience wrapper: circuit breaker around retry around the call
//!
//! The composition order is fixed and deliberate: the breaker sees one
//! "attempt" per full retry sequence. Transient blips are absorbed by the
//! retry policy without tripping the breaker; only a fully exhausted (or
//! non-retryable) sequence counts as a breaker-level failure. Conversely, an
//! open circuit rejects before the retry policy runs, so rejections never
//! consume retry attempts.

use std::future::Future;

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::{BreakerConfig, ResilientConfig, RetryConfig};
use crate::error::{BoxError, Result};
use crate::retry::RetryPolicy;

/// Resilient wrapper around one remote dependency.
///
/// Owns exactly one [`CircuitBreaker`] and one [`RetryPolicy`], exclusively.
/// Use one instance per logical dependency; wrappers never share state.
#[derive(Debug)]
pub struct ResilientProvider<F> {
    operation: F,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl<F> ResilientProvider<F> {
    /// Wrap an operation, validating both configs up front.
    pub fn new(operation: F, config: ResilientConfig) -> Result<Self> {
        Ok(Self {
            operation,
            breaker: CircuitBreaker::new(config.breaker())?,
            retry: RetryPolicy::new(config.retry())?,
        })
    }

    /// Execute the wrapped operation with breaker and retry protection.
    pub async fn execute<T, Fut>(&self) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        self.breaker
            .execute(|| self.retry.execute(|| (self.operation)()))
            .await
    }

    /// Snapshot of the breaker's current state.
    pub fn circuit_state(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// The retry policy configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    /// The circuit breaker configuration.
    pub fn circuit_config(&self) -> &BreakerConfig {
        self.breaker.config()
    }

    /// Whether the circuit would reject the next call.
    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Force the circuit closed. Administrative override.
    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }
}

/// One-shot convenience: wrap, execute, discard.
///
/// Builds a fresh breaker per call, so no failure history carries over;
/// retain a [`ResilientProvider`] when the breaker should accumulate state
/// across calls.
pub async fn with_resilience<T, F, Fut>(operation: F, config: ResilientConfig) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, BoxError>>,
{
    let provider = ResilientProvider::new(operation, config)?;
    provider.execute().await
}
