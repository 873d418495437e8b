//! Circuit breaker: fail fast while a dependency is down
//!
//! Three states:
//! - `Closed`: calls pass through; consecutive failures are counted
//! - `Open`: calls are rejected without invoking the operation
//! - `HalfOpen`: trial calls probe whether the dependency recovered
//!
//! Transitions:
//! - `Closed -> Open` after `failure_threshold` consecutive failures
//! - `Open -> HalfOpen` once `cooldown` has elapsed since the last failure
//! - `HalfOpen -> Closed` after `success_threshold` consecutive successes
//! - `HalfOpen -> Open` on any failure
//!
//! State lives behind a plain mutex that is never held across an await, so
//! overlapping in-flight calls on a shared breaker are safe; their counter
//! updates land in completion order.

use std::future::Future;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BreakerConfig;
use crate::error::{Fault, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only snapshot of the breaker's mutable state.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<Instant>,
    pub last_state_change: Instant,
}

/// Callback invoked on every state transition, after the lock is released.
///
/// Logging is the expected use; the breaker itself only emits `tracing`
/// events and has no other I/O.
pub type TransitionHook = dyn Fn(CircuitState, CircuitState) + Send + Sync;

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    last_state_change: Instant,
}

/// Circuit breaker guarding one remote dependency.
///
/// One instance per logical dependency; state is never shared implicitly
/// between breakers.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    on_transition: Option<Box<TransitionHook>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a circuit breaker, validating the configuration.
    pub fn new(config: BreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                last_state_change: Instant::now(),
            }),
            on_transition: None,
        })
    }

    /// Install a transition observer. Replaces any previous hook.
    pub fn with_transition_hook(
        mut self,
        hook: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.on_transition = Some(Box::new(hook));
        self
    }

    /// Execute an operation under breaker protection.
    ///
    /// Rejects with [`Fault::CircuitOpen`] while open and inside the
    /// cooldown window; the operation is not invoked in that case.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        match operation().await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            }
            Err(fault) => {
                self.on_failure();
                Err(fault)
            }
        }
    }

    /// Snapshot the current state without mutating it.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_at: inner.last_failure_at,
            last_state_change: inner.last_state_change,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Whether the next call would be rejected: open and still cooling down.
    /// Does not mutate state.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => match inner.last_failure_at {
                Some(at) => at.elapsed() <= self.config.cooldown,
                None => false,
            },
            _ => false,
        }
    }

    /// Administrative override: force the breaker closed and clear all
    /// counters. Intended for tests and manual recovery.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let t = Self::transition(&mut inner, CircuitState::Closed);
            inner.last_failure_at = None;
            Some(t)
        };
        self.notify(transition);
        debug!("circuit breaker manually reset to closed");
    }

    /// Gate for the next call; may move `Open -> HalfOpen` after cooldown.
    pub(crate) fn admit(&self) -> Result<()> {
        let (outcome, transition) = {
            let mut inner = self.inner.lock();
            if inner.state != CircuitState::Open {
                (Ok(()), None)
            } else {
                let elapsed = inner.last_failure_at.map(|at| at.elapsed());
                match elapsed {
                    Some(e) if e <= self.config.cooldown => {
                        let remaining = self.config.cooldown - e;
                        let fault = Fault::circuit_open("Circuit breaker is open")
                            .with_context("failure_count", inner.failure_count)
                            .with_context(
                                "cooldown_remaining_ms",
                                remaining.as_millis() as u64,
                            );
                        (Err(fault), None)
                    }
                    // Cooldown elapsed (or no recorded failure): probe.
                    _ => {
                        let t = Self::transition(&mut inner, CircuitState::HalfOpen);
                        (Ok(()), Some(t))
                    }
                }
            }
        };
        self.notify(transition);
        if outcome.is_err() {
            warn!("circuit open, rejecting call without invoking operation");
        }
        outcome
    }

    pub(crate) fn on_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failure_count = 0;
            if inner.state == CircuitState::HalfOpen {
                inner.success_count += 1;
                debug!(
                    success_count = inner.success_count,
                    success_threshold = self.config.success_threshold,
                    "success while half-open"
                );
                if inner.success_count >= self.config.success_threshold {
                    Some(Self::transition(&mut inner, CircuitState::Closed))
                } else {
                    None
                }
            } else {
                None
            }
        };
        self.notify(transition);
    }

    pub(crate) fn on_failure(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failure_count += 1;
            inner.success_count = 0;
            inner.last_failure_at = Some(Instant::now());
            debug!(
                state = ?inner.state,
                failure_count = inner.failure_count,
                failure_threshold = self.config.failure_threshold,
                "failure recorded"
            );

            match inner.state {
                CircuitState::HalfOpen => Some(Self::transition(&mut inner, CircuitState::Open)),
                CircuitState::Closed
                    if inner.failure_count >= self.config.failure_threshold =>
                {
                    Some(Self::transition(&mut inner, CircuitState::Open))
                }
                _ => None,
            }
        };
        self.notify(transition);
    }

    fn transition(inner: &mut Inner, to: CircuitState) -> (CircuitState, CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = Instant::now();
        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
            }
            CircuitState::Open => {}
        }
        (from, to)
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let Some((from, to)) = transition {
            debug!(?from, ?to, "circuit state transition");
            if let Some(hook) = &self.on_transition {
                hook(from, to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn breaker(failure_threshold: u32, cooldown_ms: u64, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            success_threshold,
        })
        .unwrap()
    }

    async fn fail(b: &CircuitBreaker) {
        let _ = b
            .execute(|| async { Err::<(), _>(Fault::provider("boom")) })
            .await;
    }

    async fn succeed(b: &CircuitBreaker) {
        b.execute(|| async { Ok::<_, Fault>(()) }).await.unwrap();
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let err = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Fault::Validation { .. }));
    }

    #[tokio::test]
    async fn test_closed_success_resets_failure_count() {
        let b = breaker(3, 1_000, 2);
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.snapshot().failure_count, 2);

        succeed(&b).await;
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
    }

    #[tokio::test]
    async fn test_opens_on_failure_threshold_and_rejects_without_invoking() {
        let b = breaker(3, 60_000, 2);
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.snapshot().state, CircuitState::Closed);
        fail(&b).await;
        assert_eq!(b.snapshot().state, CircuitState::Open);
        assert!(b.is_open());

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = invoked.clone();
        let err = b
            .execute(|| {
                let invoked = invoked_clone.clone();
                async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Fault>(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        match err {
            Fault::CircuitOpen { context, .. } => {
                assert_eq!(context["failure_count"], 3);
                assert!(context.contains_key("cooldown_remaining_ms"));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_through_half_open() {
        let b = breaker(2, 100, 2);
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.snapshot().state, CircuitState::Open);

        sleep(Duration::from_millis(150)).await;
        assert!(!b.is_open());

        // First trial call moves to half-open and is allowed through.
        succeed(&b).await;
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.success_count, 1);

        // Second consecutive success closes the circuit and clears counters.
        succeed(&b).await;
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let b = breaker(2, 100, 2);
        fail(&b).await;
        fail(&b).await;
        sleep(Duration::from_millis(150)).await;

        succeed(&b).await;
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);

        fail(&b).await;
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.success_count, 0);
        assert!(snap.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn test_reset_forces_closed() {
        let b = breaker(1, 60_000, 2);
        fail(&b).await;
        assert_eq!(b.snapshot().state, CircuitState::Open);

        b.reset();
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert!(snap.last_failure_at.is_none());
        assert!(!b.is_open());

        succeed(&b).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_hook_observes_state_changes() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let b = breaker(1, 100, 1).with_transition_hook(move |from, to| {
            seen_clone.lock().push((from, to));
        });

        fail(&b).await;
        sleep(Duration::from_millis(150)).await;
        succeed(&b).await;

        let log = seen.lock().clone();
        assert_eq!(
            log,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }
}
