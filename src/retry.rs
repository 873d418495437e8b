//! Retry mechanism with exponential backoff
//!
//! Bounded attempts around a flaky async operation. Each failure is
//! classified; non-retryable faults propagate immediately, retryable ones
//! sleep through capped exponential backoff with jitter, and a rate-limit
//! fault's explicit wait hint overrides the backoff formula outright.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::config::RetryConfig;
use crate::error::{BoxError, Fault, Result};

/// Retry policy for operations
///
/// Immutable after construction; [`RetryPolicy::new`] validates the config
/// and fails fast on nonsense values.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a retry policy, validating the configuration.
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation under this policy.
    ///
    /// Success returns immediately. A non-retryable failure is returned
    /// as-is after classification, consuming no further attempts. When the
    /// attempt budget is exhausted the terminal fault is
    /// [`Fault::MaxRetriesExceeded`], carrying the attempt count and the
    /// last underlying message in its context.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let fault = classify(&error);
                    if !fault.retryable() {
                        debug!(code = fault.code(), "non-retryable fault, giving up");
                        return Err(fault);
                    }

                    last_message = fault.to_string();

                    // Last attempt: no sleep, fall through to the terminal fault.
                    if attempt == max_attempts {
                        break;
                    }

                    let delay = self.delay_for(attempt, &fault);
                    warn!(
                        attempt,
                        max_attempts,
                        code = fault.code(),
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }

        warn!(max_attempts, last_error = %last_message, "all retry attempts exhausted");
        Err(Fault::max_retries_exceeded(max_attempts).with_context("last_error", last_message))
    }

    /// Delay before the attempt following `attempt` (1-indexed), given the
    /// fault that failed it.
    ///
    /// A rate-limit fault's wait hint wins exactly; everything else gets
    /// `initial_delay * multiplier^(attempt-1)` capped at `max_delay`, with
    /// uniform jitter in `[d*(1-j), d*(1+j)]`, floored to whole milliseconds.
    pub fn delay_for(&self, attempt: u32, fault: &Fault) -> Duration {
        if let Fault::RateLimit {
            retry_after_secs, ..
        } = fault
        {
            return Duration::from_millis(retry_after_secs.saturating_mul(1000));
        }

        let exponential = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = exponential.min(self.config.max_delay.as_millis() as f64);

        let jitter = self.config.jitter_factor;
        let jittered = if jitter > 0.0 {
            let lo = capped * (1.0 - jitter);
            let hi = capped * (1.0 + jitter);
            lo + rand::random::<f64>() * (hi - lo)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0).floor() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32, jitter_factor: f64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor,
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let err = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Fault::Validation { .. }));
    }

    #[test]
    fn test_backoff_sequence_without_jitter() {
        let policy = policy(5, 0.0);
        let fault = Fault::provider("transient");
        let delays: Vec<u64> = (1..=4)
            .map(|a| policy.delay_for(a, &fault).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let policy = policy(20, 0.0);
        let fault = Fault::provider("transient");
        assert_eq!(policy.delay_for(10, &fault), Duration::from_secs(5));
    }

    #[test]
    fn test_rate_limit_overrides_backoff() {
        let policy = policy(3, 0.0);
        let fault = Fault::rate_limit(10);
        assert_eq!(policy.delay_for(1, &fault), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(3, &fault), Duration::from_millis(10_000));
    }

    proptest! {
        #[test]
        fn prop_jittered_delay_stays_in_band(attempt in 1u32..8, jitter in 0.0f64..=1.0) {
            let policy = policy(10, jitter);
            let fault = Fault::provider("transient");
            let base = policy.delay_for(attempt, &fault);

            let unjittered = policy_without_jitter(&policy).delay_for(attempt, &fault);
            let d = unjittered.as_millis() as f64;
            let lo = (d * (1.0 - jitter)).floor() as u128;
            let hi = (d * (1.0 + jitter)).ceil() as u128;
            prop_assert!(base.as_millis() >= lo);
            prop_assert!(base.as_millis() <= hi);
        }
    }

    fn policy_without_jitter(p: &RetryPolicy) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            jitter_factor: 0.0,
            ..p.config().clone()
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_invokes_exactly_max_attempts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let err = policy(3, 0.0)
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, BoxError>("network error".into())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match err {
            Fault::MaxRetriesExceeded {
                attempts, context, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(context["last_error"], "network error");
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fault_stops_after_one_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let err = policy(5, 0.0)
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, BoxError>(Fault::invalid_credential("bad key").into())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Fault::InvalidCredential { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy(5, 0.0)
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err::<&str, BoxError>("timed out".into())
                    } else {
                        Ok("success")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_budget_reports_exhaustion() {
        // max_attempts=1 with a retryable failure never sleeps and still
        // terminates as MaxRetriesExceeded.
        let err = policy(1, 0.0)
            .execute(|| async { Err::<i32, BoxError>("network error".into()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Fault::MaxRetriesExceeded { attempts: 1, .. }
        ));
    }
}
