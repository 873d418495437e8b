//! Configuration for the resilience components
//!
//! All configs are plain value objects: serde-derived, cloneable, and
//! validated once at policy/breaker construction, not at first use.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Fault, Result};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt budget, including the first call
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Ceiling for the computed backoff delay
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Uniform jitter as a fraction of the computed delay, in `[0, 1]`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Fail-fast validation, run by [`crate::retry::RetryPolicy::new`].
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Fault::validation("max_attempts must be at least 1"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Fault::validation("max_delay must be >= initial_delay"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Fault::validation("backoff_multiplier must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Fault::validation("jitter_factor must be between 0 and 1"));
        }
        Ok(())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls before probing
    pub cooldown: Duration,

    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl BreakerConfig {
    /// Fail-fast validation, run by [`crate::breaker::CircuitBreaker::new`].
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold < 1 {
            return Err(Fault::validation("failure_threshold must be at least 1"));
        }
        if self.success_threshold < 1 {
            return Err(Fault::validation("success_threshold must be at least 1"));
        }
        Ok(())
    }
}

/// Flat configuration for [`crate::resilient::ResilientProvider`]: the retry
/// knobs and the breaker knobs in one object, for one-shot call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilientConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub success_threshold: u32,
}

impl Default for ResilientConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        let breaker = BreakerConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_delay: retry.initial_delay,
            max_delay: retry.max_delay,
            backoff_multiplier: retry.backoff_multiplier,
            jitter_factor: retry.jitter_factor,
            failure_threshold: breaker.failure_threshold,
            cooldown: breaker.cooldown,
            success_threshold: breaker.success_threshold,
        }
    }
}

impl ResilientConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
            success_threshold: self.success_threshold,
        }
    }
}
