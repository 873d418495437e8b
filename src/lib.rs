//! # LLM Resilience
//!
//! Retry, circuit breaking, and structured fault classification for flaky
//! remote calls, built for LLM provider endpoints but generic over any
//! zero-argument async operation.
//!
//! ## Core Concepts
//!
//! - **Fault**: a closed taxonomy of structured failures; retryability and a
//!   status hint are fixed per kind
//! - **Classifier**: converts arbitrary errors into `Fault`s by matching
//!   provider message patterns
//! - **RetryPolicy**: bounded attempts with capped exponential backoff,
//!   jitter, and rate-limit wait hints
//! - **CircuitBreaker**: a Closed/Open/HalfOpen state machine that fails
//!   fast while a dependency is down
//! - **ResilientProvider**: the composed unit, breaker around retries around
//!   your operation
//!
//! The same semantics are also exposed as Tower layers in [`layers`] for
//! `Service`-shaped pipelines.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use llm_resilience::{with_resilience, ResilientConfig};
//!
//! # async fn call_provider() -> Result<String, llm_resilience::BoxError> { Ok(String::new()) }
//! # async fn example() {
//! let result = with_resilience(|| call_provider(), ResilientConfig::default()).await;
//!
//! match result {
//!     Ok(text) => println!("{text}"),
//!     Err(fault) => {
//!         // Shape a boundary response from the fault.
//!         let status = fault.status_hint();
//!         let body = fault.client_json();
//!         eprintln!("{status}: {body}");
//!     }
//! }
//! # }
//! ```

pub mod breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod layers;
pub mod resilient;
pub mod retry;

// Public re-exports for convenience
pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use classify::{classify, code_of, is_retryable};
pub use config::{BreakerConfig, ResilientConfig, RetryConfig};
pub use error::{BoxError, Context, Fault, Result};
pub use layers::{CircuitBreakerLayer, RetryLayer};
pub use resilient::{with_resilience, ResilientProvider};
pub use retry::RetryPolicy;

// Re-export Tower traits that layer users need
pub use tower::{Layer, Service, ServiceExt};
