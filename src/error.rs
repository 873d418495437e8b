//! Structured fault taxonomy for LLM provider failures
//!
//! Every failure that enters the resilience layer is represented by exactly
//! one [`Fault`] variant. Retryability and the HTTP-ish status hint are fixed
//! per variant, never per instance, so control flow downstream can match on
//! the variant alone.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Open error type accepted at the boundary of the resilience layer.
///
/// Wrapped operations may fail with anything; [`crate::classify`] converts it
/// into a [`Fault`]. Re-uses Tower's boxed error so layered services and
/// plain async calls share one boundary type.
pub type BoxError = tower::BoxError;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Fault>;

/// Diagnostic metadata bag attached to a fault.
///
/// Free-form, optional, never load-bearing: nothing in this crate reads it
/// back for control flow.
pub type Context = Map<String, Value>;

/// One structured failure in the closed taxonomy.
///
/// Constructed once and immutable afterwards (the `with_context` builder
/// consumes `self`). Each variant's `code`, `retryable`, and `status_hint`
/// are fixed; kind-specific payloads (`retry_after_secs`, token counts,
/// `attempts`) ride on their variant.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// Catch-all transient provider failure.
    #[error("{message}")]
    Provider { message: String, context: Context },

    /// Provider rate limit hit; `retry_after_secs` is the wait hint.
    #[error("Rate limit exceeded. Retry after {retry_after_secs}s")]
    RateLimit {
        retry_after_secs: u64,
        context: Context,
    },

    /// Authentication or credential configuration failure.
    #[error("{message}")]
    InvalidCredential { message: String, context: Context },

    /// Request exceeded the model's token budget.
    #[error("Token limit exceeded: {requested} > {limit}")]
    TokenLimitExceeded {
        requested: u64,
        limit: u64,
        context: Context,
    },

    /// Circuit breaker is rejecting calls.
    #[error("{message}")]
    CircuitOpen { message: String, context: Context },

    /// Provider name does not route to any configured backend.
    #[error("{message}")]
    UnsupportedProvider { message: String, context: Context },

    /// Terminal: every retry attempt was consumed.
    #[error("{message}")]
    MaxRetriesExceeded {
        message: String,
        attempts: u32,
        context: Context,
    },

    /// The wrapped operation timed out.
    #[error("{message}")]
    Timeout { message: String, context: Context },

    /// Transient network-level failure (reset, refused, DNS).
    #[error("{message}")]
    Network { message: String, context: Context },

    /// Invalid input or configuration; never retried.
    #[error("{message}")]
    Validation { message: String, context: Context },
}

impl Fault {
    pub fn provider(message: impl Into<String>) -> Self {
        Fault::Provider {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Fault::RateLimit {
            retry_after_secs,
            context: Context::new(),
        }
    }

    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Fault::InvalidCredential {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn token_limit_exceeded(requested: u64, limit: u64) -> Self {
        Fault::TokenLimitExceeded {
            requested,
            limit,
            context: Context::new(),
        }
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Fault::CircuitOpen {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn unsupported_provider(message: impl Into<String>) -> Self {
        Fault::UnsupportedProvider {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn max_retries_exceeded(attempts: u32) -> Self {
        Fault::MaxRetriesExceeded {
            message: format!("Failed after {attempts} attempts"),
            attempts,
            context: Context::new(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Fault::Timeout {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Fault::Network {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Fault::Validation {
            message: message.into(),
            context: Context::new(),
        }
    }

    /// Attach a diagnostic key/value to the fault's context bag.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_mut().insert(key.into(), value.into());
        self
    }

    /// Stable machine-readable code for the fault kind.
    pub fn code(&self) -> &'static str {
        match self {
            Fault::Provider { .. } => "PROVIDER_ERROR",
            Fault::RateLimit { .. } => "RATE_LIMIT",
            Fault::InvalidCredential { .. } => "INVALID_CREDENTIAL",
            Fault::TokenLimitExceeded { .. } => "TOKEN_LIMIT_EXCEEDED",
            Fault::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Fault::UnsupportedProvider { .. } => "UNSUPPORTED_PROVIDER",
            Fault::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            Fault::Timeout { .. } => "TIMEOUT",
            Fault::Network { .. } => "NETWORK",
            Fault::Validation { .. } => "VALIDATION_ERROR",
        }
    }

    /// Whether repeating the same operation has a reasonable chance of
    /// succeeding. Fixed per kind.
    pub fn retryable(&self) -> bool {
        match self {
            Fault::Provider { .. } => true,
            Fault::RateLimit { .. } => true,
            Fault::InvalidCredential { .. } => false,
            Fault::TokenLimitExceeded { .. } => false,
            Fault::CircuitOpen { .. } => true,
            Fault::UnsupportedProvider { .. } => false,
            Fault::MaxRetriesExceeded { .. } => false,
            Fault::Timeout { .. } => true,
            Fault::Network { .. } => true,
            Fault::Validation { .. } => false,
        }
    }

    /// HTTP-analogous status classification. Used only for shaping a
    /// boundary response, never for control flow.
    pub fn status_hint(&self) -> u16 {
        match self {
            Fault::Provider { .. } => 502,
            Fault::RateLimit { .. } => 429,
            Fault::InvalidCredential { .. } => 401,
            Fault::TokenLimitExceeded { .. } => 400,
            Fault::CircuitOpen { .. } => 503,
            Fault::UnsupportedProvider { .. } => 400,
            Fault::MaxRetriesExceeded { .. } => 500,
            Fault::Timeout { .. } => 504,
            Fault::Network { .. } => 503,
            Fault::Validation { .. } => 400,
        }
    }

    /// Borrow the diagnostic context bag.
    pub fn context(&self) -> &Context {
        match self {
            Fault::Provider { context, .. }
            | Fault::RateLimit { context, .. }
            | Fault::InvalidCredential { context, .. }
            | Fault::TokenLimitExceeded { context, .. }
            | Fault::CircuitOpen { context, .. }
            | Fault::UnsupportedProvider { context, .. }
            | Fault::MaxRetriesExceeded { context, .. }
            | Fault::Timeout { context, .. }
            | Fault::Network { context, .. }
            | Fault::Validation { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut Context {
        match self {
            Fault::Provider { context, .. }
            | Fault::RateLimit { context, .. }
            | Fault::InvalidCredential { context, .. }
            | Fault::TokenLimitExceeded { context, .. }
            | Fault::CircuitOpen { context, .. }
            | Fault::UnsupportedProvider { context, .. }
            | Fault::MaxRetriesExceeded { context, .. }
            | Fault::Timeout { context, .. }
            | Fault::Network { context, .. }
            | Fault::Validation { context, .. } => context,
        }
    }

    /// Full serialization for logs: every field, including the context bag.
    pub fn diagnostic_json(&self) -> Value {
        let mut body = self.client_json();
        if let Value::Object(map) = &mut body {
            map.insert("status".into(), json!(self.status_hint()));
            map.insert("context".into(), Value::Object(self.context().clone()));
        }
        body
    }

    /// Minimal client-safe serialization: code, message, retryability, and
    /// the public kind-specific fields. The context bag is always stripped.
    pub fn client_json(&self) -> Value {
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        });
        if let Value::Object(map) = &mut body {
            match self {
                Fault::RateLimit {
                    retry_after_secs, ..
                } => {
                    map.insert("retryAfter".into(), json!(retry_after_secs));
                }
                Fault::TokenLimitExceeded {
                    requested, limit, ..
                } => {
                    map.insert("requested".into(), json!(requested));
                    map.insert("limit".into(), json!(limit));
                }
                Fault::MaxRetriesExceeded { attempts, .. } => {
                    map.insert("attempts".into(), json!(attempts));
                }
                _ => {}
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Fault::rate_limit(30);
        assert_eq!(err.to_string(), "Rate limit exceeded. Retry after 30s");

        let err = Fault::token_limit_exceeded(5000, 4096);
        assert_eq!(err.to_string(), "Token limit exceeded: 5000 > 4096");

        let err = Fault::max_retries_exceeded(3);
        assert_eq!(err.to_string(), "Failed after 3 attempts");
    }

    #[test]
    fn test_retryability_is_fixed_per_kind() {
        assert!(Fault::provider("p").retryable());
        assert!(Fault::rate_limit(60).retryable());
        assert!(Fault::circuit_open("open").retryable());
        assert!(Fault::timeout("t").retryable());
        assert!(Fault::network("n").retryable());

        assert!(!Fault::invalid_credential("k").retryable());
        assert!(!Fault::token_limit_exceeded(0, 0).retryable());
        assert!(!Fault::unsupported_provider("u").retryable());
        assert!(!Fault::max_retries_exceeded(3).retryable());
        assert!(!Fault::validation("v").retryable());
    }

    #[test]
    fn test_status_hints() {
        assert_eq!(Fault::provider("p").status_hint(), 502);
        assert_eq!(Fault::rate_limit(60).status_hint(), 429);
        assert_eq!(Fault::invalid_credential("k").status_hint(), 401);
        assert_eq!(Fault::token_limit_exceeded(1, 2).status_hint(), 400);
        assert_eq!(Fault::circuit_open("o").status_hint(), 503);
        assert_eq!(Fault::unsupported_provider("u").status_hint(), 400);
        assert_eq!(Fault::max_retries_exceeded(1).status_hint(), 500);
        assert_eq!(Fault::timeout("t").status_hint(), 504);
        assert_eq!(Fault::network("n").status_hint(), 503);
        assert_eq!(Fault::validation("v").status_hint(), 400);
    }

    #[test]
    fn test_client_json_strips_context() {
        let err = Fault::rate_limit(10).with_context("internal_request_id", "abc-123");

        let client = err.client_json();
        assert_eq!(client["code"], "RATE_LIMIT");
        assert_eq!(client["retryAfter"], 10);
        assert!(client.get("context").is_none());

        let diag = err.diagnostic_json();
        assert_eq!(diag["context"]["internal_request_id"], "abc-123");
        assert_eq!(diag["status"], 429);
    }

    #[test]
    fn test_kind_specific_client_fields() {
        let client = Fault::token_limit_exceeded(5000, 4096).client_json();
        assert_eq!(client["requested"], 5000);
        assert_eq!(client["limit"], 4096);

        let client = Fault::max_retries_exceeded(5).client_json();
        assert_eq!(client["attempts"], 5);
    }

    #[test]
    fn test_fault_is_a_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<Fault>();

        let boxed: BoxError = Fault::timeout("upstream timed out").into();
        assert!(boxed.downcast_ref::<Fault>().is_some());
    }
}
