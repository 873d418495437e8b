//! Best-effort classification of arbitrary errors into the [`Fault`] taxonomy
//!
//! Providers surface failures as free text, so classification is an ordered
//! table of message patterns, first match wins. The tables live here and
//! nowhere else; retry and breaker logic only ever see the resulting
//! [`Fault`]. Classification is pure: no logging, no state.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BoxError, Fault};

/// Ordered pattern tables. Exact wording tracks provider error formats and
/// is expected to grow; keep additions here, not in retry/breaker code.
static RATE_LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)rate limit",
        r"(?i)too many requests",
        r"429",
        r"(?i)quota exceeded",
    ])
});

static CREDENTIAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)api key",
        r"(?i)authentication",
        r"(?i)unauthorized",
        r"(?i)invalid key",
        r"401",
    ])
});

static TOKEN_LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)token limit",
        r"(?i)context length",
        r"(?i)maximum context",
        r"(?i)too many tokens",
    ])
});

static TIMEOUT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)timeout",
        r"(?i)timed out",
        r"ETIMEDOUT",
        r"ESOCKETTIMEDOUT",
    ])
});

static NETWORK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"ECONNRESET",
        r"ECONNREFUSED",
        r"ENOTFOUND",
        r"(?i)network error",
        r"(?i)connection error",
    ])
});

static RETRY_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry after (\d+)").expect("static regex"));

static SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*seconds?").expect("static regex"));

static TOKEN_COUNTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+).*?(?:exceeds?|>).*?(\d+)").expect("static regex"));

/// Wait hint used when a rate-limit message carries no parsable duration.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
}

fn matches_any(patterns: &[Regex], message: &str) -> bool {
    patterns.iter().any(|p| p.is_match(message))
}

/// Convert any error into a [`Fault`].
///
/// Idempotent: an error that already is a `Fault` passes through unchanged.
/// Anything else is matched against the pattern tables on its `Display`
/// text; an unmatchable message falls back to the generic retryable
/// provider fault.
pub fn classify(error: &BoxError) -> Fault {
    if let Some(fault) = error.downcast_ref::<Fault>() {
        return fault.clone();
    }

    let message = error.to_string();
    if message.is_empty() {
        return Fault::provider("Unknown error occurred")
            .with_context("source", format!("{error:?}"));
    }
    classify_message(&message)
}

/// Classify a bare message, without a source error to preserve.
pub fn classify_message(message: &str) -> Fault {
    if matches_any(&RATE_LIMIT_PATTERNS, message) {
        return Fault::rate_limit(extract_retry_after(message))
            .with_context("source_message", message);
    }
    if matches_any(&CREDENTIAL_PATTERNS, message) {
        return Fault::invalid_credential(message);
    }
    if matches_any(&TOKEN_LIMIT_PATTERNS, message) {
        let (requested, limit) = extract_token_counts(message);
        return Fault::token_limit_exceeded(requested, limit)
            .with_context("source_message", message);
    }
    if matches_any(&TIMEOUT_PATTERNS, message) {
        return Fault::timeout(message);
    }
    if matches_any(&NETWORK_PATTERNS, message) {
        return Fault::network(message);
    }
    Fault::provider(message)
}

/// True when retrying the failed operation is worthwhile.
///
/// Already-classified faults answer from their kind; raw errors answer from
/// the transient pattern tables (rate limit, timeout, network).
pub fn is_retryable(error: &BoxError) -> bool {
    if let Some(fault) = error.downcast_ref::<Fault>() {
        return fault.retryable();
    }
    let message = error.to_string();
    matches_any(&RATE_LIMIT_PATTERNS, &message)
        || matches_any(&TIMEOUT_PATTERNS, &message)
        || matches_any(&NETWORK_PATTERNS, &message)
}

/// Machine-readable code for any error; `"UNKNOWN_ERROR"` if it is not a
/// [`Fault`].
pub fn code_of(error: &BoxError) -> &'static str {
    match error.downcast_ref::<Fault>() {
        Some(fault) => fault.code(),
        None => "UNKNOWN_ERROR",
    }
}

fn extract_retry_after(message: &str) -> u64 {
    if let Some(caps) = RETRY_AFTER.captures(message) {
        if let Ok(secs) = caps[1].parse() {
            return secs;
        }
    }
    if let Some(caps) = SECONDS.captures(message) {
        if let Ok(secs) = caps[1].parse() {
            return secs;
        }
    }
    DEFAULT_RETRY_AFTER_SECS
}

fn extract_token_counts(message: &str) -> (u64, u64) {
    if let Some(caps) = TOKEN_COUNTS.captures(message) {
        if let (Ok(requested), Ok(limit)) = (caps[1].parse(), caps[2].parse()) {
            return (requested, limit);
        }
    }
    (0, 0)
}
