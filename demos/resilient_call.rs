//! Demo: wrapping a flaky provider call with retry + circuit breaking
//!
//! Run with: `cargo run --example resilient_call`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use llm_resilience::{Fault, ResilientConfig, ResilientProvider};

/// Simulated provider: rate-limits the first two calls, then answers.
async fn call_provider(attempt: usize) -> Result<String, llm_resilience::BoxError> {
    if attempt < 2 {
        Err("Rate limit exceeded, retry after 1 seconds".into())
    } else {
        Ok("The answer is 42.".to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llm_resilience=debug".into()),
        )
        .init();

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();

    let provider = ResilientProvider::new(
        move || {
            let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
            call_provider(n)
        },
        ResilientConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            cooldown: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .expect("valid config");

    match provider.execute().await {
        Ok(text) => println!("provider answered: {text}"),
        Err(fault) => report(&fault),
    }

    println!(
        "circuit state after call: {:?}",
        provider.circuit_state().state
    );
}

fn report(fault: &Fault) {
    // What an HTTP boundary would do with a fault.
    println!(
        "status {}: {}",
        fault.status_hint(),
        serde_json::to_string_pretty(&fault.client_json()).expect("serializable")
    );
}
