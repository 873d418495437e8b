//! Tower middleware surface for the resilience core
//!
//! The same semantics as [`crate::retry::RetryPolicy`] and
//! [`crate::breaker::CircuitBreaker`], packaged as `tower::Layer`s so they
//! can sit in a `ServiceBuilder` stack around any `Service` with a
//! `BoxError` error type. Faults cross the service boundary boxed and can
//! be recovered by downcasting.
//!
//! Composition note: apply `CircuitBreakerLayer` outside `RetryLayer` so an
//! open circuit rejects before any retry attempt is spent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tower::{Layer, Service, ServiceExt};

use crate::breaker::CircuitBreaker;
use crate::classify::classify;
use crate::error::BoxError;
use crate::retry::RetryPolicy;

/// Layer applying a [`RetryPolicy`] to an inner service.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

/// Service produced by [`RetryLayer`].
///
/// The inner service sits behind an async mutex so each attempt can drive
/// `poll_ready`/`call` from the retry future. Requests must be `Clone` to be
/// re-issued.
pub struct Retry<S> {
    inner: Arc<Mutex<S>>,
    policy: RetryPolicy,
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner: Arc::new(Mutex::new(inner)),
            policy: self.policy.clone(),
        }
    }
}

impl<S, Req> Service<Req> for Retry<S>
where
    Req: Clone + Send + 'static,
    S: Service<Req, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        // The closure owns the request and clones per attempt, so the retry
        // future holds no borrows across awaits.
        let operation = move || {
            let inner = inner.clone();
            let req = req.clone();
            async move {
                let mut guard = inner.lock().await;
                let svc = ServiceExt::ready(&mut *guard).await?;
                svc.call(req).await
            }
        };
        Box::pin(async move { policy.execute(operation).await.map_err(Into::into) })
    }
}

/// Layer gating an inner service behind a shared [`CircuitBreaker`].
///
/// The breaker is `Arc`-shared so every service built from this layer, and
/// any external observer, sees the same state machine.
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// The shared breaker, for snapshots and manual resets.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }
}

/// Service produced by [`CircuitBreakerLayer`].
pub struct Gated<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = Gated<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Gated {
            inner,
            breaker: self.breaker.clone(),
        }
    }
}

impl<S, Req> Service<Req> for Gated<S>
where
    S: Service<Req, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let breaker = self.breaker.clone();
        // Gate before dispatching: an eager inner service (e.g. a buffer
        // that hands off on `call`) must do no work while the circuit is
        // open.
        if let Err(fault) = breaker.admit() {
            let rejected: BoxError = fault.into();
            return Box::pin(async move { Err(rejected) });
        }
        let fut = self.inner.call(req);
        Box::pin(async move {
            match fut.await {
                Ok(resp) => {
                    breaker.on_success();
                    Ok(resp)
                }
                Err(error) => {
                    let fault = classify(&error);
                    breaker.on_failure();
                    let boxed: BoxError = fault.into();
                    Err(boxed)
                }
            }
        })
    }
}
