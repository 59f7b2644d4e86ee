//! Policy composition: retry wrapped around a circuit breaker
//!
//! The composer re-invokes operations through the breaker, so every attempt
//! is admission-checked and every verdict feeds the breaker's counters. A
//! shared [`ResiliencePolicy`] trait gives primitive and composed policies
//! one uniform invoke surface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::breaker::CircuitBreaker;
use crate::classify::{Classifier, DefaultClassifier};
use crate::clock::{Clock, SystemClock};
use crate::error::ResilienceResult;
use crate::random::{RandomSource, ThreadRandom};
use crate::retry::Retry;

/// Boxed future produced by operations run through a policy object.
pub type OperationFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Trait for executing operations under a resilience policy
///
/// Primitive policies and their compositions expose the same invoke
/// capability, so callers can hold `Arc<dyn ResiliencePolicy<T, E>>` without
/// caring how the protection is assembled. Operations are boxed futures
/// here; the inherent `execute` methods avoid the allocation when the
/// concrete policy type is known.
#[async_trait]
pub trait ResiliencePolicy<T, E>: Send + Sync
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Run the operation under this policy's protection.
    async fn invoke(
        &self,
        operation: &mut (dyn FnMut() -> OperationFuture<T, E> + Send),
    ) -> ResilienceResult<T, E>;
}

#[async_trait]
impl<T, E, P, R> ResiliencePolicy<T, E> for Retry<P, R>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    P: Classifier<E>,
    R: RandomSource + Clone,
{
    async fn invoke(
        &self,
        operation: &mut (dyn FnMut() -> OperationFuture<T, E> + Send),
    ) -> ResilienceResult<T, E> {
        self.execute(operation).await
    }
}

#[async_trait]
impl<T, E, P, C> ResiliencePolicy<T, E> for CircuitBreaker<P, C>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    P: Classifier<E>,
    C: Clock,
{
    async fn invoke(
        &self,
        operation: &mut (dyn FnMut() -> OperationFuture<T, E> + Send),
    ) -> ResilienceResult<T, E> {
        self.execute(operation).await
    }
}

/// Retry policy wrapped around a circuit breaker
///
/// Every attempt, including retries, flows through the breaker for admission
/// and verdict counting. Classification happens once per attempt, inside the
/// breaker; the retry side acts on the resulting fault kind. The constructor
/// switches the retry side to treat breaker rejections as retryable, since
/// otherwise the first rejection would surface immediately and the break
/// would never be ridden out.
pub struct ComposedPolicy<P = DefaultClassifier, R = ThreadRandom, Q = DefaultClassifier, C = SystemClock>
where
    C: Clock,
{
    retry: Retry<P, R>,
    breaker: CircuitBreaker<Q, C>,
}

impl<P, R, Q, C> ComposedPolicy<P, R, Q, C>
where
    C: Clock,
{
    /// Compose `retry` around `breaker`.
    pub fn new(retry: Retry<P, R>, breaker: CircuitBreaker<Q, C>) -> Self {
        Self { retry: retry.with_retry_on_circuit_open(true), breaker }
    }

    /// The retry side of the composition.
    pub fn retry(&self) -> &Retry<P, R> {
        &self.retry
    }

    /// The breaker side of the composition.
    pub fn breaker(&self) -> &CircuitBreaker<Q, C> {
        &self.breaker
    }

    /// Execute an operation through the breaker, retrying per the schedule
    ///
    /// Breaker rejections consume schedule slots like any other retryable
    /// failure, so a long break can exhaust a bounded schedule without the
    /// operation ever running again. On exhaustion the last failure is
    /// surfaced unchanged, rejection or operation error alike.
    #[instrument(skip(self, operation), fields(breaker_state = %self.breaker.state()))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> ResilienceResult<T, E>
    where
        Q: Classifier<E>,
        R: RandomSource + Clone,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut session = self.retry.session();

        loop {
            match self.breaker.execute(&mut operation).await {
                Ok(value) => {
                    let retries = session.failures();
                    if retries > 0 {
                        debug!("Composed policy recovered after {retries} retries");
                    }
                    return Ok(value);
                }
                Err(failure) => match session.next_pause(&failure) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(failure),
                },
            }
        }
    }
}

impl<P, R, Q, C> fmt::Debug for ComposedPolicy<P, R, Q, C>
where
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedPolicy")
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl<P, R, Q, C> Clone for ComposedPolicy<P, R, Q, C>
where
    R: Clone,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self { retry: self.retry.clone(), breaker: self.breaker.clone() }
    }
}

#[async_trait]
impl<T, E, P, R, Q, C> ResiliencePolicy<T, E> for ComposedPolicy<P, R, Q, C>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    P: Classifier<E>,
    R: RandomSource + Clone,
    Q: Classifier<E>,
    C: Clock,
{
    async fn invoke(
        &self,
        operation: &mut (dyn FnMut() -> OperationFuture<T, E> + Send),
    ) -> ResilienceResult<T, E> {
        self.execute(operation).await
    }
}

/// Compose a retry policy around a circuit breaker (convenience function).
pub fn wrap<P, R, Q, C>(
    retry: Retry<P, R>,
    breaker: CircuitBreaker<Q, C>,
) -> ComposedPolicy<P, R, Q, C>
where
    C: Clock,
{
    ComposedPolicy::new(retry, breaker)
}
