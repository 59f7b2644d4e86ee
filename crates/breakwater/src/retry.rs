//! Retry executor driven by fault classification and a backoff schedule
//!
//! The executor re-invokes a failing operation until it succeeds, the
//! classifier rules the failure permanent, or the schedule runs out. Whatever
//! happens in between, the caller sees exactly one outcome: the success
//! value, or the last observed failure re-raised unchanged. Intermediate
//! attempts surface only through [`PolicyHooks`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::backoff::{BackoffConfig, BackoffSequence};
use crate::classify::{Classifier, DefaultClassifier};
use crate::error::{ConfigError, ConfigResult, FaultKind, ResilienceError, ResilienceResult};
use crate::events::PolicyHooks;
use crate::random::{RandomSource, ThreadRandom};

/// When and how often a failed operation is re-invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Bounded retries with decorrelated-jitter waits; the operation runs at
    /// most `max_attempts + 1` times
    Backoff(BackoffConfig),
    /// Unbounded retries at a constant interval
    ///
    /// Meant to sit in front of a circuit breaker: the breaker bounds the
    /// damage of retrying forever, and each wave of rejections costs one
    /// fixed wait instead of a real call.
    FixedUnbounded(Duration),
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay schedule between attempts
    pub schedule: Schedule,
    /// Whether circuit-breaker rejections are retried like transient faults
    pub retry_on_circuit_open: bool,
    /// Optional wall-clock budget across all attempts and waits; when it
    /// runs out the last observed failure is re-raised
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::backoff(BackoffConfig::default())
    }
}

impl RetryConfig {
    /// Bounded retries using the given backoff sequence.
    pub fn backoff(config: BackoffConfig) -> Self {
        Self { schedule: Schedule::Backoff(config), retry_on_circuit_open: false, max_total_time: None }
    }

    /// Unbounded retries at a fixed interval.
    pub fn fixed_unbounded(delay: Duration) -> Self {
        Self {
            schedule: Schedule::FixedUnbounded(delay),
            retry_on_circuit_open: false,
            max_total_time: None,
        }
    }

    /// Treat circuit-breaker rejections as retryable.
    pub fn with_retry_on_circuit_open(mut self, enabled: bool) -> Self {
        self.retry_on_circuit_open = enabled;
        self
    }

    /// Cap the total wall-clock time spent across attempts and waits.
    pub fn with_max_total_time(mut self, budget: Duration) -> Self {
        self.max_total_time = Some(budget);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.schedule {
            Schedule::Backoff(backoff) => backoff.validate(),
            Schedule::FixedUnbounded(delay) => {
                if delay.is_zero() {
                    return Err(ConfigError::invalid("fixed retry delay must be greater than zero"));
                }
                Ok(())
            }
        }
    }
}

/// Retry policy for async operations
///
/// Each invocation gets a fresh delay cursor, so concurrent calls through one
/// shared policy never interleave their backoff state. The classifier `P`
/// decides which failures earn a retry; the random source `R` feeds the
/// jitter formula and is injectable for deterministic tests.
pub struct Retry<P = DefaultClassifier, R = ThreadRandom> {
    config: RetryConfig,
    classifier: Arc<P>,
    random: R,
    hooks: PolicyHooks,
}

impl<P, R: Clone> Clone for Retry<P, R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            classifier: Arc::clone(&self.classifier),
            random: self.random.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<P, R> fmt::Debug for Retry<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").field("config", &self.config).finish()
    }
}

impl Retry {
    /// Create a retry policy with the default classifier and randomness.
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    /// Create a retry policy with default configuration (convenience method).
    pub fn with_defaults() -> Self {
        // The default configuration always passes validation.
        Self::assemble(RetryConfig::default())
    }

    fn assemble(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(DefaultClassifier::new()),
            random: ThreadRandom,
            hooks: PolicyHooks::default(),
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<P, R> Retry<P, R> {
    /// Replace the fault classifier.
    pub fn with_classifier<Q>(self, classifier: Q) -> Retry<Q, R> {
        Retry {
            config: self.config,
            classifier: Arc::new(classifier),
            random: self.random,
            hooks: self.hooks,
        }
    }

    /// Replace the random source feeding the jitter formula.
    pub fn with_random<S>(self, random: S) -> Retry<P, S> {
        Retry {
            config: self.config,
            classifier: self.classifier,
            random,
            hooks: self.hooks,
        }
    }

    /// Install notification hooks.
    pub fn with_hooks(mut self, hooks: PolicyHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Treat circuit-breaker rejections as retryable.
    pub fn with_retry_on_circuit_open(mut self, enabled: bool) -> Self {
        self.config.retry_on_circuit_open = enabled;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Open a per-invocation session over this policy's schedule, randomness,
    /// and hooks.
    pub(crate) fn session(&self) -> RetrySession<R>
    where
        R: RandomSource + Clone,
    {
        RetrySession::start(&self.config, self.random.clone(), self.hooks.clone())
    }

    /// Execute an operation with retry logic
    ///
    /// Invokes the operation, classifies each failure, and either waits and
    /// re-invokes or re-raises. On exhaustion of the schedule or the time
    /// budget, the error of the final attempt is surfaced unchanged; no
    /// wrapper error is introduced.
    #[instrument(skip(self, operation), fields(retry_on_open = self.config.retry_on_circuit_open))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> ResilienceResult<T, E>
    where
        P: Classifier<E>,
        R: RandomSource + Clone,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut session = self.session();

        loop {
            match operation().await {
                Ok(value) => {
                    let retries = session.failures();
                    if retries > 0 {
                        debug!("Operation succeeded after {retries} retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let kind = self.classifier.classify(&error);
                    let failure = ResilienceError::OperationFailed { kind, source: error };
                    match session.next_pause(&failure) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Err(failure),
                    }
                }
            }
        }
    }
}

/// Per-invocation retry state: the delay cursor, the attempt counter, and
/// the optional deadline
///
/// Shared with the policy composer, which runs its own invoke loop through a
/// breaker but makes retry decisions identically.
pub(crate) struct RetrySession<R: RandomSource> {
    delays: DelayCursor<R>,
    retry_on_circuit_open: bool,
    deadline: Option<Instant>,
    failures: u32,
    hooks: PolicyHooks,
}

enum DelayCursor<R: RandomSource> {
    Bounded(BackoffSequence<R>),
    Fixed(Duration),
}

impl<R: RandomSource> DelayCursor<R> {
    fn next_delay(&mut self) -> Option<Duration> {
        match self {
            DelayCursor::Bounded(sequence) => sequence.next(),
            DelayCursor::Fixed(delay) => Some(*delay),
        }
    }
}

impl<R: RandomSource> RetrySession<R> {
    pub(crate) fn start(config: &RetryConfig, random: R, hooks: PolicyHooks) -> Self {
        let delays = match &config.schedule {
            Schedule::Backoff(backoff) => DelayCursor::Bounded(backoff.sequence_with(random)),
            Schedule::FixedUnbounded(delay) => DelayCursor::Fixed(*delay),
        };
        Self {
            delays,
            retry_on_circuit_open: config.retry_on_circuit_open,
            deadline: config.max_total_time.and_then(|budget| Instant::now().checked_add(budget)),
            failures: 0,
            hooks,
        }
    }

    /// Decide whether the failure earns another attempt.
    ///
    /// Returns the wait to take before re-invoking, or `None` when the
    /// failure must be surfaced: permanent faults, circuit rejections when
    /// those are not retried, an expired time budget, or an exhausted
    /// schedule. Fires the retry hook for every granted wait; the attempt
    /// number passed along is 1-based.
    pub(crate) fn next_pause<E>(&mut self, failure: &ResilienceError<E>) -> Option<Duration>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.failures += 1;
        match failure.kind() {
            FaultKind::Permanent => {
                debug!("Permanent failure on attempt {}, not retrying", self.failures);
                return None;
            }
            FaultKind::CircuitOpen if !self.retry_on_circuit_open => {
                debug!("Circuit open and not configured to retry through it");
                return None;
            }
            FaultKind::Transient | FaultKind::CircuitOpen => {}
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                warn!("Retry time budget spent after {} attempts", self.failures);
                return None;
            }
        }

        let Some(delay) = self.delays.next_delay() else {
            warn!("Retry attempts exhausted after {} tries", self.failures);
            return None;
        };

        debug!("Attempt {} failed, retrying after {delay:?}", self.failures);
        self.hooks.emit_retry(failure, delay, self.failures);
        Some(delay)
    }

    /// Failed attempts observed so far.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}
