//! Consecutive-failure circuit breaker with a single-probe recovery window
//!
//! The breaker watches classified outcomes of the operations it guards and
//! fails fast once a dependency looks unhealthy. Only transient faults count
//! toward the trip threshold; permanent faults pass through without touching
//! breaker state. Recovery is lazy: no background timer runs, the first call
//! after the break has elapsed becomes the probe.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::classify::{Classifier, DefaultClassifier};
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult, FaultKind, ResilienceError, ResilienceResult};
use crate::events::PolicyHooks;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a single probe to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures required to open the circuit
    pub failure_threshold: u64,
    /// How long the circuit stays open before admitting a probe
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, break_duration: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration from its two knobs.
    pub fn new(failure_threshold: u64, break_duration: Duration) -> Self {
        Self { failure_threshold, break_duration }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.break_duration.is_zero() {
            return Err(ConfigError::invalid("break_duration must be greater than zero"));
        }
        Ok(())
    }
}

/// Snapshot of breaker counters for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerMetrics {
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Transient failures counted since the last success or close
    pub consecutive_failures: u64,
    /// Every call that entered the breaker, including rejected ones
    pub total_calls: u64,
    /// Calls rejected without invoking the operation
    pub rejected_calls: u64,
}

/// Releases the probe slot when the probe call finishes or is cancelled.
///
/// The slot holds the permit's token while the probe runs; releasing is a
/// compare-exchange against that token, so a permit left over from an earlier
/// half-open window can never free the slot of the current one.
struct ProbePermit {
    slot: Arc<AtomicU64>,
    token: u64,
}

impl Drop for ProbePermit {
    fn drop(&mut self) {
        let _ =
            self.slot.compare_exchange(self.token, VACANT, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Probe slot value meaning no probe is in flight.
const VACANT: u64 = 0;

enum Admission {
    /// Circuit is closed; count the outcome normally
    Standard,
    /// Caller holds the half-open probe slot
    Probe(ProbePermit),
    /// Fail fast without invoking the operation
    Rejected { retry_after: Option<Duration> },
}

/// Circuit breaker guarding an async operation
///
/// Counts consecutive transient failures while closed and opens at the
/// configured threshold. While open, calls are rejected with
/// [`ResilienceError::CircuitOpen`] and the operation is never invoked. Once
/// the break has elapsed, exactly one caller is admitted as a probe: its
/// success closes the circuit, its transient failure starts a fresh break.
/// Concurrent callers during the probe are rejected.
///
/// The classifier `P` decides which failures count; the clock `C` exists so
/// tests can drive the break window deterministically. Clones share all
/// state, so a breaker can be handed to many tasks.
pub struct CircuitBreaker<P = DefaultClassifier, C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    classifier: Arc<P>,
    hooks: PolicyHooks,
    clock: Arc<C>,
    state: Arc<RwLock<CircuitState>>,
    consecutive_failures: Arc<AtomicU64>,
    opened_at: Arc<RwLock<Option<Instant>>>,
    probe_slot: Arc<AtomicU64>,
    probe_tokens: Arc<AtomicU64>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
}

impl<P, C: Clock> fmt::Debug for CircuitBreaker<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures.load(Ordering::Acquire))
            .finish()
    }
}

impl<P, C: Clock> Clone for CircuitBreaker<P, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: Arc::clone(&self.classifier),
            hooks: self.hooks.clone(),
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&self.state),
            consecutive_failures: Arc::clone(&self.consecutive_failures),
            opened_at: Arc::clone(&self.opened_at),
            probe_slot: Arc::clone(&self.probe_slot),
            probe_tokens: Arc::clone(&self.probe_tokens),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker with the default classifier and system clock.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker with default configuration (convenience method).
    pub fn with_defaults() -> Self {
        // The default configuration always passes validation.
        Self::assemble(CircuitBreakerConfig::default(), SystemClock)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<DefaultClassifier, C> {
    /// Create a breaker with a custom clock (useful for testing).
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, clock))
    }

    fn assemble(config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            config,
            classifier: Arc::new(DefaultClassifier::new()),
            hooks: PolicyHooks::default(),
            clock: Arc::new(clock),
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            consecutive_failures: Arc::new(AtomicU64::new(0)),
            opened_at: Arc::new(RwLock::new(None)),
            probe_slot: Arc::new(AtomicU64::new(VACANT)),
            probe_tokens: Arc::new(AtomicU64::new(0)),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<P, C: Clock> CircuitBreaker<P, C> {
    /// Replace the fault classifier, keeping all shared breaker state.
    pub fn with_classifier<Q>(self, classifier: Q) -> CircuitBreaker<Q, C> {
        CircuitBreaker {
            config: self.config,
            classifier: Arc::new(classifier),
            hooks: self.hooks,
            clock: self.clock,
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            probe_slot: self.probe_slot,
            probe_tokens: self.probe_tokens,
            total_calls: self.total_calls,
            rejected_calls: self.rejected_calls,
        }
    }

    /// Install notification hooks. Configure before sharing clones.
    pub fn with_hooks(mut self, hooks: PolicyHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Execute an operation under breaker protection
    ///
    /// Rejects immediately with [`ResilienceError::CircuitOpen`] while the
    /// circuit is open. Otherwise runs the operation, classifies any failure,
    /// and updates breaker state from the verdict. The returned error always
    /// carries the original operation error for failures that actually ran.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Classifier<E>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let permit = match self.try_admit() {
            Admission::Standard => None,
            Admission::Probe(permit) => Some(permit),
            Admission::Rejected { retry_after } => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!("Circuit breaker rejecting call - state: {}", self.state());
                return Err(ResilienceError::CircuitOpen { retry_after });
            }
        };

        match operation().await {
            Ok(value) => {
                self.settle_success(permit.as_ref());
                debug!("Circuit breaker: operation succeeded");
                Ok(value)
            }
            Err(error) => {
                let kind = self.classifier.classify(&error);
                if kind == FaultKind::Transient {
                    self.settle_failure(&error, permit.as_ref());
                } else {
                    debug!("Circuit breaker: {kind} failure passed through uncounted");
                }
                Err(ResilienceError::OperationFailed { kind, source: error })
            }
        }
        // permit drops here, after settling, so the probe slot never frees
        // while the outcome is still unrecorded
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("Circuit state lock poisoned during read");
                *poisoned.into_inner()
            }
        }
    }

    /// Snapshot of breaker counters.
    pub fn metrics(&self) -> BreakerMetrics {
        BreakerMetrics {
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            total_calls: self.total_calls.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
        }
    }

    /// Force the circuit back to closed, clearing the failure count.
    ///
    /// Fires the reset hook only when this actually changed the state.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let previous = *state;
        *state = CircuitState::Closed;
        self.consecutive_failures.store(0, Ordering::Release);
        self.store_opened_at(None);
        self.probe_slot.store(VACANT, Ordering::Release);
        drop(state);

        if previous != CircuitState::Closed {
            info!("Circuit breaker manually reset from {previous} to closed");
            self.hooks.emit_reset();
        }
    }

    /// Decide whether a call may proceed, claiming the probe slot if this
    /// caller is the one that reopens a half-open window.
    fn try_admit(&self) -> Admission {
        loop {
            match self.state() {
                CircuitState::Closed => return Admission::Standard,
                CircuitState::Open => {
                    let now = self.clock.now();
                    let Some(opened_at) = self.opened_at_snapshot() else {
                        return Admission::Rejected { retry_after: None };
                    };
                    let elapsed = now.duration_since(opened_at);
                    if elapsed < self.config.break_duration {
                        return Admission::Rejected {
                            retry_after: Some(self.config.break_duration - elapsed),
                        };
                    }
                    if let Some(permit) = self.begin_probe() {
                        return Admission::Probe(permit);
                    }
                    // Lost the transition race; re-read the new state.
                }
                CircuitState::HalfOpen => {
                    let token = self.next_probe_token();
                    let claimed = self
                        .probe_slot
                        .compare_exchange(VACANT, token, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok();
                    if claimed {
                        return Admission::Probe(ProbePermit {
                            slot: Arc::clone(&self.probe_slot),
                            token,
                        });
                    }
                    // Another probe is in flight; no cooldown estimate exists.
                    return Admission::Rejected { retry_after: None };
                }
            }
        }
    }

    /// Transition open to half-open once the break has elapsed, making this
    /// caller the probe. Returns `None` if another caller won the race or the
    /// break turned out not to be over under the lock.
    fn begin_probe(&self) -> Option<ProbePermit> {
        let mut state = self.lock_state();
        if *state != CircuitState::Open {
            return None;
        }
        let now = self.clock.now();
        let expired = self
            .opened_at_snapshot()
            .is_some_and(|opened_at| now.duration_since(opened_at) >= self.config.break_duration);
        if !expired {
            return None;
        }

        let token = self.next_probe_token();
        // Claim the slot before the new state becomes visible so no other
        // caller can slip in as a second probe.
        self.probe_slot.store(token, Ordering::Release);
        *state = CircuitState::HalfOpen;
        drop(state);

        info!("Circuit breaker half-open, admitting a single probe");
        self.hooks.emit_half_open();
        Some(ProbePermit { slot: Arc::clone(&self.probe_slot), token })
    }

    /// Record a success against the state the call was admitted under.
    ///
    /// Results that arrive after the state has moved on are discarded, so a
    /// slow call from a previous window cannot close the circuit.
    fn settle_success(&self, permit: Option<&ProbePermit>) {
        let mut state = self.lock_state();
        let active_probe =
            permit.is_some_and(|p| self.probe_slot.load(Ordering::Acquire) == p.token);
        match *state {
            CircuitState::HalfOpen if active_probe => {
                *state = CircuitState::Closed;
                self.consecutive_failures.store(0, Ordering::Release);
                self.store_opened_at(None);
                drop(state);
                info!("Circuit breaker closed after successful probe");
                self.hooks.emit_reset();
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            _ => {
                debug!("Discarding stale success result in state {}", *state);
            }
        }
    }

    /// Record a transient failure against the state the call was admitted
    /// under. Counting happens under the state lock, so concurrent failures
    /// open the circuit exactly once.
    fn settle_failure(&self, error: &(dyn std::error::Error + 'static), permit: Option<&ProbePermit>) {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let active_probe =
            permit.is_some_and(|p| self.probe_slot.load(Ordering::Acquire) == p.token);
        match *state {
            CircuitState::HalfOpen if active_probe => {
                *state = CircuitState::Open;
                self.store_opened_at(Some(now));
                drop(state);
                warn!("Circuit breaker reopened after failed probe");
                self.hooks.emit_break(error, self.config.break_duration);
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    *state = CircuitState::Open;
                    self.store_opened_at(Some(now));
                    drop(state);
                    warn!("Circuit breaker opened after {failures} consecutive transient failures");
                    self.hooks.emit_break(error, self.config.break_duration);
                } else {
                    debug!(
                        "Circuit breaker recorded transient failure {failures}/{}",
                        self.config.failure_threshold
                    );
                }
            }
            _ => {
                debug!("Discarding stale failure result in state {}", *state);
            }
        }
    }

    fn next_probe_token(&self) -> u64 {
        // Tokens start at 1; VACANT stays reserved for the empty slot.
        self.probe_tokens.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock_state(&self) -> RwLockWriteGuard<'_, CircuitState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Circuit state lock poisoned during write");
                poisoned.into_inner()
            }
        }
    }

    fn opened_at_snapshot(&self) -> Option<Instant> {
        match self.opened_at.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("Opened-at lock poisoned during read");
                *poisoned.into_inner()
            }
        }
    }

    fn store_opened_at(&self, value: Option<Instant>) {
        match self.opened_at.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => {
                warn!("Opened-at lock poisoned during write");
                *poisoned.into_inner() = value;
            }
        }
    }
}
