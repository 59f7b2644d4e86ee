//! Deterministic test doubles for exercising resilience policies
//!
//! Provides a fault injector that fails on cue, an event log that captures
//! hook notifications, and re-exports of the injectable clock and randomness
//! doubles so test code can pull everything from one place.

// Allow missing error/panic docs for test doubles - errors are clearly
// indicated by their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::events::PolicyHooks;

pub use crate::clock::MockClock;
pub use crate::random::{FixedSequence, SeededRandom};

// Type alias to reduce complexity
type EventStore = Arc<Mutex<Vec<PolicyEvent>>>;

/// Error produced by [`FaultInjector`]
///
/// The message reads like a connection failure on purpose, so the default
/// classifier treats injected faults as transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection refused: injected fault on call {call}")]
pub struct InjectedFault {
    /// 1-based ordinal of the call that failed
    pub call: u64,
}

#[derive(Debug, Clone, Copy)]
enum FailureWindow {
    /// Fail the first N calls
    Calls(u64),
    /// Fail every call made before the window has elapsed
    Elapsed(Duration),
}

/// Operation double that fails on cue and then recovers
///
/// Clones share the call counter, so a test can hand one clone to a policy
/// closure and keep another for assertions.
///
/// # Examples
///
/// ```
/// use breakwater::testing::FaultInjector;
///
/// let injector = FaultInjector::failing_calls(2);
/// assert!(injector.invoke().is_err());
/// assert!(injector.invoke().is_err());
/// assert_eq!(injector.invoke().unwrap(), 3);
/// assert_eq!(injector.calls(), 3);
/// ```
#[derive(Debug)]
pub struct FaultInjector<C: Clock = SystemClock> {
    window: FailureWindow,
    clock: C,
    started: Instant,
    calls: Arc<AtomicU64>,
}

impl<C: Clock + Clone> Clone for FaultInjector<C> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            clock: self.clock.clone(),
            started: self.started,
            calls: Arc::clone(&self.calls),
        }
    }
}

impl FaultInjector {
    /// Fail the first `failures` calls, then succeed forever.
    pub fn failing_calls(failures: u64) -> Self {
        Self::assemble(FailureWindow::Calls(failures), SystemClock)
    }

    /// Fail every call made during the first `window` of wall-clock time.
    pub fn failing_for(window: Duration) -> Self {
        Self::assemble(FailureWindow::Elapsed(window), SystemClock)
    }
}

impl<C: Clock> FaultInjector<C> {
    /// Fail every call made during the first `window` as measured by `clock`
    ///
    /// Pairs with [`MockClock`]: advance the clock past the window and the
    /// injector starts succeeding without any real waiting.
    pub fn failing_for_with_clock(window: Duration, clock: C) -> Self {
        Self::assemble(FailureWindow::Elapsed(window), clock)
    }

    fn assemble(window: FailureWindow, clock: C) -> Self {
        let started = clock.now();
        Self { window, clock, started, calls: Arc::new(AtomicU64::new(0)) }
    }

    /// Run the fake operation once.
    ///
    /// Returns the 1-based call ordinal on success.
    pub fn invoke(&self) -> Result<u64, InjectedFault> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = match self.window {
            FailureWindow::Calls(failures) => call <= failures,
            FailureWindow::Elapsed(window) => {
                self.clock.now().duration_since(self.started) < window
            }
        };
        if failing {
            Err(InjectedFault { call })
        } else {
            Ok(call)
        }
    }

    /// Total calls observed so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Captured policy notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// A retry was granted, with the wait before it and the 1-based number
    /// of the attempt that failed
    Retry {
        /// Backoff wait preceding the re-invocation
        delay: Duration,
        /// 1-based number of the failed attempt
        attempt: u32,
    },
    /// A breaker opened or reopened
    Break {
        /// Configured break duration at the moment of opening
        break_duration: Duration,
    },
    /// A breaker closed again
    Reset,
    /// A breaker admitted a probe
    HalfOpen,
}

/// Records every hook notification a policy emits, in order
///
/// Clones share the underlying log.
///
/// # Examples
///
/// ```
/// use breakwater::testing::{EventLog, PolicyEvent};
///
/// let log = EventLog::new();
/// let hooks = log.hooks();
/// // hand `hooks` to a policy via `with_hooks`, then assert:
/// assert!(log.events().is_empty());
/// assert_eq!(log.retry_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: EventStore,
}

impl EventLog {
    /// Create an empty event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks wired to record into this log.
    pub fn hooks(&self) -> PolicyHooks {
        // Mutex poisoning is acceptable in test doubles - a panicking test
        // fails regardless
        let retry_log = Arc::clone(&self.events);
        let break_log = Arc::clone(&self.events);
        let reset_log = Arc::clone(&self.events);
        let half_open_log = Arc::clone(&self.events);
        PolicyHooks::new()
            .with_on_retry(move |_error, delay, attempt| {
                retry_log.lock().unwrap().push(PolicyEvent::Retry { delay, attempt });
            })
            .with_on_break(move |_error, break_duration| {
                break_log.lock().unwrap().push(PolicyEvent::Break { break_duration });
            })
            .with_on_reset(move || {
                reset_log.lock().unwrap().push(PolicyEvent::Reset);
            })
            .with_on_half_open(move || {
                half_open_log.lock().unwrap().push(PolicyEvent::HalfOpen);
            })
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of retry notifications recorded.
    pub fn retry_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, PolicyEvent::Retry { .. }))
            .count()
    }

    /// Waits recorded by retry notifications, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                PolicyEvent::Retry { delay, .. } => Some(*delay),
                _ => None,
            })
            .collect()
    }
}
