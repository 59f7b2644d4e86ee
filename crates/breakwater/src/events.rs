//! Notification hooks for policy transitions
//!
//! Policies announce retries and breaker transitions through explicit
//! observer callbacks rather than ambient side effects. All callbacks
//! default to no-ops and never alter control flow; they are invoked
//! synchronously at the transition point, so keep them cheap.
//!
//! The error argument is erased to `&dyn std::error::Error` so one hook set
//! serves policies regardless of the operation error type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type RetryFn = dyn Fn(&(dyn std::error::Error + 'static), Duration, u32) + Send + Sync;
type BreakFn = dyn Fn(&(dyn std::error::Error + 'static), Duration) + Send + Sync;
type TransitionFn = dyn Fn() + Send + Sync;

/// Observer callbacks fired at policy transition points
///
/// - `on_retry(error, delay, attempt)` before each backoff wait, with the
///   failure that triggered it and the 1-based number of the attempt that
///   just failed
/// - `on_break(error, break_duration)` when a breaker opens or reopens
/// - `on_reset()` when a breaker transitions into Closed
/// - `on_half_open()` when a breaker starts admitting a probe
#[derive(Clone)]
pub struct PolicyHooks {
    on_retry: Arc<RetryFn>,
    on_break: Arc<BreakFn>,
    on_reset: Arc<TransitionFn>,
    on_half_open: Arc<TransitionFn>,
}

impl Default for PolicyHooks {
    fn default() -> Self {
        Self {
            on_retry: Arc::new(|_, _, _| {}),
            on_break: Arc::new(|_, _| {}),
            on_reset: Arc::new(|| {}),
            on_half_open: Arc::new(|| {}),
        }
    }
}

impl fmt::Debug for PolicyHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyHooks").finish_non_exhaustive()
    }
}

impl PolicyHooks {
    /// Create a hook set where every callback is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the retry callback.
    pub fn with_on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static), Duration, u32) + Send + Sync + 'static,
    {
        self.on_retry = Arc::new(callback);
        self
    }

    /// Install the break callback.
    pub fn with_on_break<F>(mut self, callback: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static), Duration) + Send + Sync + 'static,
    {
        self.on_break = Arc::new(callback);
        self
    }

    /// Install the reset callback.
    pub fn with_on_reset<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_reset = Arc::new(callback);
        self
    }

    /// Install the half-open callback.
    pub fn with_on_half_open<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_half_open = Arc::new(callback);
        self
    }

    pub(crate) fn emit_retry(
        &self,
        error: &(dyn std::error::Error + 'static),
        delay: Duration,
        attempt: u32,
    ) {
        (self.on_retry)(error, delay, attempt);
    }

    pub(crate) fn emit_break(&self, error: &(dyn std::error::Error + 'static), break_duration: Duration) {
        (self.on_break)(error, break_duration);
    }

    pub(crate) fn emit_reset(&self) {
        (self.on_reset)();
    }

    pub(crate) fn emit_half_open(&self) {
        (self.on_half_open)();
    }
}
