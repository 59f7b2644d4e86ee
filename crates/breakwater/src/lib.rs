//! Composable resilience policies for async operations.
//!
//! Breakwater provides two primitive policies - retry with decorrelated
//! jitter and a consecutive-failure circuit breaker - plus a composer that
//! wraps retry around a breaker, so waves of failures cost backoff waits
//! instead of real calls until the downstream recovers.
//!
//! Failures are routed by a pluggable [`Classifier`]: transient faults earn
//! retries and trip breakers, permanent faults surface immediately, and
//! open-circuit rejections are their own kind so policies can coordinate.
//! Randomness and time are injectable, which keeps every delay and every
//! state transition reproducible under test.
//!
//! # Quick Start
//!
//! ```
//! use std::io;
//! use std::time::Duration;
//!
//! use breakwater::{
//!     wrap, BackoffConfig, CircuitBreaker, CircuitBreakerConfig, Retry, RetryConfig,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let retry = Retry::new(RetryConfig::backoff(BackoffConfig::new(
//!     3,
//!     Duration::from_millis(100),
//!     Duration::from_secs(30),
//! )))?;
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(5, Duration::from_secs(60)))?;
//! let policy = wrap(retry, breaker);
//!
//! let value = policy.execute(|| async { Ok::<_, io::Error>("fetched") }).await?;
//! assert_eq!(value, "fetched");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod clock;
pub mod compose;
pub mod error;
pub mod events;
pub mod random;
pub mod retry;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export the policy surface for convenience
// ------------------------
pub use backoff::{BackoffConfig, BackoffSequence};
pub use breaker::{BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{
    AlwaysPermanent, AlwaysTransient, Classifier, DefaultClassifier, PredicateClassifier,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use compose::{wrap, ComposedPolicy, OperationFuture, ResiliencePolicy};
pub use error::{ConfigError, ConfigResult, FaultKind, ResilienceError, ResilienceResult};
pub use events::PolicyHooks;
pub use random::{FixedSequence, RandomSource, SeededRandom, ThreadRandom};
pub use retry::{Retry, RetryConfig, Schedule};
