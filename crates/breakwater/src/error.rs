//! Failure taxonomy and the errors surfaced by resilience policies
//!
//! Every policy in this crate reports failures through a single generic error
//! type, [`ResilienceError`], which wraps the caller's operation error and
//! carries the classification the engine assigned to the final attempt.
//! Intermediate retries never surface as separate errors; they are observable
//! only through notification hooks.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification of a single failure.
///
/// Produced by a [`Classifier`](crate::classify::Classifier) for operation
/// errors, and structurally by the engine for circuit-breaker rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Retryable transport or server fault (e.g. timeout, 5xx-class response)
    Transient,
    /// Rejection imposed by an open circuit breaker; retryable by policy but
    /// a distinct cause, since the protected operation was never invoked
    CircuitOpen,
    /// Caller or application error that retrying will not resolve
    Permanent,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Transient => write!(f, "transient"),
            FaultKind::CircuitOpen => write!(f, "circuit-open"),
            FaultKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configuration value failed validation
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of the offending value
        message: String,
    },
}

impl ConfigError {
    /// Build an `Invalid` error from anything message-like.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// The terminal failure of a policy-protected invocation
///
/// Generic over the underlying operation error type `E`, so the original
/// error is preserved intact. Whatever the number of absorbed retries, the
/// caller sees exactly one of these: either the breaker's rejection or the
/// last attempt's operation error together with its classification.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls without invoking the
    /// operation
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen {
        /// Remaining cooldown before the breaker will admit a probe, when
        /// known. `None` for rejections issued while another probe is in
        /// flight.
        retry_after: Option<Duration>,
    },

    /// The underlying operation failed
    #[error("Operation failed with {kind} fault")]
    OperationFailed {
        /// Classification assigned to this failure
        kind: FaultKind,
        /// The operation's own error
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Classification of this failure.
    ///
    /// Breaker rejections are always [`FaultKind::CircuitOpen`]; operation
    /// failures carry the classifier's verdict on the final attempt.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::CircuitOpen { .. } => FaultKind::CircuitOpen,
            Self::OperationFailed { kind, .. } => *kind,
        }
    }

    /// Whether this failure is a circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Remaining cooldown reported by an open breaker, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after } => *retry_after,
            Self::OperationFailed { .. } => None,
        }
    }

    /// Borrow the underlying operation error, when the operation ran at all.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::OperationFailed { source, .. } => Some(source),
        }
    }

    /// Consume the failure and recover the underlying operation error.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::OperationFailed { source, .. } => Some(source),
        }
    }
}

/// Result type for policy-protected invocations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;
