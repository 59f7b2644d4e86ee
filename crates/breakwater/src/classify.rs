//! Fault classification
//!
//! A classifier decides how a single failure should be treated: worth
//! retrying ([`FaultKind::Transient`]) or surfaced immediately
//! ([`FaultKind::Permanent`]). Classification is a pure function of the
//! error; it holds no state and performs no I/O.
//!
//! [`DefaultClassifier`] covers the common network case by inspecting the
//! error's display text and source chain: connection-level faults and
//! retryable HTTP-like status codes are transient, everything else is
//! permanent. Both the marker list and the status set are configuration,
//! not hardwired logic.
//!
//! A classifier never produces [`FaultKind::CircuitOpen`] for a raw
//! operation error: the breaker's rejection is represented structurally as
//! [`ResilienceError::CircuitOpen`](crate::error::ResilienceError) and
//! classified by the engine itself.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::FaultKind;

/// Decides how a failure should be treated
pub trait Classifier<E>: Send + Sync {
    /// Classify a single error.
    fn classify(&self, error: &E) -> FaultKind;
}

/// Delegate through Arc for convenient sharing
impl<E, P: Classifier<E>> Classifier<E> for Arc<P> {
    fn classify(&self, error: &E) -> FaultKind {
        (**self).classify(error)
    }
}

/// Default classification policy for network-style operations
///
/// Transient when the error text (or any error in its source chain)
/// mentions a connection-level fault, or contains a standalone three-digit
/// status code from the retryable set. Permanent otherwise.
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    retryable_statuses: HashSet<u16>,
    transient_markers: Vec<String>,
}

/// Status codes retried by default: request timeout plus the transient
/// 5xx-class responses.
const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [408, 500, 502, 503, 504];

const DEFAULT_TRANSIENT_MARKERS: [&str; 9] = [
    "connection",
    "timed out",
    "timeout",
    "refused",
    "reset",
    "unreachable",
    "broken pipe",
    "no route to host",
    "dns",
];

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            transient_markers: DEFAULT_TRANSIENT_MARKERS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl DefaultClassifier {
    /// Create a classifier with the default markers and status set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retryable status set.
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Replace the transient marker list.
    ///
    /// Markers are matched case-insensitively as substrings of the error
    /// text and its source chain.
    pub fn with_transient_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transient_markers =
            markers.into_iter().map(|m| m.into().to_lowercase()).collect();
        self
    }

    /// Whether a status code belongs to the retryable set.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    fn has_transient_marker(&self, text: &str) -> bool {
        self.transient_markers.iter().any(|marker| text.contains(marker.as_str()))
    }

    /// Scan for standalone three-digit numbers so "status 502" matches while
    /// "took 1502ms" does not.
    fn has_retryable_status(&self, text: &str) -> bool {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i].is_ascii_digit() {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i - start == 3 {
                    if let Ok(code) = text[start..i].parse::<u16>() {
                        if self.retryable_statuses.contains(&code) {
                            return true;
                        }
                    }
                }
            } else {
                i += 1;
            }
        }
        false
    }
}

impl<E: std::error::Error> Classifier<E> for DefaultClassifier {
    fn classify(&self, error: &E) -> FaultKind {
        let mut text = error.to_string().to_lowercase();
        let mut source = error.source();
        while let Some(inner) = source {
            text.push(' ');
            text.push_str(&inner.to_string().to_lowercase());
            source = inner.source();
        }

        if self.has_transient_marker(&text) || self.has_retryable_status(&text) {
            FaultKind::Transient
        } else {
            FaultKind::Permanent
        }
    }
}

/// Classifier driven by a caller-supplied predicate
///
/// The predicate returns the full [`FaultKind`] so callers can model
/// domains where an error is sometimes transient and sometimes permanent.
#[derive(Debug, Clone)]
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    /// Wrap a classification predicate.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> Classifier<E> for PredicateClassifier<F>
where
    F: Fn(&E) -> FaultKind + Send + Sync,
{
    fn classify(&self, error: &E) -> FaultKind {
        (self.predicate)(error)
    }
}

/// Classifier that treats every failure as transient
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTransient;

impl<E> Classifier<E> for AlwaysTransient {
    fn classify(&self, _error: &E) -> FaultKind {
        FaultKind::Transient
    }
}

/// Classifier that treats every failure as permanent
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPermanent;

impl<E> Classifier<E> for AlwaysPermanent {
    fn classify(&self, _error: &E) -> FaultKind {
        FaultKind::Permanent
    }
}
