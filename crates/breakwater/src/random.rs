//! Injectable randomness for backoff jitter
//!
//! The decorrelated-jitter formula needs one uniform random value per delay.
//! Rather than reaching for a hidden global generator, the backoff sequence
//! takes its randomness as a dependency, so production code uses
//! [`ThreadRandom`] while tests substitute [`FixedSequence`] or
//! [`SeededRandom`] and assert on exact delay values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform random values in `[0, 1)`
pub trait RandomSource: Send + Sync {
    /// Next uniform value in `[0, 1)`
    fn next_unit(&mut self) -> f64;
}

/// Default source backed by the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic source replaying a fixed list of values
///
/// Cycles back to the first value once the list is exhausted. An empty list
/// yields `0.0` forever. Callers supply values in `[0, 1)`; values are used
/// as given.
#[derive(Debug, Clone)]
pub struct FixedSequence {
    values: Vec<f64>,
    index: usize,
}

impl FixedSequence {
    /// Create a source replaying `values` in order, cycling at the end.
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self { values: values.into(), index: 0 }
    }
}

impl RandomSource for FixedSequence {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.index % self.values.len()];
        self.index += 1;
        value
    }
}

/// Reproducible pseudo-random source seeded explicitly
///
/// Useful for property-style tests that want varied but repeatable jitter.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Create a source from a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
