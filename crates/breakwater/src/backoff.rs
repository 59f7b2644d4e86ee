//! Decorrelated-jitter backoff sequences
//!
//! Each retry wait is randomized relative to the previous one rather than
//! following a bare exponential curve, which keeps large fleets of callers
//! from synchronizing into retry storms. The sequence is lazy, finite, and
//! cheap to restart: one fresh cursor per protected invocation.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::random::{RandomSource, ThreadRandom};

/// Configuration for a decorrelated-jitter backoff sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Lower bound and first-element basis for every delay
    pub seed_delay: Duration,
    /// Upper bound for every delay
    pub max_delay: Duration,
    /// Number of delays the sequence yields before exhaustion
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            seed_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl BackoffConfig {
    /// Create a configuration from the three sequence parameters.
    pub fn new(max_attempts: u32, seed_delay: Duration, max_delay: Duration) -> Self {
        Self { seed_delay, max_delay, max_attempts }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be greater than 0"));
        }
        if self.max_delay < self.seed_delay {
            return Err(ConfigError::invalid("max_delay must be at least seed_delay"));
        }
        Ok(())
    }

    /// Start a fresh sequence using the thread-local random source.
    pub fn sequence(&self) -> BackoffSequence<ThreadRandom> {
        self.sequence_with(ThreadRandom)
    }

    /// Start a fresh sequence with an injected random source.
    ///
    /// Every call constructs an independent cursor; nothing is shared with
    /// previously started sequences.
    pub fn sequence_with<R: RandomSource>(&self, random: R) -> BackoffSequence<R> {
        BackoffSequence {
            seed_delay: self.seed_delay,
            max_delay: self.max_delay,
            remaining: self.max_attempts,
            current: self.seed_delay,
            random,
        }
    }
}

/// Lazy cursor over a decorrelated-jitter delay sequence
///
/// Yields exactly `max_attempts` durations, each computed as
/// `min(max_delay, max(seed_delay, previous * 3 * U))` with `U` uniform in
/// `[0, 1)` and `previous` seeded at `seed_delay` for the first element.
/// Every yielded value therefore lies in `[seed_delay, max_delay]`.
#[derive(Debug, Clone)]
pub struct BackoffSequence<R: RandomSource = ThreadRandom> {
    seed_delay: Duration,
    max_delay: Duration,
    remaining: u32,
    current: Duration,
    random: R,
}

impl<R: RandomSource> Iterator for BackoffSequence<R> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let unit = self.random.next_unit();
        let spread = self.current.as_secs_f64() * 3.0 * unit;
        let clamped = spread.max(self.seed_delay.as_secs_f64()).min(self.max_delay.as_secs_f64());

        self.current = Duration::from_secs_f64(clamped);
        Some(self.current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{FixedSequence, SeededRandom};

    /// Validates `BackoffConfig::default` behavior for the default values
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `config.seed_delay` equals `Duration::from_millis(100)`.
    /// - Confirms `config.max_delay` equals `Duration::from_secs(30)`.
    /// - Confirms `config.max_attempts` equals `3`.
    #[test]
    fn test_backoff_config_default() {
        let config = BackoffConfig::default();
        assert_eq!(config.seed_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 3);
    }

    /// Validates `BackoffConfig::validate` behavior for the rejection
    /// scenarios.
    ///
    /// Assertions:
    /// - Ensures a zero attempt budget fails validation.
    /// - Ensures `max_delay < seed_delay` fails validation.
    /// - Ensures a well-formed configuration passes validation.
    #[test]
    fn test_backoff_config_validation() {
        let zero_attempts = BackoffConfig::new(0, Duration::from_millis(10), Duration::from_secs(1));
        assert!(zero_attempts.validate().is_err());

        let inverted = BackoffConfig::new(3, Duration::from_secs(2), Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        let valid = BackoffConfig::new(3, Duration::from_millis(10), Duration::from_secs(1));
        assert!(valid.validate().is_ok());
    }

    /// Validates `BackoffSequence` behavior for the decorrelated-jitter
    /// formula scenario.
    ///
    /// With seed 100ms and units [0.5, 0.0, 0.9] the chain is:
    /// 100ms * 3 * 0.5 = 150ms, then 150ms * 3 * 0.0 lifted to the 100ms
    /// floor, then 100ms * 3 * 0.9 = 270ms.
    ///
    /// Assertions:
    /// - Confirms the three yielded delays equal 150ms, 100ms, 270ms.
    /// - Confirms the fourth call yields `None`.
    #[test]
    fn test_sequence_follows_formula() {
        let config = BackoffConfig::new(3, Duration::from_millis(100), Duration::from_secs(10));
        let mut seq = config.sequence_with(FixedSequence::new([0.5, 0.0, 0.9]));

        assert_eq!(seq.next(), Some(Duration::from_millis(150)));
        assert_eq!(seq.next(), Some(Duration::from_millis(100)));
        assert_eq!(seq.next(), Some(Duration::from_millis(270)));
        assert_eq!(seq.next(), None);
    }

    /// Validates `BackoffSequence` behavior for the upper clamp scenario.
    ///
    /// Assertions:
    /// - Confirms a spread above `max_delay` is clamped to `max_delay`.
    /// - Confirms subsequent elements stay clamped.
    #[test]
    fn test_sequence_clamps_to_max_delay() {
        let config = BackoffConfig::new(3, Duration::from_millis(100), Duration::from_millis(200));
        let mut seq = config.sequence_with(FixedSequence::new([0.9]));

        assert_eq!(seq.next(), Some(Duration::from_millis(200)));
        assert_eq!(seq.next(), Some(Duration::from_millis(200)));
    }

    /// Validates `BackoffSequence` behavior for the lower clamp scenario.
    ///
    /// Assertions:
    /// - Confirms near-zero units never push a delay below `seed_delay`.
    #[test]
    fn test_sequence_clamps_to_seed_delay() {
        let config = BackoffConfig::new(4, Duration::from_millis(50), Duration::from_secs(5));
        let seq = config.sequence_with(FixedSequence::new([0.0, 0.001]));

        for delay in seq {
            assert!(delay >= Duration::from_millis(50));
        }
    }

    /// Validates `BackoffSequence` behavior for the exhaustion scenario.
    ///
    /// Assertions:
    /// - Confirms exactly `max_attempts` values are yielded.
    /// - Confirms the cursor keeps yielding `None` afterwards.
    /// - Confirms `size_hint()` tracks the remaining budget.
    #[test]
    fn test_sequence_yields_exactly_max_attempts() {
        let config = BackoffConfig::new(5, Duration::from_millis(10), Duration::from_secs(1));
        let mut seq = config.sequence_with(SeededRandom::new(7));

        assert_eq!(seq.size_hint(), (5, Some(5)));
        for _ in 0..5 {
            assert!(seq.next().is_some());
        }
        assert_eq!(seq.size_hint(), (0, Some(0)));
        assert_eq!(seq.next(), None);
        assert_eq!(seq.next(), None);
    }

    /// Validates `BackoffSequence` behavior for the bounds property
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures every yielded value lies in `[seed_delay, max_delay]`
    ///   across many seeds.
    #[test]
    fn test_sequence_values_stay_in_bounds() {
        let config = BackoffConfig::new(50, Duration::from_millis(25), Duration::from_millis(400));
        for seed in 0..20 {
            let seq = config.sequence_with(SeededRandom::new(seed));
            for delay in seq {
                assert!(delay >= config.seed_delay, "delay {delay:?} under seed");
                assert!(delay <= config.max_delay, "delay {delay:?} over max");
            }
        }
    }

    /// Validates `BackoffConfig::sequence_with` behavior for the independent
    /// cursor scenario.
    ///
    /// Assertions:
    /// - Confirms two sequences from the same configuration yield identical
    ///   values when given identical random sources.
    #[test]
    fn test_fresh_cursors_are_independent() {
        let config = BackoffConfig::new(4, Duration::from_millis(20), Duration::from_secs(2));
        let first: Vec<_> = config.sequence_with(SeededRandom::new(99)).collect();
        let second: Vec<_> = config.sequence_with(SeededRandom::new(99)).collect();
        assert_eq!(first, second);
    }

    /// Validates `BackoffSequence` behavior for the degenerate zero-delay
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a zero seed and zero cap yield all-zero delays.
    #[test]
    fn test_sequence_allows_zero_delays() {
        let config = BackoffConfig::new(3, Duration::ZERO, Duration::ZERO);
        let delays: Vec<_> = config.sequence_with(FixedSequence::new([0.7])).collect();
        assert_eq!(delays, vec![Duration::ZERO; 3]);
    }
}
