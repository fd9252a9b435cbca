//! # Respawn backoff.
//!
//! [`BackoffState`] counts consecutive transport failures and turns the count
//! into the delay before the next respawn:
//!
//! ```text
//! failure_count = min(failure_count + 1, max_failure)
//! delay         = base_delay ^ failure_count   (seconds)
//! ```
//!
//! The counter is owned by one supervisor and only moves forward: a worker that
//! runs cleanly does **not** reset it, so the delay after a late failure is the
//! same as the delay after the failure that preceded the clean run.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use shipvisor::BackoffState;
//!
//! let mut backoff = BackoffState::new(2, 3);
//! assert_eq!(backoff.record_failure(), Duration::from_secs(3));
//! assert_eq!(backoff.record_failure(), Duration::from_secs(9));
//!
//! // capped at max_failure = 2
//! assert_eq!(backoff.record_failure(), Duration::from_secs(9));
//! assert_eq!(backoff.failure_count(), 2);
//! ```

use std::time::Duration;

/// Capped failure counter with exponential delay.
///
/// ### Invariants
/// - `failure_count <= max_failure`
/// - `max_failure >= 1`, `base_delay >= 1` (clamped on construction)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffState {
    failure_count: u32,
    max_failure: u32,
    base_delay: u64,
}

impl BackoffState {
    /// Creates a state with `failure_count = 0`.
    ///
    /// Zero values are clamped to 1; validated configs never produce them.
    pub fn new(max_failure: u32, base_delay: u64) -> Self {
        Self {
            failure_count: 0,
            max_failure: max_failure.max(1),
            base_delay: base_delay.max(1),
        }
    }

    /// Records one transport failure and returns the delay before the respawn.
    pub fn record_failure(&mut self) -> Duration {
        self.failure_count = self.failure_count.saturating_add(1).min(self.max_failure);
        self.delay()
    }

    /// Delay for the current failure count (`base_delay ^ failure_count` seconds).
    ///
    /// Saturates at `u64::MAX` seconds instead of overflowing.
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.base_delay.saturating_pow(self.failure_count))
    }

    /// Consecutive failures counted so far (never above `max_failure`).
    #[inline]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Configured cap on counted failures.
    #[inline]
    pub fn max_failure(&self) -> u32 {
        self.max_failure
    }

    /// Configured base delay, in seconds.
    #[inline]
    pub fn base_delay(&self) -> u64 {
        self.base_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays(state: &mut BackoffState, n: usize) -> Vec<u64> {
        (0..n).map(|_| state.record_failure().as_secs()).collect()
    }

    #[test]
    fn test_fresh_state_has_no_failures() {
        let state = BackoffState::new(5, 2);
        assert_eq!(state.failure_count(), 0);
        assert_eq!(state.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_growth_below_cap() {
        let mut state = BackoffState::new(5, 2);
        assert_eq!(delays(&mut state, 3), vec![2, 4, 8]);
        assert_eq!(state.failure_count(), 3);
    }

    #[test]
    fn test_delay_stabilizes_at_cap() {
        let mut state = BackoffState::new(2, 3);
        assert_eq!(delays(&mut state, 4), vec![3, 9, 9, 9]);
        assert_eq!(state.failure_count(), 2);
    }

    #[test]
    fn test_delay_matches_power_for_every_count() {
        for base in 1..=4u64 {
            for max in 1..=6u32 {
                let mut state = BackoffState::new(max, base);
                for k in 1..=(max + 3) {
                    let delay = state.record_failure();
                    let expected = base.pow(k.min(max));
                    assert_eq!(
                        delay,
                        Duration::from_secs(expected),
                        "base={base} max={max} k={k}"
                    );
                    assert!(state.failure_count() <= max);
                }
            }
        }
    }

    #[test]
    fn test_base_one_is_constant() {
        let mut state = BackoffState::new(10, 1);
        assert!(delays(&mut state, 12).iter().all(|d| *d == 1));
    }

    #[test]
    fn test_zero_inputs_are_clamped() {
        let mut state = BackoffState::new(0, 0);
        assert_eq!(state.max_failure(), 1);
        assert_eq!(state.base_delay(), 1);
        assert_eq!(state.record_failure(), Duration::from_secs(1));
        assert_eq!(state.failure_count(), 1);
    }

    #[test]
    fn test_huge_power_saturates() {
        let mut state = BackoffState::new(u32::MAX, u64::MAX);
        state.record_failure();
        assert_eq!(state.record_failure(), Duration::from_secs(u64::MAX));
    }
}
