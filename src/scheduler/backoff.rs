//! Tick-level backoff for scheduled passes
//!
//! Failed passes are never retried inline. Instead the timer skips a growing number
//! of ticks after consecutive transport failures, so a struggling upstream is not
//! hammered every interval. Other failures just wait for the next tick.

use tracing::debug;

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Count towards the backoff streak and skip ticks accordingly
    Backoff,
    /// Retry on the next regular tick
    NextTick,
    /// Nothing to retry, the failure is not the pass's own
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    /// Determine how the scheduler should react to this error
    fn retry_decision(&self) -> RetryDecision;
}

/// How many ticks to skip after a streak of transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Upper bound on consecutive skipped ticks
    pub max_skipped_ticks: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { max_skipped_ticks: 8 }
    }
}

impl BackoffPolicy {
    pub fn new(max_skipped_ticks: u32) -> Self {
        Self { max_skipped_ticks }
    }

    /// Ticks to skip after `failures` consecutive failures: `2^(n-1) - 1`, capped
    pub fn skipped_ticks(&self, failures: u32) -> u32 {
        if failures == 0 {
            return 0;
        }
        let exponent = (failures - 1).min(31);
        let skip = (1u64 << exponent) - 1;
        skip.min(u64::from(self.max_skipped_ticks)) as u32
    }
}

/// Per-job backoff state, owned by the job's timer task
#[derive(Debug, Clone, Default)]
pub struct TickBackoff {
    policy: BackoffPolicy,
    consecutive_failures: u32,
    remaining_skips: u32,
}

impl TickBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            remaining_skips: 0,
        }
    }

    /// Consume one tick; true when this tick must be skipped
    pub fn should_skip(&mut self) -> bool {
        if self.remaining_skips > 0 {
            self.remaining_skips -= 1;
            true
        } else {
            false
        }
    }

    /// A pass succeeded: forget the streak
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.remaining_skips = 0;
    }

    /// A pass failed; returns the number of ticks that will now be skipped
    pub fn record_failure(&mut self, decision: RetryDecision) -> u32 {
        if decision == RetryDecision::Backoff {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.remaining_skips = self.policy.skipped_ticks(self.consecutive_failures);
            debug!(
                failures = self.consecutive_failures,
                skipped_ticks = self.remaining_skips,
                "Backing off scheduled passes"
            );
        }
        self.remaining_skips
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_ticks_growth() {
        let policy = BackoffPolicy::new(8);

        // 0, 0, 1, 3, 7, then capped at 8
        assert_eq!(policy.skipped_ticks(0), 0);
        assert_eq!(policy.skipped_ticks(1), 0);
        assert_eq!(policy.skipped_ticks(2), 1);
        assert_eq!(policy.skipped_ticks(3), 3);
        assert_eq!(policy.skipped_ticks(4), 7);
        assert_eq!(policy.skipped_ticks(5), 8);
        assert_eq!(policy.skipped_ticks(200), 8);
    }

    #[test]
    fn test_skips_are_consumed_tick_by_tick() {
        let mut backoff = TickBackoff::new(BackoffPolicy::new(8));

        assert_eq!(backoff.record_failure(RetryDecision::Backoff), 0);
        assert!(!backoff.should_skip());

        assert_eq!(backoff.record_failure(RetryDecision::Backoff), 1);
        assert!(backoff.should_skip());
        assert!(!backoff.should_skip());

        assert_eq!(backoff.record_failure(RetryDecision::Backoff), 3);
        assert_eq!(backoff.consecutive_failures(), 3);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut backoff = TickBackoff::new(BackoffPolicy::default());
        backoff.record_failure(RetryDecision::Backoff);
        backoff.record_failure(RetryDecision::Backoff);
        backoff.record_failure(RetryDecision::Backoff);

        backoff.record_success();

        assert_eq!(backoff.consecutive_failures(), 0);
        assert!(!backoff.should_skip());
    }

    #[test]
    fn test_non_transport_failures_do_not_back_off() {
        let mut backoff = TickBackoff::new(BackoffPolicy::default());
        assert_eq!(backoff.record_failure(RetryDecision::NextTick), 0);
        assert_eq!(backoff.record_failure(RetryDecision::NoRetry), 0);
        assert_eq!(backoff.consecutive_failures(), 0);
        assert!(!backoff.should_skip());
    }
}
