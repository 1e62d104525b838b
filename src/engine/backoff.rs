//! Exponential backoff with ceiling and a failure counter that triggers
//! restarts once a threshold is reached.

use crate::config::{ReminderConfig, SyncConfig};
use std::time::Duration;

/// Timing policy shared by the tick loop of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between ticks while healthy.
    pub tick_interval: Duration,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Ceiling for the backoff delay.
    pub max_retry_delay: Duration,
    /// Consecutive failures that trigger a restart.
    pub max_retries: u32,
    /// Delay between a restart and the resumed tick loop.
    pub restart_cooldown: Duration,
}

impl RetryPolicy {
    /// Backoff delay after `failures` consecutive failures:
    /// `min(base × 2^failures, max)`.
    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let shift = failures.min(31);
        let multiplier = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(multiplier)
            .min(self.max_retry_delay)
    }

    /// Delay until the next tick given the current failure streak.
    #[must_use]
    pub fn next_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            self.tick_interval
        } else {
            self.retry_delay(failures)
        }
    }
}

impl From<&ReminderConfig> for RetryPolicy {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
            max_retries: config.max_retries.max(1),
            restart_cooldown: Duration::from_millis(config.restart_cooldown_ms),
        }
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.interval_secs.max(1)),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
            max_retries: config.max_retries.max(1),
            restart_cooldown: Duration::from_millis(config.restart_cooldown_ms),
        }
    }
}

/// What the engine must do after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Keep running; retry after `next_delay`.
    Retry {
        /// Failure streak including this failure.
        consecutive_failures: u32,
        /// Backoff delay before the next tick.
        next_delay: Duration,
    },
    /// Threshold reached; the counter is already reset and the engine must
    /// restart after `cooldown`.
    Restart {
        /// Failure streak that triggered the restart.
        consecutive_failures: u32,
        /// Delay before ticking resumes.
        cooldown: Duration,
    },
}

impl FailureOutcome {
    /// Delay reported to the host alongside the failure.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        match self {
            Self::Retry { next_delay, .. } => *next_delay,
            Self::Restart { cooldown, .. } => *cooldown,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        match self {
            Self::Retry {
                consecutive_failures,
                ..
            }
            | Self::Restart {
                consecutive_failures,
                ..
            } => *consecutive_failures,
        }
    }
}

/// Tracks the consecutive failure streak of one engine.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    policy: RetryPolicy,
    consecutive: u32,
    total_failures: u64,
    restarts: u32,
}

impl FailureTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
            total_failures: 0,
            restarts: 0,
        }
    }

    /// Record a successful tick; the streak drops to zero.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failed tick and decide between retry and restart.
    pub fn record_failure(&mut self) -> FailureOutcome {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive = self
            .consecutive
            .saturating_add(1)
            .min(self.policy.max_retries);

        if self.consecutive >= self.policy.max_retries {
            let consecutive_failures = self.consecutive;
            self.consecutive = 0;
            self.restarts = self.restarts.saturating_add(1);
            return FailureOutcome::Restart {
                consecutive_failures,
                cooldown: self.policy.restart_cooldown,
            };
        }

        FailureOutcome::Retry {
            consecutive_failures: self.consecutive,
            next_delay: self.policy.retry_delay(self.consecutive),
        }
    }

    /// Clear the streak without counting a success (host liveness signal).
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Delay until the next tick given the current streak.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        self.policy.next_delay(self.consecutive)
    }

    #[must_use]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn reminder_policy() -> RetryPolicy {
        RetryPolicy::from(&ReminderConfig::default())
    }

    #[test]
    fn healthy_engine_uses_tick_interval() {
        let tracker = FailureTracker::new(reminder_policy());
        assert_eq!(tracker.next_delay(), Duration::from_secs(15));
    }

    #[test]
    fn consecutive_failures_grow_delay_strictly() {
        let mut tracker = FailureTracker::new(reminder_policy());
        let delays: Vec<Duration> = (0..3)
            .map(|_| tracker.record_failure().next_delay())
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(tracker.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn success_resets_streak() {
        let mut tracker = FailureTracker::new(reminder_policy());
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success();
        assert_eq!(tracker.consecutive(), 0);
        assert_eq!(tracker.next_delay(), Duration::from_secs(15));
        assert_eq!(tracker.total_failures(), 2);
    }

    #[test]
    fn retry_delay_is_capped() {
        let policy = RetryPolicy::from(&SyncConfig::default());
        assert_eq!(policy.retry_delay(1), Duration::from_secs(20));
        assert_eq!(policy.retry_delay(8), Duration::from_secs(1800));
        assert_eq!(policy.retry_delay(u32::MAX), Duration::from_secs(1800));
    }

    #[test]
    fn threshold_triggers_restart_and_resets_counter() {
        let mut tracker = FailureTracker::new(reminder_policy());
        for _ in 0..4 {
            assert!(matches!(
                tracker.record_failure(),
                FailureOutcome::Retry { .. }
            ));
        }

        let outcome = tracker.record_failure();
        assert_eq!(
            outcome,
            FailureOutcome::Restart {
                consecutive_failures: 5,
                cooldown: Duration::from_secs(5),
            }
        );
        assert_eq!(tracker.consecutive(), 0);
        assert_eq!(tracker.restarts(), 1);
    }

    #[test]
    fn zero_interval_is_clamped_to_one_second() {
        let reminders = ReminderConfig {
            tick_interval_secs: 0,
            ..ReminderConfig::default()
        };
        let sync = SyncConfig {
            interval_secs: 0,
            ..SyncConfig::default()
        };
        assert_eq!(RetryPolicy::from(&reminders).tick_interval, Duration::from_secs(1));
        assert_eq!(RetryPolicy::from(&sync).tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn sync_policy_restarts_after_three_failures() {
        let mut tracker = FailureTracker::new(RetryPolicy::from(&SyncConfig::default()));
        tracker.record_failure();
        tracker.record_failure();
        let outcome = tracker.record_failure();
        assert_eq!(outcome.next_delay(), Duration::from_secs(30));
        assert_eq!(outcome.consecutive_failures(), 3);
    }
}
