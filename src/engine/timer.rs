//! Cancellable single-slot delayed task.
//!
//! An engine keeps exactly one [`DelayedTask`]. Scheduling replaces any
//! pending deadline and cancelling clears it, so `stop` can always
//! withdraw a tick that has not fired yet.

use std::time::Duration;
use tokio::time::Instant;

/// What a pending deadline resumes when it elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Run the next tick.
    Tick,
    /// Resume the tick loop after a restart cooldown.
    Restart,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    kind: TimerKind,
}

/// Holds at most one pending deadline.
#[derive(Debug, Default)]
pub struct DelayedTask {
    pending: Option<Pending>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` after `delay`, replacing any pending deadline.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.pending = Some(Pending {
            deadline: Instant::now() + delay,
            kind,
        });
    }

    /// Withdraw the pending deadline, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Kind of the pending deadline.
    #[must_use]
    pub fn kind(&self) -> Option<TimerKind> {
        self.pending.map(|p| p.kind)
    }

    /// Time left until the pending deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.pending
            .map(|p| p.deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the pending deadline elapses. Never resolves when
    /// nothing is scheduled.
    ///
    /// The deadline stays set; callers take it with [`DelayedTask::take`]
    /// once this resolves.
    pub async fn elapsed(&self) -> TimerKind {
        match self.pending {
            Some(pending) => {
                tokio::time::sleep_until(pending.deadline).await;
                pending.kind
            }
            None => std::future::pending().await,
        }
    }

    /// Clear and return the pending kind.
    pub fn take(&mut self) -> Option<TimerKind> {
        self.pending.take().map(|p| p.kind)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_resolves_after_delay() {
        let mut task = DelayedTask::new();
        task.schedule(TimerKind::Tick, Duration::from_secs(15));

        let started = Instant::now();
        let kind = task.elapsed().await;
        assert_eq!(kind, TimerKind::Tick);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(task.take(), Some(TimerKind::Tick));
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_resolves() {
        let mut task = DelayedTask::new();
        task.schedule(TimerKind::Tick, Duration::from_secs(1));
        task.cancel();

        let result = tokio::time::timeout(Duration::from_secs(60), task.elapsed()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_replaces_pending_deadline() {
        let mut task = DelayedTask::new();
        task.schedule(TimerKind::Tick, Duration::from_secs(15));
        task.schedule(TimerKind::Restart, Duration::from_secs(5));

        assert_eq!(task.kind(), Some(TimerKind::Restart));
        assert_eq!(task.remaining(), Some(Duration::from_secs(5)));
    }
}
