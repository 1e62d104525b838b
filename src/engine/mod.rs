//! Shared tick/backoff/restart skeleton used by both background engines.
//!
//! Each engine is a single tokio task that owns its state and a
//! [`DelayedTask`] holding at most one pending deadline. The task only
//! schedules the next tick after the current one has finished, so tick
//! logic never re-enters itself.
//!
//! ```text
//! ┌─────────┐ start ┌──────────────┐ timer ┌─────────┐
//! │ Stopped ├──────►│ RunningIdle  ├──────►│ Ticking │
//! └────▲────┘       └──────▲───────┘       └────┬────┘
//!      │ stop              │ ok / retry         │
//!      │                   └────────────────────┤
//!      │                   ┌────────────┐ cap   │
//!      └───────────────────┤ Restarting │◄──────┘
//!                          └────────────┘
//! ```

pub mod backoff;
pub mod clock;
pub mod timer;

pub use backoff::{FailureOutcome, FailureTracker, RetryPolicy};
pub use clock::{Clock, SystemClock};
pub use timer::{DelayedTask, TimerKind};

use serde::{Deserialize, Serialize};

/// Coarse lifecycle state of an engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Not ticking; `start` is required.
    Stopped,
    /// Waiting for the next tick deadline.
    RunningIdle,
    /// Executing a tick.
    Ticking,
    /// Waiting out the cooldown after exceeding the failure threshold.
    Restarting,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::RunningIdle => "running_idle",
            Self::Ticking => "ticking",
            Self::Restarting => "restarting",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a tick failure notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickFailure {
    /// Rendered error that failed the tick.
    pub error: String,
    /// Failure streak including this failure.
    pub consecutive_failures: u32,
    /// Delay before the engine acts again, in milliseconds.
    pub next_retry_delay_ms: u64,
}

impl TickFailure {
    pub fn new(error: &crate::EngineError, outcome: &FailureOutcome) -> Self {
        Self::with_delay(error, outcome.consecutive_failures(), outcome.next_delay())
    }

    /// Failure report for a delay that did not come from the backoff policy.
    pub fn with_delay(
        error: &crate::EngineError,
        consecutive_failures: u32,
        delay: std::time::Duration,
    ) -> Self {
        Self {
            error: error.to_string(),
            consecutive_failures,
            next_retry_delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
