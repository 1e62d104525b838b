//! Calminder: background reminder evaluation and calendar sync engines.
//!
//! Two independent, self-healing tokio tasks driven by a host over a
//! versioned JSON command channel:
//!
//! - **Reminder engine**: holds the current event list, works out which
//!   reminders became due on each tick, and surfaces each one once.
//! - **Sync scheduler**: periodically re-fetches external calendar feeds
//!   and reports per-source outcomes.
//!
//! # Architecture
//!
//! Both engines share the tick/backoff/restart skeleton in [`engine`].
//! Each owns its state exclusively; the host talks to it only through a
//! command queue and receives notifications back, bridged onto
//! newline-delimited JSON by [`host::stdio`].

pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod reminders;
pub mod store;
pub mod sync;

pub use calendar::{CalendarSource, Event, EventDraft, EventId, SourceId, SourceKind};
pub use config::CalminderConfig;
pub use engine::{Clock, LifecycleState, SystemClock};
pub use error::{EngineError, Result};
pub use reminders::{ReminderEngine, ReminderHandle, ReminderKey, ReminderNotification};
pub use sync::{SourceSyncer, SyncHandle, SyncNotification, SyncScheduler};
