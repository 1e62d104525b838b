//! Reminder evaluation engine.
//!
//! Parses free-text reminder labels into offsets, computes which
//! reminders are due on each tick, and surfaces each reminder instance at
//! most once per process lifetime unless the host clears fired state.

pub mod engine;
pub mod model;
pub mod offset;
pub mod state;

pub use engine::{
    ReminderCommand, ReminderEngine, ReminderHandle, ReminderNotification, ReminderStatus,
};
pub use model::{Heartbeat, ParsedReminder, ReminderKey, TriggeredReminder, UpdateSummary};
pub use offset::parse_offset;
pub use state::ReminderState;
