//! Reminder identities and notification payloads.

use crate::calendar::{Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reminder label the offset parser recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReminder {
    /// Original label text; part of the reminder's identity.
    pub label: String,
    /// Minutes before the event start.
    pub offset_minutes: u32,
}

/// Identity of one reminder instance.
///
/// Two reminders are the same instance iff event id, label and fire time
/// all match. The fire time derives from the event's own start, never
/// from the clock, so keys are stable across ticks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReminderKey {
    pub event_id: EventId,
    pub label: String,
    pub fire_at: DateTime<Utc>,
}

impl std::fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.event_id,
            self.label,
            self.fire_at.timestamp_millis()
        )
    }
}

/// A reminder that became due during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredReminder {
    pub event: Event,
    pub label: String,
    pub fire_at: DateTime<Utc>,
    pub key: ReminderKey,
}

/// Liveness signal emitted after every successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub now: DateTime<Utc>,
    pub working_set_size: usize,
    pub fired_count: usize,
}

/// Result of replacing the working set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Events now held.
    pub events: usize,
    /// Parsed reminders across those events.
    pub reminders: usize,
    /// Stale reminders silently marked fired by the first-update backfill.
    pub backfilled: usize,
}
