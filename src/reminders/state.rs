//! Pure reminder bookkeeping: working set, fired and dismissed keys.
//!
//! No timers and no I/O. The engine task feeds it the current time and
//! turns its results into notifications.

use crate::calendar::{Event, EventId};
use crate::config::ReminderConfig;
use crate::error::{EngineError, Result};
use crate::reminders::model::{
    Heartbeat, ParsedReminder, ReminderKey, TriggeredReminder, UpdateSummary,
};
use crate::reminders::offset::parse_offset;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct WorkingEvent {
    event: Event,
    reminders: Vec<ParsedReminder>,
}

/// Reminder state owned by a single engine task.
#[derive(Debug)]
pub struct ReminderState {
    working_set: BTreeMap<EventId, WorkingEvent>,
    fired: HashSet<ReminderKey>,
    dismissed: HashSet<ReminderKey>,
    primed: bool,
    due_window: TimeDelta,
    backfill_threshold: TimeDelta,
}

impl ReminderState {
    pub fn new(config: &ReminderConfig) -> Self {
        Self {
            working_set: BTreeMap::new(),
            fired: HashSet::new(),
            dismissed: HashSet::new(),
            primed: false,
            due_window: secs_to_delta(config.due_window_secs),
            backfill_threshold: secs_to_delta(config.backfill_threshold_secs),
        }
    }

    /// Replace the working set wholesale.
    ///
    /// The first update that populates a never-primed engine marks every
    /// reminder further than the backfill threshold in the past as fired
    /// without surfacing it.
    pub fn replace_events(&mut self, events: Vec<Event>, now: DateTime<Utc>) -> UpdateSummary {
        let mut working_set = BTreeMap::new();
        let mut reminder_count = 0;

        for event in events {
            let reminders = parse_reminders(&event);
            reminder_count += reminders.len();
            working_set.insert(event.id, WorkingEvent { event, reminders });
        }

        self.working_set = working_set;
        let mut summary = UpdateSummary {
            events: self.working_set.len(),
            reminders: reminder_count,
            backfilled: 0,
        };

        if !self.primed && !self.working_set.is_empty() {
            self.primed = true;
            summary.backfilled = self.backfill(now);
            debug!(
                backfilled = summary.backfilled,
                "first event push; stale reminders marked fired"
            );
        }

        summary
    }

    fn backfill(&mut self, now: DateTime<Utc>) -> usize {
        let mut stale = Vec::new();
        for working in self.working_set.values() {
            for reminder in &working.reminders {
                // Unrepresentable fire times surface as tick failures instead.
                let Ok(key) = reminder_key(&working.event, reminder) else {
                    continue;
                };
                if now.signed_duration_since(key.fire_at) > self.backfill_threshold {
                    stale.push(key);
                }
            }
        }

        stale
            .into_iter()
            .filter(|key| self.fired.insert(key.clone()))
            .count()
    }

    /// Collect reminders that became due at `now` and mark them fired.
    ///
    /// Either every due reminder is marked fired or, on error, none is.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Result<Vec<TriggeredReminder>> {
        let mut candidates = Vec::new();

        for working in self.working_set.values() {
            for reminder in &working.reminders {
                let key = reminder_key(&working.event, reminder)?;
                if !self.is_due(key.fire_at, now) {
                    continue;
                }
                if self.fired.contains(&key) || self.dismissed.contains(&key) {
                    continue;
                }
                candidates.push(TriggeredReminder {
                    event: working.event.clone(),
                    label: reminder.label.clone(),
                    fire_at: key.fire_at,
                    key,
                });
            }
        }

        // Duplicate labels on one event collapse to a single key here.
        let triggered: Vec<TriggeredReminder> = candidates
            .into_iter()
            .filter(|reminder| self.fired.insert(reminder.key.clone()))
            .collect();

        for reminder in &triggered {
            trace!(key = %reminder.key, "reminder due");
        }
        Ok(triggered)
    }

    fn is_due(&self, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let since = now.signed_duration_since(fire_at);
        since >= TimeDelta::zero() && since <= self.due_window
    }

    /// Permanently silence `key`. Returns `false` if it was already dismissed.
    pub fn dismiss(&mut self, key: ReminderKey) -> bool {
        self.fired.insert(key.clone());
        self.dismissed.insert(key)
    }

    /// Forget transient fired state so missed reminders can surface again.
    /// Dismissed keys stay silenced.
    pub fn clear_fired(&mut self) -> usize {
        let cleared = self.fired.len();
        self.fired.clear();
        cleared
    }

    /// Heartbeat snapshot for `now`.
    #[must_use]
    pub fn heartbeat(&self, now: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            now,
            working_set_size: self.working_set.len(),
            fired_count: self.fired.len(),
        }
    }

    #[must_use]
    pub fn working_set_size(&self) -> usize {
        self.working_set.len()
    }

    #[must_use]
    pub fn reminder_count(&self) -> usize {
        self.working_set.values().map(|w| w.reminders.len()).sum()
    }

    #[must_use]
    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    #[must_use]
    pub fn dismissed_count(&self) -> usize {
        self.dismissed.len()
    }

    #[must_use]
    pub fn is_fired(&self, key: &ReminderKey) -> bool {
        self.fired.contains(key)
    }

    #[must_use]
    pub fn is_dismissed(&self, key: &ReminderKey) -> bool {
        self.dismissed.contains(key)
    }
}

fn parse_reminders(event: &Event) -> Vec<ParsedReminder> {
    event
        .reminders
        .iter()
        .filter_map(|label| match parse_offset(label) {
            Some(offset_minutes) => Some(ParsedReminder {
                label: label.clone(),
                offset_minutes,
            }),
            None => {
                trace!(event_id = %event.id, label = %label, "unrecognized reminder label");
                None
            }
        })
        .collect()
}

/// Key of `reminder` on `event`: fire time is `start − offset`.
pub fn reminder_key(event: &Event, reminder: &ParsedReminder) -> Result<ReminderKey> {
    let fire_at = TimeDelta::try_minutes(i64::from(reminder.offset_minutes))
        .and_then(|offset| event.start.checked_sub_signed(offset))
        .ok_or_else(|| {
            EngineError::Reminder(format!(
                "fire time out of range for event {} ({})",
                event.id, reminder.label
            ))
        })?;

    Ok(ReminderKey {
        event_id: event.id,
        label: reminder.label.clone(),
        fire_at,
    })
}

fn secs_to_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
