//! Wiring between the engine tasks and the host event stream.

use crate::calendar::{CalendarSource, Event};
use crate::config::CalminderConfig;
use crate::engine::Clock;
use crate::error::{EngineError, Result};
use crate::host::contract::{EventEnvelope, EventName};
use crate::reminders::{
    ReminderEngine, ReminderHandle, ReminderKey, ReminderNotification, ReminderStatus,
};
use crate::sync::{SourceSyncer, SyncHandle, SyncNotification, SyncScheduler, SyncStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Engine operations the host command router dispatches to.
#[async_trait]
pub trait EngineHandler: Send + Sync + 'static {
    async fn reminders_start(&self) -> Result<()>;
    async fn reminders_stop(&self) -> Result<()>;
    async fn reminders_update_events(&self, events: Vec<Event>) -> Result<()>;
    async fn reminders_dismiss(&self, key: ReminderKey) -> Result<()>;
    async fn reminders_clear_fired(&self) -> Result<()>;
    async fn reminders_status(&self) -> Result<ReminderStatus>;

    async fn sync_start(&self) -> Result<()>;
    async fn sync_stop(&self) -> Result<()>;
    async fn sync_update_sources(&self, sources: Vec<CalendarSource>) -> Result<()>;
    async fn sync_trigger_now(&self) -> Result<()>;
    async fn sync_status(&self) -> Result<SyncStatus>;
}

/// Command handles for both running engines.
#[derive(Debug, Clone)]
pub struct EngineHandles {
    pub reminders: ReminderHandle,
    pub sync: SyncHandle,
}

#[async_trait]
impl EngineHandler for EngineHandles {
    async fn reminders_start(&self) -> Result<()> {
        self.reminders.start().await
    }

    async fn reminders_stop(&self) -> Result<()> {
        self.reminders.stop().await
    }

    async fn reminders_update_events(&self, events: Vec<Event>) -> Result<()> {
        self.reminders.update_events(events).await
    }

    async fn reminders_dismiss(&self, key: ReminderKey) -> Result<()> {
        self.reminders.dismiss(key).await
    }

    async fn reminders_clear_fired(&self) -> Result<()> {
        self.reminders.clear_fired().await
    }

    async fn reminders_status(&self) -> Result<ReminderStatus> {
        self.reminders.status().await
    }

    async fn sync_start(&self) -> Result<()> {
        self.sync.start().await
    }

    async fn sync_stop(&self) -> Result<()> {
        self.sync.stop().await
    }

    async fn sync_update_sources(&self, sources: Vec<CalendarSource>) -> Result<()> {
        self.sync.update_sources(sources).await
    }

    async fn sync_trigger_now(&self) -> Result<()> {
        self.sync.trigger_now().await
    }

    async fn sync_status(&self) -> Result<SyncStatus> {
        self.sync.status().await
    }
}

/// Spawn both engines and publish their notifications on `event_tx`.
///
/// Engines start stopped. Their tasks end once every returned handle is
/// dropped; a task that panics is reported as `engine.fatal_error`.
pub fn spawn_engines(
    config: &CalminderConfig,
    syncer: Arc<dyn SourceSyncer>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> EngineHandles {
    let capacity = config.host.engine_command_capacity;

    let (reminder_tx, reminder_rx) = mpsc::unbounded_channel();
    let (reminders, engine) =
        ReminderEngine::new(&config.reminders, capacity, Arc::clone(&clock), reminder_tx);
    watch_engine("reminders", engine.spawn(), event_tx.clone());
    forward_reminder_notifications(reminder_rx, event_tx.clone());

    let (sync_tx, sync_rx) = mpsc::unbounded_channel();
    let (sync, scheduler) = SyncScheduler::new(&config.sync, capacity, syncer, clock, sync_tx);
    watch_engine("sync", scheduler.spawn(), event_tx.clone());
    forward_sync_notifications(sync_rx, event_tx);

    EngineHandles { reminders, sync }
}

/// Convert a reminder engine notification to a host event.
pub fn reminder_event(notification: &ReminderNotification) -> Result<EventEnvelope> {
    let (name, payload) = match notification {
        ReminderNotification::Triggered { reminders } => (
            EventName::RemindersTriggered,
            serde_json::json!({ "reminders": to_payload(reminders)? }),
        ),
        ReminderNotification::Heartbeat(heartbeat) => {
            (EventName::RemindersHeartbeat, to_payload(heartbeat)?)
        }
        ReminderNotification::TickError(failure) => {
            (EventName::RemindersTickError, to_payload(failure)?)
        }
        ReminderNotification::Restarted { timestamp } => (
            EventName::RemindersRestarted,
            serde_json::json!({ "timestamp": timestamp }),
        ),
    };
    Ok(EventEnvelope::fresh(name, payload))
}

/// Convert a sync scheduler notification to a host event.
pub fn sync_event(notification: &SyncNotification) -> Result<EventEnvelope> {
    let (name, payload) = match notification {
        SyncNotification::BatchCompleted(report) => {
            (EventName::SyncBatchCompleted, to_payload(report)?)
        }
        SyncNotification::TickError(failure) => (EventName::SyncTickError, to_payload(failure)?),
        SyncNotification::Restarted { timestamp } => (
            EventName::SyncRestarted,
            serde_json::json!({ "timestamp": timestamp }),
        ),
    };
    Ok(EventEnvelope::fresh(name, payload))
}

/// Build an `engine.fatal_error` event.
#[must_use]
pub fn fatal_error_event(engine: &str, error: &str) -> EventEnvelope {
    EventEnvelope::fresh(
        EventName::EngineFatalError,
        serde_json::json!({ "engine": engine, "error": error }),
    )
}

fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::Contract(format!("failed to encode event payload: {e}")))
}

fn forward_reminder_notifications(
    mut rx: mpsc::UnboundedReceiver<ReminderNotification>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match reminder_event(&notification) {
                Ok(envelope) => {
                    let _ = event_tx.send(envelope);
                }
                Err(e) => tracing::error!(error = %e, "dropping reminder notification"),
            }
        }
        tracing::debug!("reminder notification stream ended");
    })
}

fn forward_sync_notifications(
    mut rx: mpsc::UnboundedReceiver<SyncNotification>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match sync_event(&notification) {
                Ok(envelope) => {
                    let _ = event_tx.send(envelope);
                }
                Err(e) => tracing::error!(error = %e, "dropping sync notification"),
            }
        }
        tracing::debug!("sync notification stream ended");
    })
}

fn watch_engine(
    engine: &'static str,
    task: JoinHandle<()>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match task.await {
            Ok(()) => tracing::debug!(engine, "engine task exited"),
            Err(e) => {
                tracing::error!(engine, error = %e, "engine task died");
                let _ = event_tx.send(fatal_error_event(engine, &e.to_string()));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::engine::{FailureOutcome, TickFailure};
    use crate::reminders::Heartbeat;
    use crate::sync::SyncBatchReport;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn heartbeat_maps_to_flat_payload() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let envelope = reminder_event(&ReminderNotification::Heartbeat(Heartbeat {
            now,
            working_set_size: 3,
            fired_count: 1,
        }))
        .unwrap();

        assert_eq!(envelope.event, "reminders.heartbeat");
        assert_eq!(envelope.payload["working_set_size"], 3);
        assert_eq!(envelope.payload["fired_count"], 1);
        assert_eq!(envelope.payload["now"], "2026-03-02T09:00:00Z");
    }

    #[test]
    fn empty_trigger_batch_is_still_an_event() {
        let envelope = reminder_event(&ReminderNotification::Triggered {
            reminders: Vec::new(),
        })
        .unwrap();
        assert_eq!(envelope.event, "reminders.triggered");
        assert_eq!(envelope.payload["reminders"], serde_json::json!([]));
    }

    #[test]
    fn tick_error_carries_retry_delay() {
        let failure = TickFailure::new(
            &EngineError::Sync("boom".to_owned()),
            &FailureOutcome::Retry {
                consecutive_failures: 2,
                next_delay: Duration::from_secs(40),
            },
        );
        let envelope = sync_event(&SyncNotification::TickError(failure)).unwrap();

        assert_eq!(envelope.event, "sync.tick_error");
        assert_eq!(envelope.payload["error"], "sync error: boom");
        assert_eq!(envelope.payload["consecutive_failures"], 2);
        assert_eq!(envelope.payload["next_retry_delay_ms"], 40_000);
    }

    #[test]
    fn batch_report_maps_counts() {
        let report = SyncBatchReport::new(Utc::now(), Vec::new());
        let envelope = sync_event(&SyncNotification::BatchCompleted(report)).unwrap();
        assert_eq!(envelope.event, "sync.batch_completed");
        assert_eq!(envelope.payload["success_count"], 0);
        assert_eq!(envelope.payload["error_count"], 0);
    }

    #[tokio::test]
    async fn panicking_engine_task_reports_fatal_error() {
        let (event_tx, mut event_rx) = broadcast::channel(4);
        let task: JoinHandle<()> = tokio::spawn(async { panic!("engine exploded") });

        watch_engine("reminders", task, event_tx).await.unwrap();

        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event, "engine.fatal_error");
        assert_eq!(event.payload["engine"], "reminders");
    }
}
