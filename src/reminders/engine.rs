//! Reminder evaluation background loop.
//!
//! Spawns a tokio task that owns a [`ReminderState`] and a single pending
//! timer. Commands from the host arrive on an mpsc queue and are applied
//! between ticks, so a tick always sees either none or all of a command.

use crate::calendar::Event;
use crate::config::ReminderConfig;
use crate::engine::{
    Clock, DelayedTask, FailureOutcome, FailureTracker, LifecycleState, RetryPolicy, TickFailure,
    TimerKind,
};
use crate::error::{EngineError, Result};
use crate::reminders::model::{Heartbeat, ReminderKey, TriggeredReminder, UpdateSummary};
use crate::reminders::state::ReminderState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Commands accepted by the reminder engine task.
#[derive(Debug)]
pub enum ReminderCommand {
    Start,
    Stop,
    UpdateEvents(Vec<Event>),
    Dismiss(ReminderKey),
    ClearFired,
    Status(oneshot::Sender<ReminderStatus>),
}

/// Notifications emitted by the reminder engine task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderNotification {
    /// Reminders that became due during one tick. May be empty.
    Triggered { reminders: Vec<TriggeredReminder> },
    /// Emitted after every successful tick.
    Heartbeat(Heartbeat),
    /// A tick failed.
    TickError(TickFailure),
    /// The engine restarted itself after too many consecutive failures.
    Restarted { timestamp: DateTime<Utc> },
}

/// Point-in-time view of the engine for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderStatus {
    pub state: LifecycleState,
    pub running: bool,
    pub working_set_size: usize,
    pub reminder_count: usize,
    pub fired_count: usize,
    pub dismissed_count: usize,
    pub consecutive_failures: u32,
    pub restarts: u32,
    /// Milliseconds until the pending timer elapses, if one is pending.
    pub next_timer_ms: Option<u64>,
}

/// Cloneable command sender for a running reminder engine.
#[derive(Debug, Clone)]
pub struct ReminderHandle {
    tx: mpsc::Sender<ReminderCommand>,
}

impl ReminderHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(ReminderCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(ReminderCommand::Stop).await
    }

    /// Replace the working set.
    pub async fn update_events(&self, events: Vec<Event>) -> Result<()> {
        self.send(ReminderCommand::UpdateEvents(events)).await
    }

    /// Permanently silence a reminder.
    pub async fn dismiss(&self, key: ReminderKey) -> Result<()> {
        self.send(ReminderCommand::Dismiss(key)).await
    }

    /// Forget transient fired state.
    pub async fn clear_fired(&self) -> Result<()> {
        self.send(ReminderCommand::ClearFired).await
    }

    /// Query engine status. Also acts as a barrier: every command sent
    /// before this one has been applied when it returns.
    pub async fn status(&self) -> Result<ReminderStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(ReminderCommand::Status(tx)).await?;
        rx.await
            .map_err(|e| EngineError::Channel(format!("reminder status dropped: {e}")))
    }

    /// Whether the engine task has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: ReminderCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::Channel("reminder engine is not running".to_owned()))
    }
}

/// Reminder evaluation engine task.
pub struct ReminderEngine {
    state: ReminderState,
    failures: FailureTracker,
    timer: DelayedTask,
    lifecycle: LifecycleState,
    running: bool,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<ReminderCommand>,
    notifications: mpsc::UnboundedSender<ReminderNotification>,
}

impl ReminderEngine {
    /// Create an engine and the handle that drives it.
    pub fn new(
        config: &ReminderConfig,
        command_capacity: usize,
        clock: Arc<dyn Clock>,
        notifications: mpsc::UnboundedSender<ReminderNotification>,
    ) -> (ReminderHandle, Self) {
        let (tx, commands) = mpsc::channel(command_capacity.max(1));
        let engine = Self {
            state: ReminderState::new(config),
            failures: FailureTracker::new(RetryPolicy::from(config)),
            timer: DelayedTask::new(),
            lifecycle: LifecycleState::Stopped,
            running: false,
            clock,
            commands,
            notifications,
        };
        (ReminderHandle { tx }, engine)
    }

    /// Start the engine task. It stays stopped until a `Start` command.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!("reminder engine task started");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        debug!("reminder command channel closed, stopping");
                        break;
                    }
                },
                kind = self.timer.elapsed() => {
                    self.timer.take();
                    self.on_timer(kind)
                }
            };

            if let Err(e) = step {
                error!(error = %e, "reminder notification channel closed, stopping");
                break;
            }
        }
        self.timer.cancel();
        self.running = false;
        self.lifecycle = LifecycleState::Stopped;
    }

    fn apply(&mut self, command: ReminderCommand) -> Result<()> {
        match command {
            ReminderCommand::Start => self.start(),
            ReminderCommand::Stop => self.stop(),
            ReminderCommand::UpdateEvents(events) => {
                let summary = self.update_events(events);
                debug!(
                    events = summary.events,
                    reminders = summary.reminders,
                    backfilled = summary.backfilled,
                    "reminder working set replaced"
                );
            }
            ReminderCommand::Dismiss(key) => {
                if self.state.dismiss(key.clone()) {
                    debug!(key = %key, "reminder dismissed");
                }
            }
            ReminderCommand::ClearFired => {
                let cleared = self.state.clear_fired();
                debug!(cleared, "fired reminders cleared");
            }
            ReminderCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
        Ok(())
    }

    fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.lifecycle = LifecycleState::RunningIdle;
        self.timer
            .schedule(TimerKind::Tick, self.failures.policy().tick_interval);
        info!(
            interval_ms = self.failures.policy().tick_interval.as_millis(),
            "reminder engine started"
        );
    }

    fn stop(&mut self) {
        let was_active = self.running || self.timer.is_pending();
        self.timer.cancel();
        self.running = false;
        self.lifecycle = LifecycleState::Stopped;
        if was_active {
            info!("reminder engine stopped");
        }
    }

    fn update_events(&mut self, events: Vec<Event>) -> UpdateSummary {
        let summary = self.state.replace_events(events, self.clock.now());
        // A data push is evidence the host is alive.
        self.failures.reset();
        summary
    }

    fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        match kind {
            TimerKind::Tick if self.running => self.tick(),
            TimerKind::Tick => Ok(()),
            TimerKind::Restart => {
                info!("reminder engine cooldown elapsed, resuming");
                self.start();
                Ok(())
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.lifecycle = LifecycleState::Ticking;
        let now = self.clock.now();

        match self.state.evaluate(now) {
            Ok(reminders) => {
                self.failures.record_success();
                if !reminders.is_empty() {
                    info!(count = reminders.len(), "reminders triggered");
                }
                self.emit(ReminderNotification::Triggered { reminders })?;
                self.emit(ReminderNotification::Heartbeat(self.state.heartbeat(now)))?;
            }
            Err(e) => self.on_tick_failure(&e)?,
        }

        if self.running {
            self.lifecycle = LifecycleState::RunningIdle;
            self.timer.schedule(TimerKind::Tick, self.failures.next_delay());
        }
        Ok(())
    }

    fn on_tick_failure(&mut self, err: &EngineError) -> Result<()> {
        let outcome = self.failures.record_failure();
        warn!(
            error = %err,
            consecutive_failures = outcome.consecutive_failures(),
            next_delay_ms = outcome.next_delay().as_millis(),
            "reminder tick failed"
        );
        self.emit(ReminderNotification::TickError(TickFailure::new(
            err, &outcome,
        )))?;

        if let FailureOutcome::Restart { cooldown, .. } = outcome {
            self.state.clear_fired();
            self.running = false;
            self.lifecycle = LifecycleState::Restarting;
            self.timer.schedule(TimerKind::Restart, cooldown);
            warn!(
                cooldown_ms = cooldown.as_millis(),
                "reminder engine restarting after repeated failures"
            );
            self.emit(ReminderNotification::Restarted {
                timestamp: self.clock.now(),
            })?;
        }
        Ok(())
    }

    fn status(&self) -> ReminderStatus {
        ReminderStatus {
            state: self.lifecycle,
            running: self.running,
            working_set_size: self.state.working_set_size(),
            reminder_count: self.state.reminder_count(),
            fired_count: self.state.fired_count(),
            dismissed_count: self.state.dismissed_count(),
            consecutive_failures: self.failures.consecutive(),
            restarts: self.failures.restarts(),
            next_timer_ms: self
                .timer
                .remaining()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    fn emit(&self, notification: ReminderNotification) -> Result<()> {
        self.notifications
            .send(notification)
            .map_err(|_| EngineError::Channel("reminder notification receiver dropped".to_owned()))
    }
}
