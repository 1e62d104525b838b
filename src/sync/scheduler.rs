//! Calendar sync scheduler background loop.
//!
//! Same tick/backoff/restart skeleton as the reminder engine, but a tick
//! awaits the external syncer for each source in turn. Commands that arrive
//! during a batch wait in the queue and are applied once it finishes.

use crate::calendar::CalendarSource;
use crate::config::SyncConfig;
use crate::engine::{
    Clock, DelayedTask, FailureOutcome, FailureTracker, LifecycleState, RetryPolicy, TickFailure,
    TimerKind,
};
use crate::error::{EngineError, Result};
use crate::sync::model::{SourceSyncResult, SyncBatchReport};
use crate::sync::source::SourceSyncer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Commands accepted by the sync scheduler task.
#[derive(Debug)]
pub enum SyncCommand {
    Start,
    Stop,
    UpdateSources(Vec<CalendarSource>),
    /// Run one batch now. A successful batch leaves the scheduled timer
    /// alone; a failed one on a running scheduler reschedules it to the
    /// backoff delay.
    TriggerNow,
    Status(oneshot::Sender<SyncStatus>),
}

/// Notifications emitted by the sync scheduler task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncNotification {
    BatchCompleted(SyncBatchReport),
    TickError(TickFailure),
    Restarted { timestamp: DateTime<Utc> },
}

/// Point-in-time view of the scheduler for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: LifecycleState,
    pub running: bool,
    pub source_count: usize,
    pub consecutive_failures: u32,
    pub restarts: u32,
    pub next_timer_ms: Option<u64>,
    pub last_batch: Option<SyncBatchReport>,
}

/// Cloneable command sender for a running sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(SyncCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SyncCommand::Stop).await
    }

    pub async fn update_sources(&self, sources: Vec<CalendarSource>) -> Result<()> {
        self.send(SyncCommand::UpdateSources(sources)).await
    }

    pub async fn trigger_now(&self) -> Result<()> {
        self.send(SyncCommand::TriggerNow).await
    }

    /// Query scheduler status once every earlier command has been applied.
    pub async fn status(&self) -> Result<SyncStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::Status(tx)).await?;
        rx.await
            .map_err(|e| EngineError::Channel(format!("sync status dropped: {e}")))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: SyncCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::Channel("sync scheduler is not running".to_owned()))
    }
}

/// Calendar sync scheduler task.
pub struct SyncScheduler {
    sources: Vec<CalendarSource>,
    syncer: Arc<dyn SourceSyncer>,
    failures: FailureTracker,
    timer: DelayedTask,
    lifecycle: LifecycleState,
    running: bool,
    last_batch: Option<SyncBatchReport>,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<SyncCommand>,
    notifications: mpsc::UnboundedSender<SyncNotification>,
}

impl SyncScheduler {
    pub fn new(
        config: &SyncConfig,
        command_capacity: usize,
        syncer: Arc<dyn SourceSyncer>,
        clock: Arc<dyn Clock>,
        notifications: mpsc::UnboundedSender<SyncNotification>,
    ) -> (SyncHandle, Self) {
        let (tx, commands) = mpsc::channel(command_capacity.max(1));
        let scheduler = Self {
            sources: Vec::new(),
            syncer,
            failures: FailureTracker::new(RetryPolicy::from(config)),
            timer: DelayedTask::new(),
            lifecycle: LifecycleState::Stopped,
            running: false,
            last_batch: None,
            clock,
            commands,
            notifications,
        };
        (SyncHandle { tx }, scheduler)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!("sync scheduler task started");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => {
                        debug!("sync command channel closed, stopping");
                        break;
                    }
                },
                kind = self.timer.elapsed() => {
                    self.timer.take();
                    self.on_timer(kind).await
                }
            };

            if let Err(e) = step {
                error!(error = %e, "sync notification channel closed, stopping");
                break;
            }
        }
        self.timer.cancel();
        self.running = false;
        self.lifecycle = LifecycleState::Stopped;
    }

    async fn apply(&mut self, command: SyncCommand) -> Result<()> {
        match command {
            SyncCommand::Start => self.start(),
            SyncCommand::Stop => self.stop(),
            SyncCommand::UpdateSources(sources) => {
                debug!(count = sources.len(), "sync sources replaced");
                self.sources = sources;
            }
            SyncCommand::TriggerNow => {
                info!("immediate sync requested");
                return self.trigger_now().await;
            }
            SyncCommand::Status(reply) => {
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
            interval_secs = self.failures.policy().tick_interval.as_secs(),
            "sync scheduler started"
        );
    }

    fn stop(&mut self) {
        let was_active = self.running || self.timer.is_pending();
        self.timer.cancel();
        self.running = false;
        self.lifecycle = LifecycleState::Stopped;
        if was_active {
            info!("sync scheduler stopped");
        }
    }

    async fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        match kind {
            TimerKind::Tick if self.running => self.tick().await,
            TimerKind::Tick => Ok(()),
            TimerKind::Restart => {
                info!("sync scheduler cooldown elapsed, resuming");
                self.start();
                Ok(())
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        self.lifecycle = LifecycleState::Ticking;
        self.run_batch().await?;

        if self.running {
            self.lifecycle = LifecycleState::RunningIdle;
            self.timer.schedule(TimerKind::Tick, self.failures.next_delay());
        }
        Ok(())
    }

    async fn trigger_now(&mut self) -> Result<()> {
        let previous = self.lifecycle;
        self.lifecycle = LifecycleState::Ticking;
        self.run_batch().await?;
        if self.lifecycle == LifecycleState::Ticking {
            self.lifecycle = previous;
        }
        Ok(())
    }

    async fn run_batch(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            debug!("no sync sources, skipping batch");
            return Ok(());
        }

        let timestamp = self.clock.now();
        let syncer = Arc::clone(&self.syncer);
        let sources = self.sources.clone();
        let batch = tokio::spawn(sync_all(syncer, sources, timestamp));

        let outcome = match batch.await {
            Ok(outcome) => outcome,
            Err(e) => Err(EngineError::Sync(format!("sync batch aborted: {e}"))),
        };

        match outcome {
            Ok(report) => {
                self.failures.record_success();
                info!(
                    succeeded = report.success_count,
                    failed = report.error_count,
                    "sync batch completed"
                );
                self.last_batch = Some(report.clone());
                self.emit(SyncNotification::BatchCompleted(report))
            }
            Err(e) => self.on_batch_failure(&e),
        }
    }

    fn on_batch_failure(&mut self, err: &EngineError) -> Result<()> {
        if !self.running {
            return self.on_manual_failure(err);
        }

        let outcome = self.failures.record_failure();
        warn!(
            error = %err,
            consecutive_failures = outcome.consecutive_failures(),
            next_delay_ms = outcome.next_delay().as_millis(),
            "sync batch failed"
        );

        match outcome {
            FailureOutcome::Retry { next_delay, .. } => {
                self.timer.schedule(TimerKind::Tick, next_delay);
                self.emit(SyncNotification::TickError(TickFailure::new(err, &outcome)))
            }
            FailureOutcome::Restart { cooldown, .. } => {
                self.emit(SyncNotification::TickError(TickFailure::new(err, &outcome)))?;
                self.running = false;
                self.lifecycle = LifecycleState::Restarting;
                self.timer.schedule(TimerKind::Restart, cooldown);
                warn!(
                    cooldown_ms = cooldown.as_millis(),
                    "sync scheduler restarting after repeated failures"
                );
                self.emit(SyncNotification::Restarted {
                    timestamp: self.clock.now(),
                })
            }
        }
    }

    /// A `trigger_now` batch failed while no tick loop was running.
    ///
    /// The streak is left alone so a stopped scheduler never arms a restart;
    /// the reported delay is whatever deadline is already pending.
    fn on_manual_failure(&mut self, err: &EngineError) -> Result<()> {
        let pending = self.timer.remaining().unwrap_or_default();
        warn!(
            error = %err,
            state = %self.lifecycle,
            "manual sync batch failed while not running"
        );
        self.emit(SyncNotification::TickError(TickFailure::with_delay(
            err,
            self.failures.consecutive(),
            pending,
        )))
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.lifecycle,
            running: self.running,
            source_count: self.sources.len(),
            consecutive_failures: self.failures.consecutive(),
            restarts: self.failures.restarts(),
            next_timer_ms: self
                .timer
                .remaining()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            last_batch: self.last_batch.clone(),
        }
    }

    fn emit(&self, notification: SyncNotification) -> Result<()> {
        self.notifications
            .send(notification)
            .map_err(|_| EngineError::Channel("sync notification receiver dropped".to_owned()))
    }
}

/// Sync every source in order. Per-source errors land in the report; only
/// a `prepare_batch` failure fails the batch.
async fn sync_all(
    syncer: Arc<dyn SourceSyncer>,
    sources: Vec<CalendarSource>,
    timestamp: DateTime<Utc>,
) -> Result<SyncBatchReport> {
    syncer.prepare_batch(&sources).await?;

    let mut results = Vec::with_capacity(sources.len());
    for source in &sources {
        let result = match syncer.sync_source(source).await {
            Ok(count) => SourceSyncResult::succeeded(source, count),
            Err(e) => {
                warn!(source = %source.name, error = %e, "source sync failed");
                SourceSyncResult::failed(source, e.to_string())
            }
        };
        results.push(result);
    }
    Ok(SyncBatchReport::new(timestamp, results))
}
