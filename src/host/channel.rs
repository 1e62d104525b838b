//! Host command channel and router.

use crate::calendar::{CalendarSource, Event};
use crate::error::{EngineError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::engines::{EngineHandler, fatal_error_event};
use crate::reminders::ReminderKey;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, oneshot};

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Dispatch one command and wait for its response.
    ///
    /// Routing failures come back as `ok: false` responses; only a broken
    /// channel or an invalid envelope is an `Err`.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            EngineError::Contract(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                EngineError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| EngineError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: EngineHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: EngineHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, handler)
}

/// Create a command channel using an existing event broadcast sender.
///
/// Engine notifications published on `event_tx` reach the host through the
/// same stream as router-emitted events.
#[must_use]
pub fn command_channel_with_events<H: EngineHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler,
        },
    )
}

impl<H: EngineHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.dispatch(&request.envelope).await;
            let _ = request.response_tx.send(response);
        }
        tracing::debug!("host command channel closed, stopping router");
    }

    /// Route a command and turn any failure into an error response.
    pub async fn dispatch(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        match self.route(envelope).await {
            Ok(response) => response,
            Err(e) => {
                if let EngineError::Channel(message) = &e {
                    let engine = engine_of(envelope.command);
                    tracing::error!(engine, error = %message, "engine channel broken");
                    self.emit(fatal_error_event(engine, message));
                } else {
                    tracing::warn!(
                        command = envelope.command.as_str(),
                        error = %e,
                        "host command failed"
                    );
                }
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    /// Route a command envelope to the engine it targets.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let request_id = envelope.request_id.clone();
        let command = envelope.command;
        let payload = match command {
            CommandName::HostPing => serde_json::json!({"pong": true}),
            CommandName::HostVersion => serde_json::json!({
                "contract_version": crate::host::contract::EVENT_VERSION,
                "channel": "calminder_host_v1",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            CommandName::HostShutdown => serde_json::json!({"accepted": true}),
            CommandName::RemindersStart => {
                self.handler.reminders_start().await?;
                accepted()
            }
            CommandName::RemindersStop => {
                self.handler.reminders_stop().await?;
                accepted()
            }
            CommandName::RemindersUpdateEvents => {
                let events: Vec<Event> = parse_field(&envelope.payload, "events", command)?;
                let count = events.len();
                self.handler.reminders_update_events(events).await?;
                serde_json::json!({"accepted": true, "count": count})
            }
            CommandName::RemindersDismiss => {
                let key: ReminderKey = parse_field(&envelope.payload, "key", command)?;
                self.handler.reminders_dismiss(key.clone()).await?;
                serde_json::json!({"accepted": true, "key": key})
            }
            CommandName::RemindersClearFired => {
                self.handler.reminders_clear_fired().await?;
                accepted()
            }
            CommandName::RemindersStatus => encode(&self.handler.reminders_status().await?)?,
            CommandName::SyncStart => {
                self.handler.sync_start().await?;
                accepted()
            }
            CommandName::SyncStop => {
                self.handler.sync_stop().await?;
                accepted()
            }
            CommandName::SyncUpdateSources => {
                let sources: Vec<CalendarSource> =
                    parse_field(&envelope.payload, "sources", command)?;
                let count = sources.len();
                self.handler.sync_update_sources(sources).await?;
                serde_json::json!({"accepted": true, "count": count})
            }
            CommandName::SyncTriggerNow => {
                self.handler.sync_trigger_now().await?;
                accepted()
            }
            CommandName::SyncStatus => encode(&self.handler.sync_status().await?)?,
        };
        Ok(ResponseEnvelope::ok(request_id, payload))
    }

    fn emit(&self, envelope: EventEnvelope) {
        let _ = self.event_tx.send(envelope);
    }
}

fn accepted() -> serde_json::Value {
    serde_json::json!({"accepted": true})
}

fn engine_of(command: CommandName) -> &'static str {
    let name = command.as_str();
    if name.starts_with("reminders.") {
        "reminders"
    } else if name.starts_with("sync.") {
        "sync"
    } else {
        "host"
    }
}

fn parse_field<T: DeserializeOwned>(
    payload: &serde_json::Value,
    field: &str,
    command: CommandName,
) -> Result<T> {
    let Some(raw) = payload.get(field) else {
        return Err(EngineError::Contract(format!(
            "{} requires payload.{field}",
            command.as_str()
        )));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        EngineError::Contract(format!(
            "{} has malformed payload.{field}: {e}",
            command.as_str()
        ))
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::Contract(format!("failed to encode response: {e}")))
}
