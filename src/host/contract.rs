//! Versioned host command/event envelopes.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands a host can send to the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "host.shutdown")]
    HostShutdown,
    #[serde(rename = "reminders.start")]
    RemindersStart,
    #[serde(rename = "reminders.stop")]
    RemindersStop,
    #[serde(rename = "reminders.update_events")]
    RemindersUpdateEvents,
    #[serde(rename = "reminders.dismiss")]
    RemindersDismiss,
    #[serde(rename = "reminders.clear_fired")]
    RemindersClearFired,
    #[serde(rename = "reminders.status")]
    RemindersStatus,
    #[serde(rename = "sync.start")]
    SyncStart,
    #[serde(rename = "sync.stop")]
    SyncStop,
    #[serde(rename = "sync.update_sources")]
    SyncUpdateSources,
    #[serde(rename = "sync.trigger_now")]
    SyncTriggerNow,
    #[serde(rename = "sync.status")]
    SyncStatus,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::HostShutdown => "host.shutdown",
            Self::RemindersStart => "reminders.start",
            Self::RemindersStop => "reminders.stop",
            Self::RemindersUpdateEvents => "reminders.update_events",
            Self::RemindersDismiss => "reminders.dismiss",
            Self::RemindersClearFired => "reminders.clear_fired",
            Self::RemindersStatus => "reminders.status",
            Self::SyncStart => "sync.start",
            Self::SyncStop => "sync.stop",
            Self::SyncUpdateSources => "sync.update_sources",
            Self::SyncTriggerNow => "sync.trigger_now",
            Self::SyncStatus => "sync.status",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "host.version" => Some(Self::HostVersion),
            "host.shutdown" => Some(Self::HostShutdown),
            "reminders.start" => Some(Self::RemindersStart),
            "reminders.stop" => Some(Self::RemindersStop),
            "reminders.update_events" => Some(Self::RemindersUpdateEvents),
            "reminders.dismiss" => Some(Self::RemindersDismiss),
            "reminders.clear_fired" => Some(Self::RemindersClearFired),
            "reminders.status" => Some(Self::RemindersStatus),
            "sync.start" => Some(Self::SyncStart),
            "sync.stop" => Some(Self::SyncStop),
            "sync.update_sources" => Some(Self::SyncUpdateSources),
            "sync.trigger_now" => Some(Self::SyncTriggerNow),
            "sync.status" => Some(Self::SyncStatus),
            _ => None,
        }
    }
}

/// Events the engines publish to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    RemindersTriggered,
    RemindersHeartbeat,
    RemindersTickError,
    RemindersRestarted,
    SyncBatchCompleted,
    SyncTickError,
    SyncRestarted,
    /// An engine's channel broke; the host should recreate the engine.
    EngineFatalError,
}

impl EventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemindersTriggered => "reminders.triggered",
            Self::RemindersHeartbeat => "reminders.heartbeat",
            Self::RemindersTickError => "reminders.tick_error",
            Self::RemindersRestarted => "reminders.restarted",
            Self::SyncBatchCompleted => "sync.batch_completed",
            Self::SyncTickError => "sync.tick_error",
            Self::SyncRestarted => "sync.restarted",
            Self::EngineFatalError => "engine.fatal_error",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to exactly one [`CommandEnvelope`], matched by `request_id`.
///
/// `payload` is `null` on failure and `error` is omitted on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> engine host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Reject envelopes from another contract version or without a request id.
    pub fn validate(&self) -> Result<(), ContractError> {
        match (self.v, self.request_id.trim()) {
            (EVENT_VERSION, "") => Err(ContractError::BlankRequestId),
            (EVENT_VERSION, _) => Ok(()),
            (got, _) => Err(ContractError::UnsupportedVersion {
                got,
                expected: EVENT_VERSION,
            }),
        }
    }
}

/// A versioned event envelope from engine host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build an envelope with a fresh random event id.
    #[must_use]
    pub fn fresh(event: EventName, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event.as_str(), payload)
    }
}

/// Why a command envelope was rejected before routing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("unsupported contract version {got}; expected {expected}")]
    UnsupportedVersion { got: u32, expected: u32 },
    #[error("request_id cannot be empty")]
    BlankRequestId,
}

impl From<ContractError> for crate::EngineError {
    fn from(e: ContractError) -> Self {
        Self::Contract(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const ALL_COMMANDS: [CommandName; 14] = [
        CommandName::HostPing,
        CommandName::HostVersion,
        CommandName::HostShutdown,
        CommandName::RemindersStart,
        CommandName::RemindersStop,
        CommandName::RemindersUpdateEvents,
        CommandName::RemindersDismiss,
        CommandName::RemindersClearFired,
        CommandName::RemindersStatus,
        CommandName::SyncStart,
        CommandName::SyncStop,
        CommandName::SyncUpdateSources,
        CommandName::SyncTriggerNow,
        CommandName::SyncStatus,
    ];

    #[test]
    fn serde_names_match_as_str() {
        for command in ALL_COMMANDS {
            let json = serde_json::to_value(command).unwrap();
            assert_eq!(json, command.as_str());
            assert_eq!(CommandName::parse(command.as_str()), Some(command));
        }
        assert_eq!(CommandName::parse("runtime.start"), None);
    }

    #[test]
    fn envelope_without_payload_defaults_to_null() {
        let envelope: CommandEnvelope = serde_json::from_str(
            r#"{"v":1,"request_id":"r1","command":"reminders.clear_fired"}"#,
        )
        .unwrap();
        assert_eq!(envelope.command, CommandName::RemindersClearFired);
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn validate_rejects_wrong_version_and_blank_id() {
        let mut envelope = CommandEnvelope::new("r1", CommandName::HostPing, serde_json::json!({}));
        envelope.v = 2;
        assert_eq!(
            envelope.validate(),
            Err(ContractError::UnsupportedVersion {
                got: 2,
                expected: EVENT_VERSION
            })
        );

        let envelope = CommandEnvelope::new("  ", CommandName::HostPing, serde_json::json!({}));
        assert_eq!(envelope.validate(), Err(ContractError::BlankRequestId));
    }

    #[test]
    fn fresh_events_get_unique_ids() {
        let a = EventEnvelope::fresh(EventName::SyncRestarted, serde_json::json!({}));
        let b = EventEnvelope::fresh(EventName::SyncRestarted, serde_json::json!({}));
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.event, "sync.restarted");
        assert_eq!(a.v, EVENT_VERSION);
    }
}
