//! Calendar records shared by both engines and the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable integer identity of an event. Assigned once by the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable integer identity of an external calendar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calendar event as the engines see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(default)]
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Free-text reminder labels such as `"30 minutes before"`.
    #[serde(default)]
    pub reminders: Vec<String>,
    /// Source this event was imported from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
}

/// Fields of an event before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start,
            end: None,
            reminders: Vec::new(),
            source_id: None,
        }
    }

    /// Attach reminder labels.
    pub fn with_reminders<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reminders = labels.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            title: self.title,
            start: self.start,
            end: self.end,
            reminders: self.reminders,
            source_id: self.source_id,
        }
    }
}

/// Kind of external calendar feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Plain `https://` iCalendar feed.
    Ical,
    /// `webcal://` subscription, fetched over https.
    Webcal,
    /// Google calendar feed requiring credentials.
    Google,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ical => "ical",
            Self::Webcal => "webcal",
            Self::Google => "google",
        }
    }
}

/// An external calendar the sync scheduler re-fetches periodically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    /// Whether the credential provider holds write-back credentials for
    /// this source.
    #[serde(default)]
    pub has_credentials: bool,
}

impl CalendarSource {
    pub fn new(
        id: SourceId,
        name: impl Into<String>,
        url: impl Into<String>,
        kind: SourceKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            kind,
            has_credentials: false,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn event_deserializes_with_defaults() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": 7,
            "start": "2026-03-01T09:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.id, EventId(7));
        assert!(event.title.is_empty());
        assert!(event.reminders.is_empty());
        assert!(event.source_id.is_none());
    }

    #[test]
    fn source_kind_uses_snake_case() {
        let json = serde_json::to_value(SourceKind::Webcal).unwrap();
        assert_eq!(json, "webcal");
        assert_eq!(SourceKind::Google.as_str(), "google");
    }
}
