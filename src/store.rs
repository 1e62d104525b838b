//! Event and calendar-source store contracts with in-memory implementations.
//!
//! Identity is append-only: ids are handed out in increasing order and
//! never reused after a delete.

use crate::calendar::{CalendarSource, Event, EventDraft, EventId, SourceId, SourceKind};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Persistent event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store a new event and assign it an id.
    async fn create(&self, draft: EventDraft) -> Result<Event>;

    async fn get(&self, id: EventId) -> Result<Option<Event>>;

    /// Overwrite an existing event. Fails if the id is unknown.
    async fn update(&self, event: Event) -> Result<Event>;

    /// Returns `true` when an event was removed.
    async fn delete(&self, id: EventId) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Event>>;

    /// Events starting in `[from, to)`, ordered by start time.
    async fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Events whose title contains `query`, case-insensitively.
    async fn search(&self, query: &str) -> Result<Vec<Event>>;

    /// Replace every event imported from `source_id` with `drafts`.
    ///
    /// The new events are created before the old ones are removed. If a
    /// create fails, the events created so far are deleted again and the
    /// source keeps its previous events.
    ///
    /// Returns the number of events now owned by the source.
    async fn replace_source_events(
        &self,
        source_id: SourceId,
        drafts: Vec<EventDraft>,
    ) -> Result<usize> {
        let stale: Vec<EventId> = self
            .list()
            .await?
            .into_iter()
            .filter(|event| event.source_id == Some(source_id))
            .map(|event| event.id)
            .collect();

        let mut created = Vec::with_capacity(drafts.len());
        for mut draft in drafts {
            draft.source_id = Some(source_id);
            match self.create(draft).await {
                Ok(event) => created.push(event.id),
                Err(e) => {
                    for id in created {
                        self.delete(id).await?;
                    }
                    return Err(e);
                }
            }
        }

        for id in stale {
            self.delete(id).await?;
        }
        Ok(created.len())
    }
}

/// Persistent calendar-source storage.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn create(&self, name: &str, url: &str, kind: SourceKind) -> Result<CalendarSource>;

    async fn get(&self, id: SourceId) -> Result<Option<CalendarSource>>;

    async fn update(&self, source: CalendarSource) -> Result<CalendarSource>;

    async fn delete(&self, id: SourceId) -> Result<bool>;

    async fn list(&self) -> Result<Vec<CalendarSource>>;
}

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> Table<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    table: Mutex<Table<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, draft: EventDraft) -> Result<Event> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let id = table.allocate();
        let event = draft.into_event(EventId(id));
        table.rows.insert(id, event.clone());
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.get(&id.0).cloned())
    }

    async fn update(&self, event: Event) -> Result<Event> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        match table.rows.get_mut(&event.id.0) {
            Some(existing) => {
                *existing = event.clone();
                Ok(event)
            }
            None => Err(EngineError::Store(format!("event {} not found", event.id))),
        }
    }

    async fn delete(&self, id: EventId) -> Result<bool> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.remove(&id.0).is_some())
    }

    async fn list(&self) -> Result<Vec<Event>> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.values().cloned().collect())
    }

    async fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let mut events: Vec<Event> = table
            .rows
            .values()
            .filter(|e| e.start >= from && e.start < to)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.start, e.id));
        Ok(events)
    }

    async fn search(&self, query: &str) -> Result<Vec<Event>> {
        let needle = query.to_lowercase();
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table
            .rows
            .values()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

/// In-memory [`SourceStore`].
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    table: Mutex<Table<CalendarSource>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn create(&self, name: &str, url: &str, kind: SourceKind) -> Result<CalendarSource> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let id = table.allocate();
        let source = CalendarSource::new(SourceId(id), name, url, kind);
        table.rows.insert(id, source.clone());
        Ok(source)
    }

    async fn get(&self, id: SourceId) -> Result<Option<CalendarSource>> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.get(&id.0).cloned())
    }

    async fn update(&self, source: CalendarSource) -> Result<CalendarSource> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        match table.rows.get_mut(&source.id.0) {
            Some(existing) => {
                *existing = source.clone();
                Ok(source)
            }
            None => Err(EngineError::Store(format!("source {} not found", source.id))),
        }
    }

    async fn delete(&self, id: SourceId) -> Result<bool> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.remove(&id.0).is_some())
    }

    async fn list(&self) -> Result<Vec<CalendarSource>> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Ok(table.rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn ids_are_append_only() {
        let store = MemoryEventStore::new();
        let a = store.create(EventDraft::new("a", at(9))).await.unwrap();
        assert!(store.delete(a.id).await.unwrap());
        let b = store.create(EventDraft::new("b", at(10))).await.unwrap();

        assert_eq!(a.id, EventId(1));
        assert_eq!(b.id, EventId(2));
        assert!(store.get(a.id).await.unwrap().is_none());
        assert!(!store.delete(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn update_requires_existing_event() {
        let store = MemoryEventStore::new();
        let mut event = store
            .create(EventDraft::new("standup", at(9)).with_reminders(["5 minutes before"]))
            .await
            .unwrap();
        event.title = "retro".to_owned();
        store.update(event.clone()).await.unwrap();
        assert_eq!(store.get(event.id).await.unwrap().unwrap().title, "retro");

        event.id = EventId(42);
        assert!(matches!(
            store.update(event).await,
            Err(EngineError::Store(_))
        ));
    }

    #[tokio::test]
    async fn range_is_half_open_and_sorted() {
        let store = MemoryEventStore::new();
        store.create(EventDraft::new("late", at(12))).await.unwrap();
        store.create(EventDraft::new("early", at(9))).await.unwrap();
        store.create(EventDraft::new("edge", at(14))).await.unwrap();

        let events = store.range(at(9), at(14)).await.unwrap();
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let store = MemoryEventStore::new();
        store
            .create(EventDraft::new("Dentist appointment", at(9)))
            .await
            .unwrap();
        store.create(EventDraft::new("Lunch", at(12))).await.unwrap();

        let found = store.search("DENT").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Dentist appointment");
    }

    #[tokio::test]
    async fn replace_source_events_leaves_other_events_alone() {
        let store = MemoryEventStore::new();
        store.create(EventDraft::new("manual", at(9))).await.unwrap();
        let source = SourceId(3);

        let first = vec![
            EventDraft::new("feed a", at(10)),
            EventDraft::new("feed b", at(11)),
        ];
        assert_eq!(store.replace_source_events(source, first).await.unwrap(), 2);

        let second = vec![EventDraft::new("feed c", at(10) + TimeDelta::days(1))];
        assert_eq!(store.replace_source_events(source, second).await.unwrap(), 1);

        let titles: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["manual", "feed c"]);
    }

    /// Delegates to a memory store but refuses creates once `budget` runs out.
    struct FullStore {
        inner: MemoryEventStore,
        budget: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EventStore for FullStore {
        async fn create(&self, draft: EventDraft) -> Result<Event> {
            use std::sync::atomic::Ordering;
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(EngineError::Store("disk full".to_owned()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.create(draft).await
        }

        async fn get(&self, id: EventId) -> Result<Option<Event>> {
            self.inner.get(id).await
        }

        async fn update(&self, event: Event) -> Result<Event> {
            self.inner.update(event).await
        }

        async fn delete(&self, id: EventId) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn list(&self) -> Result<Vec<Event>> {
            self.inner.list().await
        }

        async fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
            self.inner.range(from, to).await
        }

        async fn search(&self, query: &str) -> Result<Vec<Event>> {
            self.inner.search(query).await
        }
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_source_events() {
        let store = FullStore {
            inner: MemoryEventStore::new(),
            budget: std::sync::atomic::AtomicUsize::new(3),
        };
        let source = SourceId(5);
        let first = vec![
            EventDraft::new("feed a", at(10)),
            EventDraft::new("feed b", at(11)),
        ];
        assert_eq!(store.replace_source_events(source, first).await.unwrap(), 2);

        let second = vec![
            EventDraft::new("feed c", at(12)),
            EventDraft::new("feed d", at(13)),
        ];
        let err = store.replace_source_events(source, second).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));

        let titles: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["feed a", "feed b"]);
    }

    #[tokio::test]
    async fn source_store_crud() {
        let store = MemorySourceStore::new();
        let mut source = store
            .create("Holidays", "webcal://example.com/h.ics", SourceKind::Webcal)
            .await
            .unwrap();
        source.name = "Public holidays".to_owned();
        store.update(source.clone()).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec![source.clone()]);
        assert!(store.delete(source.id).await.unwrap());
        assert!(store.get(source.id).await.unwrap().is_none());
    }
}
