//! Per-source and per-batch sync results.

use crate::calendar::{CalendarSource, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of syncing one calendar source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSyncResult {
    pub source_id: SourceId,
    pub source_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events_count: usize,
}

impl SourceSyncResult {
    pub fn succeeded(source: &CalendarSource, events_count: usize) -> Self {
        Self {
            source_id: source.id,
            source_name: source.name.clone(),
            success: true,
            message: Some(format!("synced {events_count} events")),
            error: None,
            events_count,
        }
    }

    pub fn failed(source: &CalendarSource, error: impl Into<String>) -> Self {
        Self {
            source_id: source.id,
            source_name: source.name.clone(),
            success: false,
            message: None,
            error: Some(error.into()),
            events_count: 0,
        }
    }
}

/// Summary emitted once every source in a batch has been attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatchReport {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<SourceSyncResult>,
    pub success_count: usize,
    pub error_count: usize,
}

impl SyncBatchReport {
    pub fn new(timestamp: DateTime<Utc>, results: Vec<SourceSyncResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let error_count = results.len() - success_count;
        Self {
            timestamp,
            results,
            success_count,
            error_count,
        }
    }
}
