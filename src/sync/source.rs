//! The "sync one source" seam the scheduler drives.

use crate::calendar::CalendarSource;
use crate::error::Result;
use async_trait::async_trait;

/// Synchronizes a single external calendar source.
///
/// Implementations are called sequentially, one source at a time, from the
/// scheduler task.
#[async_trait]
pub trait SourceSyncer: Send + Sync + 'static {
    /// Fetch and import one source, returning the number of events imported.
    ///
    /// An error here is recorded against this source only; the rest of the
    /// batch still runs.
    async fn sync_source(&self, source: &CalendarSource) -> Result<usize>;

    /// Called once before a non-empty batch. An error fails the whole batch
    /// and counts towards the scheduler's backoff.
    async fn prepare_batch(&self, _sources: &[CalendarSource]) -> Result<()> {
        Ok(())
    }
}
