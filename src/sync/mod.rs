//! Calendar sync scheduler.
//!
//! Periodically re-fetches every configured calendar source through a
//! [`SourceSyncer`] and reports per-source outcomes in one batch
//! notification. Shares the retry/backoff/restart skeleton in
//! [`crate::engine`] with the reminder engine.

pub mod feed;
pub mod model;
pub mod scheduler;
pub mod source;

pub use feed::{
    CredentialProvider, FeedFetcher, FeedParser, FeedSourceSyncer, HttpFeedFetcher,
    JsonFeedParser, normalize_feed_url,
};
pub use model::{SourceSyncResult, SyncBatchReport};
pub use scheduler::{SyncCommand, SyncHandle, SyncNotification, SyncScheduler, SyncStatus};
pub use source::SourceSyncer;
