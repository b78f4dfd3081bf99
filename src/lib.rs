pub mod address;
pub mod archive;
pub mod download;
pub mod error;
pub mod feed;
pub mod html;
pub mod http;
pub mod media;
pub mod progress;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use address::{ContentAddress, episode_set_signature};
pub use archive::{Archive, FeedSummary, FeedUpdate, TrackedFeed};
pub use download::{DownloadScheduler, DownloadValidator, SchedulerOptions};
pub use error::{
    AddressError, ArchiveError, CacheError, DownloadError, FeedError, PublishError, SnapshotError,
    SyncError,
};
pub use feed::{Channel, Episode, ParsedSnapshot, channel_to_rss, reconcile};
pub use http::{ClientOptions, HttpClient, HttpResponse, ReqwestClient};
pub use media::{FeedLayout, MediaKind, MediaReference};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use snapshot::SnapshotStore;
pub use sync::{SnapshotOutcome, SyncMode, SyncResult, load_channel, sync_feed};
