use std::sync::Arc;

/// Events emitted during archive updates for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A feed's update cycle has begun
    FeedStarted { feed: String },

    /// A download is waiting for its host slot
    DownloadQueued {
        /// Unique per scheduler
        download_id: usize,
        label: String,
        host: String,
    },

    /// A download is starting
    DownloadStarting {
        download_id: usize,
        label: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download finished transferring
    DownloadCompleted {
        download_id: usize,
        label: String,
        bytes_downloaded: u64,
        /// False when a validator rejected the content
        committed: bool,
    },

    /// A download failed
    DownloadFailed {
        download_id: usize,
        label: String,
        error: String,
    },

    /// Stale temporary files were removed from a media directory
    PartialFilesCleanedUp { feed: String, count: usize },

    /// A feed's update cycle finished
    FeedCompleted {
        feed: String,
        episodes: usize,
        downloaded: usize,
        failed: usize,
    },

    /// A feed's update cycle aborted
    FeedFailed { feed: String, error: String },
}

/// Receives progress events from the scheduler and the archive.
///
/// Called from concurrently running feed cycles; implementations must not
/// block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// Discards every event; used by `--quiet` and in tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
