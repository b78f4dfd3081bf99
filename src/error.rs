use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when deriving a content address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Cannot derive a content address for {what}: identifier is empty")]
    EmptyIdentifier { what: String },
}

/// Errors that can occur during a scheduled download
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid download URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Download URL {url} has no host")]
    MissingHost { url: String },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    CommitFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to discard rejected download {path}: {source}")]
    DiscardFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when allocating, listing or reading snapshots
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to create snapshot directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read snapshot directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read snapshot {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when parsing or reconciling feed snapshots
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("No readable snapshot is available")]
    NoSnapshots,

    #[error("Episode '{title}' cannot be addressed: {source}")]
    Unaddressable {
        title: String,
        #[source]
        source: AddressError,
    },

    #[error("Episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },

    #[error("Failed to serialize RSS feed: {0}")]
    SerializeFailed(#[source] rss::Error),

    #[error("Failed to sanitize description: {0}")]
    SanitizeFailed(String),
}

/// Errors that can occur when scanning a media directory
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when writing generated output
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
}

/// Errors that abort a single feed's update cycle
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Errors that abort an archive-level command
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Unable to acquire lock {path}; is another instance running?")]
    LockUnavailable { path: PathBuf },

    #[error("Failed to lock {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive is not initialized: cannot read base URL from {path}: {source}")]
    MissingBaseUrl {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive at {path} is already initialized")]
    AlreadyInitialized { path: PathBuf },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Feed {name} already exists")]
    DuplicateFeed { name: String },

    #[error("The name \"{name}\" is reserved")]
    ReservedName { name: String },

    #[error("The name \"{name}\" is not a safe file name")]
    InvalidFeedName { name: String },

    #[error("Feed {name} is missing its tracked URL at {path}: {source}")]
    MissingFeedUrl {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}
