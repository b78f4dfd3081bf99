// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The archive root: configuration, locking and the set of tracked feeds.
//!
//! ```text
//! <root>/config/base.url          public URL the archive is served under
//! <root>/config/archive.lock      held while a command runs
//! <root>/index.html               aggregate index
//! <root>/<feed>/...               one directory per feed, see FeedLayout
//! ```

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::download::DownloadScheduler;
use crate::error::{ArchiveError, SyncError};
use crate::html::{FeedView, render_archive_index, render_feed_index};
use crate::http::HttpClient;
use crate::media::FeedLayout;
use crate::progress::ProgressEvent;
use crate::sync::{SyncMode, SyncResult, load_channel, sync_feed, write_atomically};

const CONFIG_DIR: &str = "config";
const BASE_URL_FILE: &str = "base.url";
const LOCK_FILE: &str = "archive.lock";
const INDEX_HTML: &str = "index.html";

/// A feed tracked by the archive
#[derive(Debug, Clone)]
pub struct TrackedFeed {
    pub name: String,
    /// Remote RSS URL
    pub url: String,
    pub layout: FeedLayout,
}

/// Outcome of one feed's cycle within [`Archive::update_all`]
#[derive(Debug)]
pub struct FeedUpdate {
    pub name: String,
    pub result: Result<SyncResult, SyncError>,
}

/// What `list` shows for a feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedSummary {
    pub name: String,
    pub tracked_url: String,
    pub local_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Exclusive hold on an archive.
///
/// An OS advisory lock on `config/archive.lock`, owned by the open file. The
/// lock goes away with the file handle, so a crashed process never leaves
/// the archive locked; the file itself stays behind and only records the pid
/// of the last holder.
#[derive(Debug)]
pub struct ArchiveLock {
    path: PathBuf,
    _file: File,
}

impl ArchiveLock {
    fn acquire(root: &Path) -> Result<Self, ArchiveError> {
        let config_dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).map_err(|source| ArchiveError::Io {
            path: config_dir.clone(),
            source,
        })?;

        let path = config_dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(ArchiveError::LockFailed { path, source }),
        };

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(ArchiveError::LockUnavailable { path }),
            Err(TryLockError::Error(source)) => {
                return Err(ArchiveError::LockFailed { path, source });
            }
        }

        // Only the holder may rewrite the pid
        let written = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()));
        if let Err(source) = written {
            return Err(ArchiveError::LockFailed { path, source });
        }

        debug!(path = %path.display(), "Acquired archive lock");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An opened, locked archive
#[derive(Debug)]
pub struct Archive {
    root: PathBuf,
    base_url: String,
    lock: ArchiveLock,
}

impl Archive {
    /// Initialize a new archive served under `base_url`.
    ///
    /// Fails if the archive already has a base URL.
    pub fn create(root: impl Into<PathBuf>, base_url: &str) -> Result<Self, ArchiveError> {
        validate_http_url(base_url)?;
        let root = root.into();
        let lock = ArchiveLock::acquire(&root)?;

        let base_url_path = root.join(CONFIG_DIR).join(BASE_URL_FILE);
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&base_url_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ArchiveError::AlreadyInitialized { path: root });
            }
            Err(source) => {
                return Err(ArchiveError::Io {
                    path: base_url_path,
                    source,
                });
            }
        };
        file.write_all(base_url.as_bytes())
            .map_err(|source| ArchiveError::Io {
                path: base_url_path.clone(),
                source,
            })?;

        info!(root = %root.display(), base_url = %base_url, "Initialized archive");
        Ok(Self {
            root,
            base_url,
            lock,
        })
    }

    /// Open an existing archive
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        let lock = ArchiveLock::acquire(&root)?;

        let base_url_path = root.join(CONFIG_DIR).join(BASE_URL_FILE);
        let base_url = fs::read_to_string(&base_url_path)
            .map_err(|source| ArchiveError::MissingBaseUrl {
                path: base_url_path,
                source,
            })?
            .trim()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            root,
            base_url,
            lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    pub fn feed_layout(&self, name: &str) -> FeedLayout {
        FeedLayout::new(self.root.join(name), format!("{}/{name}", self.base_url))
    }

    /// Start tracking a remote feed under `name`
    pub fn new_feed(&self, name: &str, url: &str) -> Result<TrackedFeed, ArchiveError> {
        validate_feed_name(name)?;
        validate_http_url(url)?;

        let layout = self.feed_layout(name);
        if layout.root().exists() {
            return Err(ArchiveError::DuplicateFeed {
                name: name.to_string(),
            });
        }

        let config_dir = layout.config_dir();
        fs::create_dir_all(&config_dir).map_err(|source| ArchiveError::Io {
            path: config_dir,
            source,
        })?;
        let url_path = layout.feed_url_file();
        fs::write(&url_path, url.trim()).map_err(|source| ArchiveError::Io {
            path: url_path,
            source,
        })?;

        info!(feed = %name, url = %url, "Added feed");
        Ok(TrackedFeed {
            name: name.to_string(),
            url: url.trim().to_string(),
            layout,
        })
    }

    /// All tracked feeds, sorted by name
    pub fn feeds(&self) -> Result<Vec<TrackedFeed>, ArchiveError> {
        let io_error = |source: std::io::Error| ArchiveError::Io {
            path: self.root.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if !entry.file_type().map_err(io_error)?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping directory with non UTF-8 name");
                continue;
            };
            if name == CONFIG_DIR || name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let layout = self.feed_layout(&name);
                let url_path = layout.feed_url_file();
                let url = fs::read_to_string(&url_path)
                    .map_err(|source| ArchiveError::MissingFeedUrl {
                        name: name.clone(),
                        path: url_path,
                        source,
                    })?
                    .trim()
                    .to_string();
                Ok(TrackedFeed { name, url, layout })
            })
            .collect()
    }

    /// Run one cycle for every feed concurrently.
    ///
    /// A failing feed is logged and reported; it never stops the others.
    pub async fn update_all<C: HttpClient>(
        &self,
        scheduler: &DownloadScheduler<C>,
        mode: SyncMode,
    ) -> Result<Vec<FeedUpdate>, ArchiveError> {
        let feeds = self.feeds()?;
        let reporter = scheduler.reporter();

        let updates = feeds.iter().map(|feed| async move {
            reporter.report(ProgressEvent::FeedStarted {
                feed: feed.name.clone(),
            });
            let result = sync_feed(feed, scheduler, mode).await;
            match &result {
                Ok(outcome) => reporter.report(ProgressEvent::FeedCompleted {
                    feed: feed.name.clone(),
                    episodes: outcome.episodes,
                    downloaded: outcome.downloaded,
                    failed: outcome.failed,
                }),
                Err(e) => {
                    error!(feed = %feed.name, "Error updating {}: {e}", feed.name);
                    reporter.report(ProgressEvent::FeedFailed {
                        feed: feed.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
            FeedUpdate {
                name: feed.name.clone(),
                result,
            }
        });

        Ok(join_all(updates).await)
    }

    /// Regenerate the archive index and every feed's index.
    ///
    /// Feeds that cannot be reconciled are logged and left out; returns how
    /// many were left out.
    pub async fn update_html(&self) -> Result<usize, ArchiveError> {
        let mut views = Vec::new();
        let mut skipped = 0;

        for feed in self.feeds()? {
            match load_channel(&feed.layout).await {
                Ok(channel) => views.push((
                    feed.layout.index_html(),
                    FeedView::new(&feed.name, &feed.layout, &channel),
                )),
                Err(e) => {
                    warn!(feed = %feed.name, "Cannot render index for {}: {e}", feed.name);
                    skipped += 1;
                }
            }
        }

        for (path, view) in &views {
            let html = render_feed_index(&self.base_url, view);
            write_atomically(path, html.as_bytes()).await?;
        }

        let feed_views: Vec<FeedView> = views.into_iter().map(|(_, view)| view).collect();
        let html = render_archive_index(&self.base_url, &feed_views);
        write_atomically(&self.root.join(INDEX_HTML), html.as_bytes()).await?;

        Ok(skipped)
    }

    /// Name, URLs and episode count of every feed
    pub async fn summaries(&self) -> Result<Vec<FeedSummary>, ArchiveError> {
        let mut summaries = Vec::new();
        for feed in self.feeds()? {
            let (episodes, error) = match load_channel(&feed.layout).await {
                Ok(channel) => (Some(channel.episodes.len()), None),
                Err(e) => {
                    warn!(feed = %feed.name, "Unable to list {}: {e}", feed.name);
                    (None, Some(e.to_string()))
                }
            };
            summaries.push(FeedSummary {
                local_url: feed.layout.local_feed_url(),
                name: feed.name,
                tracked_url: feed.url,
                episodes,
                error,
            });
        }
        Ok(summaries)
    }
}

fn validate_feed_name(name: &str) -> Result<(), ArchiveError> {
    if name == CONFIG_DIR {
        return Err(ArchiveError::ReservedName {
            name: name.to_string(),
        });
    }
    let unsafe_name = name.trim().is_empty()
        || name.trim() != name
        || name.starts_with('.')
        || !sanitize_filename::is_sanitized(name);
    if unsafe_name {
        return Err(ArchiveError::InvalidFeedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_http_url(url: &str) -> Result<(), ArchiveError> {
    let invalid = |reason: &str| ArchiveError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https are supported"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}
