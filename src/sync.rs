// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::archive::TrackedFeed;
use crate::download::{DownloadScheduler, DownloadValidator, temp_path_for};
use crate::error::{PublishError, SyncError};
use crate::feed::{Channel, ParsedSnapshot, channel_to_rss, parse_snapshots, reconcile};
use crate::http::HttpClient;
use crate::media::{FeedLayout, MediaKind, MediaReference, scan_cached_media};
use crate::progress::ProgressEvent;
use crate::snapshot::SnapshotStore;

/// Which phases of the update cycle run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fetch a new snapshot, then everything else
    #[default]
    Full,
    /// Work from existing snapshots only
    MediaOnly,
}

/// Phases of one feed's update cycle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    FetchingSnapshot,
    Reconciling,
    FetchingMedia,
    Publishing,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPhase::FetchingSnapshot => "fetching snapshot",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::FetchingMedia => "fetching media",
            SyncPhase::Publishing => "publishing",
        })
    }
}

/// What happened to the remote feed during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The cycle ran in media-only mode
    NotAttempted,
    /// A new snapshot was stored
    Committed,
    /// The remote episode set matched an existing snapshot
    Unchanged,
    /// The fetch failed; existing snapshots were used
    Failed(String),
}

/// Result of one feed's update cycle
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub snapshot: SnapshotOutcome,
    /// Episodes in the canonical channel
    pub episodes: usize,
    /// Media files fetched during this cycle
    pub downloaded: usize,
    /// Media files already cached
    pub cached: usize,
    /// Media files that failed to download
    pub failed: usize,
    /// Details of failed media (label, error message)
    pub failed_media: Vec<(String, String)>,
}

/// Rejects snapshots whose episode set matches an existing snapshot.
///
/// Payloads that do not parse are rejected too, so a broken response never
/// becomes a snapshot.
pub struct SnapshotValidator {
    known_signatures: HashSet<String>,
}

impl SnapshotValidator {
    pub fn new<'a>(existing: impl IntoIterator<Item = &'a ParsedSnapshot>) -> Self {
        Self {
            known_signatures: existing
                .into_iter()
                .map(ParsedSnapshot::episode_signature)
                .collect(),
        }
    }
}

#[async_trait]
impl DownloadValidator for SnapshotValidator {
    async fn validate(&self, downloaded: &Path) -> bool {
        let bytes = match tokio::fs::read(downloaded).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %downloaded.display(), "Cannot read downloaded snapshot: {e}");
                return false;
            }
        };
        match ParsedSnapshot::parse(&bytes) {
            Ok(snapshot) => !self.known_signatures.contains(&snapshot.episode_signature()),
            Err(e) => {
                warn!(path = %downloaded.display(), "Rejecting unparseable snapshot: {e}");
                false
            }
        }
    }
}

/// A media file waiting to be fetched
#[derive(Debug, Clone)]
struct MediaJob {
    label: String,
    reference: MediaReference,
}

/// Run one update cycle for a feed.
///
/// 1. Fetch a new snapshot unless nothing changed (skipped in media-only mode)
/// 2. Reconcile all snapshots into the canonical channel
/// 3. Fetch media that is not cached yet, one file at a time
/// 4. Write the generated feed
///
/// A failed snapshot fetch or media download is logged and the cycle goes
/// on; anything else aborts this feed only.
pub async fn sync_feed<C: HttpClient>(
    feed: &TrackedFeed,
    scheduler: &DownloadScheduler<C>,
    mode: SyncMode,
) -> Result<SyncResult, SyncError> {
    let layout = &feed.layout;
    let store = SnapshotStore::new(layout.snapshots_dir());
    let mut snapshots = read_snapshots(&store).await?;

    let snapshot = match mode {
        SyncMode::MediaOnly => SnapshotOutcome::NotAttempted,
        SyncMode::Full => {
            debug!(feed = %feed.name, "{}", SyncPhase::FetchingSnapshot);
            fetch_snapshot(feed, scheduler, &store, &mut snapshots).await?
        }
    };

    debug!(feed = %feed.name, "{}", SyncPhase::Reconciling);
    let channel = reconcile(&snapshots, layout)?;

    debug!(feed = %feed.name, "{}", SyncPhase::FetchingMedia);
    let audio_dir = layout.audio_dir();
    let images_dir = layout.images_dir();
    let cached = scan_cached_media(&[audio_dir.as_path(), images_dir.as_path()])?;
    if cached.partial_files_cleaned > 0 {
        scheduler
            .reporter()
            .report(ProgressEvent::PartialFilesCleanedUp {
                feed: feed.name.clone(),
                count: cached.partial_files_cleaned,
            });
    }

    let media = channel.media();
    let mut queue = media_queue(&feed.name, &channel);
    queue.retain(|job| !cached.contains(&job.reference.address));
    let pending = queue.len();

    let mut downloaded = 0;
    let mut failed_media = Vec::new();
    while let Some(job) = queue.pop_front() {
        let result = scheduler
            .fetch(
                &job.label,
                &job.reference.remote_url,
                &job.reference.local_path,
                None,
            )
            .await;
        match result {
            Ok(_) => downloaded += 1,
            Err(e) => {
                warn!(feed = %feed.name, "Failed to download {}: {e}", job.label);
                failed_media.push((job.label, e.to_string()));
            }
        }
    }

    debug!(feed = %feed.name, "{}", SyncPhase::Publishing);
    publish_feed(layout, &channel).await?;

    let result = SyncResult {
        snapshot,
        episodes: channel.episodes.len(),
        downloaded,
        cached: unique_count(&media).saturating_sub(pending),
        failed: failed_media.len(),
        failed_media,
    };
    info!(
        feed = %feed.name,
        episodes = result.episodes,
        downloaded = result.downloaded,
        failed = result.failed,
        "Updated {}",
        feed.name
    );
    Ok(result)
}

/// Reconcile a feed's stored snapshots without touching the network
pub async fn load_channel(layout: &FeedLayout) -> Result<Channel, SyncError> {
    let store = SnapshotStore::new(layout.snapshots_dir());
    let snapshots = read_snapshots(&store).await?;
    Ok(reconcile(&snapshots, layout)?)
}

/// Write the generated feed through a temporary sibling
pub async fn publish_feed(layout: &FeedLayout, channel: &Channel) -> Result<(), PublishError> {
    let xml = channel_to_rss(channel)?;
    write_atomically(&layout.feed_xml(), &xml).await
}

/// Replace `path` with `contents` so that readers see either the old or the
/// new file, never a partial one
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), PublishError> {
    let temp_path = temp_path_for(path);
    let write_failed = |source: std::io::Error| PublishError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&temp_path, contents)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(write_failed)
}

async fn read_snapshots(store: &SnapshotStore) -> Result<Vec<ParsedSnapshot>, SyncError> {
    let mut raw = Vec::new();
    for path in store.list().await? {
        let bytes = store.read(&path).await?;
        raw.push((path, bytes));
    }
    Ok(parse_snapshots(
        raw.iter().map(|(path, bytes)| (path.as_path(), bytes.as_slice())),
    ))
}

/// Fetch a new snapshot; on commit it is prepended to `snapshots`
async fn fetch_snapshot<C: HttpClient>(
    feed: &TrackedFeed,
    scheduler: &DownloadScheduler<C>,
    store: &SnapshotStore,
    snapshots: &mut Vec<ParsedSnapshot>,
) -> Result<SnapshotOutcome, SyncError> {
    let destination = store.allocate().await?;
    let validator = SnapshotValidator::new(snapshots.iter());
    let label = format!("{} RSS feed", feed.name);

    match scheduler
        .fetch(&label, &feed.url, &destination, Some(&validator))
        .await
    {
        Ok(true) => {
            let bytes = store.read(&destination).await?;
            let fresh = ParsedSnapshot::parse(&bytes)?;
            snapshots.insert(0, fresh);
            info!(feed = %feed.name, "Stored new snapshot {}", destination.display());
            Ok(SnapshotOutcome::Committed)
        }
        Ok(false) => {
            debug!(feed = %feed.name, "Feed unchanged; snapshot discarded");
            Ok(SnapshotOutcome::Unchanged)
        }
        Err(e) => {
            warn!(feed = %feed.name, "Failed to fetch feed, using stored snapshots: {e}");
            Ok(SnapshotOutcome::Failed(e.to_string()))
        }
    }
}

/// Canonical fetch order with repeated addresses collapsed
fn media_queue(feed_name: &str, channel: &Channel) -> VecDeque<MediaJob> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();

    for episode in &channel.episodes {
        let episode_media = std::iter::once(&episode.enclosure).chain(&episode.images);
        for reference in episode_media {
            if seen.insert(reference.address.clone()) {
                let label = match reference.kind {
                    MediaKind::Audio => format!("{feed_name} - {}", episode.title),
                    MediaKind::Image => format!("{feed_name} - {} (image)", episode.title),
                };
                queue.push_back(MediaJob {
                    label,
                    reference: reference.clone(),
                });
            }
        }
    }

    if let Some(cover) = &channel.image
        && seen.insert(cover.address.clone())
    {
        queue.push_back(MediaJob {
            label: format!("{feed_name} cover art"),
            reference: cover.clone(),
        });
    }

    queue
}

fn unique_count(media: &[&MediaReference]) -> usize {
    media
        .iter()
        .map(|reference| &reference.address)
        .collect::<HashSet<_>>()
        .len()
}
