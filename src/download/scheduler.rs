// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::transfer::{TransferContext, stream_to_file};

/// Suffix of the sibling file a download is streamed into before commit
pub const TEMP_SUFFIX: &str = ".download";

/// Options for the download scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Minimum gap between the end of one download and the start of the
    /// next one to the same host
    pub delay: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
        }
    }
}

/// Decides whether a completed transfer replaces the destination
#[async_trait]
pub trait DownloadValidator: Send + Sync {
    /// Inspect the fully written temporary file. `true` commits it.
    async fn validate(&self, downloaded: &Path) -> bool;
}

#[derive(Debug, Default)]
struct HostSlot {
    last_finished: Option<Instant>,
}

/// A fetch's exclusive turn on its host.
///
/// Once the transfer has begun, giving up the turn stamps the host's
/// `last_finished`, even when the fetch future is dropped mid-transfer.
struct HostTurn {
    slot: tokio::sync::OwnedMutexGuard<HostSlot>,
    transferring: bool,
}

impl Drop for HostTurn {
    fn drop(&mut self) {
        if self.transferring {
            self.slot.last_finished = Some(Instant::now());
        }
    }
}

/// Serializes and paces outbound downloads per remote host.
///
/// Each host owns a fair async mutex held for the whole transfer, so two
/// fetches to one host never overlap and queue in arrival order. Fetches to
/// distinct hosts lock distinct slots and proceed independently.
pub struct DownloadScheduler<C> {
    client: C,
    options: SchedulerOptions,
    reporter: SharedProgressReporter,
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<HostSlot>>>>,
    next_id: AtomicUsize,
}

impl<C: HttpClient> DownloadScheduler<C> {
    pub fn new(client: C, options: SchedulerOptions, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            options,
            reporter,
            hosts: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn reporter(&self) -> &SharedProgressReporter {
        &self.reporter
    }

    /// Download `url` to `destination` through `<destination>.download`.
    ///
    /// Returns the validator's verdict, or `true` when no validator is given.
    /// A rejected download leaves `destination` untouched.
    pub async fn fetch(
        &self,
        label: &str,
        url: &str,
        destination: &Path,
        validator: Option<&dyn DownloadValidator>,
    ) -> Result<bool, DownloadError> {
        let host = host_key(url)?;
        let download_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(&host);

        self.reporter.report(ProgressEvent::DownloadQueued {
            download_id,
            label: label.to_string(),
            host: host.clone(),
        });

        let mut turn = HostTurn {
            slot: slot.lock_owned().await,
            transferring: false,
        };
        if let Some(last_finished) = turn.slot.last_finished {
            match last_finished.checked_add(self.options.delay) {
                Some(ready) => tokio::time::sleep_until(ready).await,
                None => {
                    warn!(%host, delay = ?self.options.delay, "Host delay overflows the clock; waiting it out from now");
                    tokio::time::sleep(self.options.delay).await;
                }
            }
        }

        turn.transferring = true;
        debug!(%host, url = url.trim(), "Downloading {label}");
        let result = self
            .transfer(download_id, label, url, destination, validator)
            .await;
        drop(turn);

        match &result {
            Ok((bytes_downloaded, committed)) => {
                self.reporter.report(ProgressEvent::DownloadCompleted {
                    download_id,
                    label: label.to_string(),
                    bytes_downloaded: *bytes_downloaded,
                    committed: *committed,
                });
            }
            Err(e) => {
                self.reporter.report(ProgressEvent::DownloadFailed {
                    download_id,
                    label: label.to_string(),
                    error: e.to_string(),
                });
            }
        }

        result.map(|(_, committed)| committed)
    }

    async fn transfer(
        &self,
        download_id: usize,
        label: &str,
        url: &str,
        destination: &Path,
        validator: Option<&dyn DownloadValidator>,
    ) -> Result<(u64, bool), DownloadError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::FileCreateFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let temp_path = temp_path_for(destination);
        let context = TransferContext { download_id, label };

        let bytes = match stream_to_file(&self.client, url, &temp_path, &context, &self.reporter)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                // Best effort; a leftover is swept by the next cache scan
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let accepted = match validator {
            Some(validator) => validator.validate(&temp_path).await,
            None => true,
        };

        if accepted {
            tokio::fs::rename(&temp_path, destination)
                .await
                .map_err(|e| DownloadError::CommitFailed {
                    from: temp_path.clone(),
                    to: destination.to_path_buf(),
                    source: e,
                })?;
        } else {
            debug!(url = url.trim(), "Discarding {label}: rejected by validator");
            tokio::fs::remove_file(&temp_path)
                .await
                .map_err(|e| DownloadError::DiscardFailed {
                    path: temp_path.clone(),
                    source: e,
                })?;
        }

        Ok((bytes, accepted))
    }

    fn slot(&self, host: &str) -> Arc<tokio::sync::Mutex<HostSlot>> {
        let mut hosts = match self.hosts.lock() {
            Ok(hosts) => hosts,
            Err(poisoned) => {
                warn!("host table lock was poisoned; continuing");
                poisoned.into_inner()
            }
        };
        hosts.entry(host.to_string()).or_default().clone()
    }
}

/// `host[:port]` of a URL, the unit of pacing
fn host_key(url: &str) -> Result<String, DownloadError> {
    let parsed = Url::parse(url.trim()).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        source: e,
    })?;
    let host = parsed.host_str().ok_or_else(|| DownloadError::MissingHost {
        url: url.to_string(),
    })?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Sibling path a download is streamed into
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}
