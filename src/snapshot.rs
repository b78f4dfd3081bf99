//! Immutable, timestamp-named captures of a remote feed.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::SnapshotError;

const SNAPSHOT_EXTENSION: &str = "xml";

/// The snapshot directory of one feed
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate the path for a new snapshot named by the current time in
    /// milliseconds, creating the directory if needed.
    ///
    /// The name always sorts after every existing snapshot, even if the
    /// clock has not moved on. Nothing is written; the caller commits the file.
    pub async fn allocate(&self) -> Result<PathBuf, SnapshotError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SnapshotError::CreateDirectoryFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let newest = self
            .list()
            .await?
            .first()
            .and_then(|path| path.file_name()?.to_str().and_then(parse_timestamp));
        let timestamp = match newest {
            Some(newest) if newest >= now => newest + 1,
            _ => now,
        };
        Ok(self.path_for(timestamp))
    }

    /// All committed snapshots, newest first.
    ///
    /// Ordering is by the numeric timestamp in the name. Files that are not
    /// `<digits>.xml` (in-progress downloads included) are ignored. A missing
    /// directory yields an empty list.
    pub async fn list(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SnapshotError::ReadDirectoryFailed {
                    path: self.dir.clone(),
                    source: e,
                });
            }
        };

        let mut snapshots = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| SnapshotError::ReadDirectoryFailed {
                    path: self.dir.clone(),
                    source: e,
                })?;
            let Some(entry) = entry else { break };

            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file {
                continue;
            }
            if let Some(timestamp) = entry.file_name().to_str().and_then(parse_timestamp) {
                snapshots.push((timestamp, entry.path()));
            }
        }

        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(snapshots.into_iter().map(|(_, path)| path).collect())
    }

    /// Raw bytes of a snapshot
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, SnapshotError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| SnapshotError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn path_for(&self, timestamp: u64) -> PathBuf {
        self.dir.join(format!("{timestamp}.{SNAPSHOT_EXTENSION}"))
    }
}

fn parse_timestamp(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_timestamp_accepts_only_committed_names() {
        assert_eq!(parse_timestamp("1700000000000.xml"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp("9.xml"), Some(9));
        assert_eq!(parse_timestamp("1700000000000.xml.download"), None);
        assert_eq!(parse_timestamp("feed.xml"), None);
        assert_eq!(parse_timestamp(".xml"), None);
        assert_eq!(parse_timestamp("-5.xml"), None);
    }

    #[tokio::test]
    async fn list_sorts_numerically_newest_first() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));
        std::fs::create_dir_all(store.dir()).unwrap();

        for name in ["9.xml", "10.xml", "100.xml", "20.xml"] {
            std::fs::write(store.dir().join(name), name).unwrap();
        }
        std::fs::write(store.dir().join("200.xml.download"), "partial").unwrap();

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["100.xml", "20.xml", "10.xml", "9.xml"]);
    }

    #[tokio::test]
    async fn list_of_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn allocate_creates_directory_but_not_file() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));

        let path = store.allocate().await.unwrap();

        assert!(store.dir().is_dir());
        assert!(!path.exists());
        assert_eq!(path.parent().unwrap(), store.dir());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(parse_timestamp(name).is_some());
    }

    #[tokio::test]
    async fn allocate_sorts_after_existing_snapshots() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let future = Utc::now().timestamp_millis() as u64 + 60_000;
        std::fs::write(dir.path().join(format!("{future}.xml")), "x").unwrap();

        let path = store.allocate().await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_timestamp(name), Some(future + 1));
    }

    #[tokio::test]
    async fn read_returns_bytes() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let path = dir.path().join("1.xml");
        std::fs::write(&path, b"<rss/>").unwrap();

        assert_eq!(store.read(&path).await.unwrap(), b"<rss/>");
        assert!(store.read(&dir.path().join("2.xml")).await.is_err());
    }
}
