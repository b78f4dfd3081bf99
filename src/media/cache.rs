use std::collections::HashSet;
use std::path::Path;

use crate::address::ContentAddress;
use crate::download::TEMP_SUFFIX;
use crate::error::CacheError;

/// Media already present in a feed's media directories
#[derive(Debug, Clone, Default)]
pub struct CachedMedia {
    /// Addresses of committed files
    pub addresses: HashSet<ContentAddress>,
    /// Number of stale in-progress files that were removed during the scan
    pub partial_files_cleaned: usize,
}

impl CachedMedia {
    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.addresses.contains(address)
    }
}

/// Scan media directories for already-fetched content.
///
/// A committed file's stem (the name up to its first `.`) is its address.
/// Leftover `.download` files can only come from an interrupted process,
/// since the caller holds the archive lock, so they are removed. Missing
/// directories are created.
pub fn scan_cached_media(dirs: &[&Path]) -> Result<CachedMedia, CacheError> {
    let mut cached = CachedMedia::default();

    for dir in dirs {
        scan_dir(dir, &mut cached)?;
    }

    Ok(cached)
}

fn scan_dir(dir: &Path, cached: &mut CachedMedia) -> Result<(), CacheError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::CreateDirectoryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        return Ok(());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| CacheError::ReadDirectoryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if filename.ends_with(TEMP_SUFFIX) {
            if std::fs::remove_file(&path).is_ok() {
                cached.partial_files_cleaned += 1;
            }
            continue;
        }

        let stem = filename.split('.').next().unwrap_or(filename);
        if let Some(address) = ContentAddress::from_stem(stem) {
            cached.addresses.insert(address);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn address(input: &str) -> ContentAddress {
        ContentAddress::of("test", input).unwrap()
    }

    #[test]
    fn scan_empty_dir_returns_empty_state() {
        let dir = tempdir().unwrap();
        let cached = scan_cached_media(&[dir.path()]).unwrap();

        assert!(cached.addresses.is_empty());
        assert_eq!(cached.partial_files_cleaned, 0);
    }

    #[test]
    fn scan_creates_nonexistent_dir() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("audio");

        assert!(!audio.exists());
        let cached = scan_cached_media(&[&audio]).unwrap();
        assert!(audio.is_dir());
        assert!(cached.addresses.is_empty());
    }

    #[test]
    fn scan_finds_addresses_in_all_dirs() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("audio");
        let images = dir.path().join("images");
        std::fs::create_dir_all(&audio).unwrap();
        std::fs::create_dir_all(&images).unwrap();

        let a = address("a");
        let b = address("b");
        std::fs::write(audio.join(format!("{a}.mp3")), b"audio").unwrap();
        std::fs::write(images.join(b.as_str()), b"image").unwrap();
        std::fs::write(audio.join("notes.txt"), b"unrelated").unwrap();

        let cached = scan_cached_media(&[&audio, &images]).unwrap();

        assert_eq!(cached.addresses.len(), 2);
        assert!(cached.contains(&a));
        assert!(cached.contains(&b));
    }

    #[test]
    fn scan_cleans_up_partial_files() {
        let dir = tempdir().unwrap();
        let partial = address("partial");
        let done = address("done");

        std::fs::write(
            dir.path().join(format!("{partial}.mp3.download")),
            b"partial data",
        )
        .unwrap();
        std::fs::write(dir.path().join(format!("{done}.mp3")), b"complete").unwrap();

        let cached = scan_cached_media(&[dir.path()]).unwrap();

        assert_eq!(cached.partial_files_cleaned, 1);
        assert!(!dir.path().join(format!("{partial}.mp3.download")).exists());
        assert!(!cached.contains(&partial));
        assert!(cached.contains(&done));
    }
}
