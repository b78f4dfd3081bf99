// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::address::ContentAddress;
use crate::error::AddressError;

use super::extension::{enclosure_extension, image_extension};

const CONFIG_DIR: &str = "config";
const FEED_URL_FILE: &str = "feed.url";
const SNAPSHOTS_DIR: &str = "snapshots";
const AUDIO_DIR: &str = "audio";
const IMAGES_DIR: &str = "images";
const FEED_XML: &str = "feed.xml";
const INDEX_HTML: &str = "index.html";

/// Which media directory a reference lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

/// A remote media file and its content-addressed local identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub remote_url: String,
    pub address: ContentAddress,
    /// `<address>[.ext]`
    pub file_name: String,
    pub local_path: PathBuf,
    pub local_url: String,
    pub mime_type: Option<String>,
    /// Declared byte length, enclosures only
    pub length: Option<u64>,
}

/// On-disk and public locations of one feed's files
#[derive(Debug, Clone)]
pub struct FeedLayout {
    root: PathBuf,
    public_url: String,
}

impl FeedLayout {
    /// `public_url` is the URL under which `root` is served, without a
    /// trailing slash
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        let public_url = public_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    pub fn feed_url_file(&self) -> PathBuf {
        self.config_dir().join(FEED_URL_FILE)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn feed_xml(&self) -> PathBuf {
        self.root.join(FEED_XML)
    }

    pub fn index_html(&self) -> PathBuf {
        self.root.join(INDEX_HTML)
    }

    /// Public URL of the generated feed
    pub fn local_feed_url(&self) -> String {
        format!("{}/{FEED_XML}", self.public_url)
    }

    /// Reference for an enclosure, addressed by its episode's GUID
    pub fn enclosure(
        &self,
        guid_address: ContentAddress,
        remote_url: &str,
        mime_type: Option<String>,
        length: Option<u64>,
    ) -> MediaReference {
        let ext = enclosure_extension(remote_url, mime_type.as_deref());
        let file_name = format!("{guid_address}.{ext}");
        self.reference(
            MediaKind::Audio,
            guid_address,
            file_name,
            remote_url,
            mime_type,
            length,
        )
    }

    /// Reference for an image, addressed by its URL
    pub fn image(&self, remote_url: &str) -> Result<MediaReference, AddressError> {
        let remote_url = remote_url.trim();
        let address = ContentAddress::of(&format!("image {remote_url:?}"), remote_url)?;
        let file_name = match image_extension(remote_url) {
            Some(ext) => format!("{address}.{ext}"),
            None => address.to_string(),
        };
        Ok(self.reference(MediaKind::Image, address, file_name, remote_url, None, None))
    }

    fn reference(
        &self,
        kind: MediaKind,
        address: ContentAddress,
        file_name: String,
        remote_url: &str,
        mime_type: Option<String>,
        length: Option<u64>,
    ) -> MediaReference {
        let dir = match kind {
            MediaKind::Audio => AUDIO_DIR,
            MediaKind::Image => IMAGES_DIR,
        };
        MediaReference {
            kind,
            remote_url: remote_url.trim().to_string(),
            address,
            local_path: self.root.join(dir).join(&file_name),
            local_url: format!("{}/{dir}/{file_name}", self.public_url),
            file_name,
            mime_type,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FeedLayout {
        FeedLayout::new("/archive/show1", "https://example.com/pod/show1/")
    }

    #[test]
    fn layout_paths() {
        let layout = layout();
        assert_eq!(layout.public_url(), "https://example.com/pod/show1");
        assert_eq!(
            layout.feed_url_file(),
            PathBuf::from("/archive/show1/config/feed.url")
        );
        assert_eq!(
            layout.snapshots_dir(),
            PathBuf::from("/archive/show1/snapshots")
        );
        assert_eq!(
            layout.local_feed_url(),
            "https://example.com/pod/show1/feed.xml"
        );
    }

    #[test]
    fn enclosure_is_named_by_guid_address() {
        let address = ContentAddress::of("guid", "a").unwrap();
        let reference = layout().enclosure(
            address.clone(),
            "https://cdn.example.org/episode-1.mp3",
            Some("audio/mpeg".to_string()),
            Some(1234),
        );

        assert_eq!(reference.kind, MediaKind::Audio);
        assert_eq!(reference.file_name, format!("{address}.mp3"));
        assert_eq!(
            reference.local_path,
            PathBuf::from(format!("/archive/show1/audio/{address}.mp3"))
        );
        assert_eq!(
            reference.local_url,
            format!("https://example.com/pod/show1/audio/{address}.mp3")
        );
        assert_eq!(reference.length, Some(1234));
    }

    #[test]
    fn image_is_named_by_url_address() {
        let reference = layout().image("https://img.example.org/cover.png").unwrap();
        let address = ContentAddress::of("url", "https://img.example.org/cover.png").unwrap();

        assert_eq!(reference.kind, MediaKind::Image);
        assert_eq!(reference.address, address);
        assert_eq!(reference.file_name, format!("{address}.png"));
        assert!(reference.local_url.contains("/images/"));
    }

    #[test]
    fn image_without_extension_is_bare_address() {
        let reference = layout().image("https://img.example.org/cover").unwrap();
        assert_eq!(reference.file_name, reference.address.to_string());
    }

    #[test]
    fn empty_image_url_is_an_error() {
        assert!(layout().image("  ").is_err());
    }
}
