// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::address::ContentAddress;
use crate::error::FeedError;
use crate::media::{FeedLayout, MediaReference};

use super::parse::{Owner, ParsedSnapshot, SnapshotItem};
use super::sanitize::sanitize_description;

/// The canonical channel assembled from every snapshot of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub link: String,
    pub language: Option<String>,
    pub author: Option<String>,
    pub copyright: Option<String>,
    pub owner: Option<Owner>,
    pub image: Option<MediaReference>,
    pub pub_date: DateTime<Utc>,
    pub last_build_date: DateTime<Utc>,
    /// Newest first
    pub episodes: Vec<Episode>,
}

/// One de-duplicated episode with its media resolved to local identities
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub title: String,
    pub link: Option<String>,
    /// Sanitized HTML
    pub description: String,
    pub guid: String,
    pub guid_address: ContentAddress,
    pub pub_date: DateTime<Utc>,
    pub enclosure: MediaReference,
    /// Images referenced from the description
    pub images: Vec<MediaReference>,
}

impl Channel {
    /// Every media file the channel references, in fetch order: each
    /// episode's enclosure followed by its inline images, then the cover
    pub fn media(&self) -> Vec<&MediaReference> {
        self.episodes
            .iter()
            .flat_map(|episode| std::iter::once(&episode.enclosure).chain(&episode.images))
            .chain(self.image.as_ref())
            .collect()
    }
}

/// Parse raw snapshots, skipping (and logging) any that are not valid RSS.
///
/// The input order is preserved, so newest-first input yields newest-first
/// output.
pub fn parse_snapshots<'a, I>(raw: I) -> Vec<ParsedSnapshot>
where
    I: IntoIterator<Item = (&'a Path, &'a [u8])>,
{
    raw.into_iter()
        .filter_map(|(path, bytes)| match ParsedSnapshot::parse(bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(snapshot = %path.display(), "Skipping unreadable snapshot: {e}");
                None
            }
        })
        .collect()
}

/// Merge snapshots (newest first) into one canonical channel.
///
/// Channel metadata comes from the newest snapshot only. Episodes are the
/// union of all snapshots' items, keeping the first occurrence of each
/// identity, sorted newest first. Items that cannot be turned into an
/// episode are logged and left out without failing the whole channel.
pub fn reconcile(snapshots: &[ParsedSnapshot], layout: &FeedLayout) -> Result<Channel, FeedError> {
    let newest = snapshots.first().ok_or(FeedError::NoSnapshots)?;
    let meta = newest.meta();

    let image = meta.image_url.as_deref().and_then(|url| match layout.image(url) {
        Ok(reference) => Some(reference),
        Err(e) => {
            warn!(feed = %layout.root().display(), "Ignoring cover image: {e}");
            None
        }
    });

    let all_items = snapshots.iter().flat_map(ParsedSnapshot::items);
    let mut episodes = Vec::new();
    for item in unique_items(all_items) {
        match build_episode(item, layout) {
            Ok(episode) => episodes.push(episode),
            Err(e) => warn!(feed = %layout.root().display(), "Skipping episode: {e}"),
        }
    }
    // Stable, so equal dates keep discovery order
    episodes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

    Ok(Channel {
        title: meta.title.clone(),
        description: meta.description.clone(),
        link: meta.link.clone(),
        language: meta.language.clone(),
        author: meta.author.clone(),
        copyright: meta.copyright.clone(),
        owner: meta.owner.clone(),
        image,
        pub_date: meta.pub_date,
        last_build_date: meta.last_build_date,
        episodes,
    })
}

/// First occurrence of every identity, in input order.
///
/// Only items that carry an enclosure can claim an identity, so a newer copy
/// that lost its enclosure never hides an older one that still has it. Items
/// that never carry an enclosure, or have no identity at all, are kept once
/// at the end so that the episode builder can report them.
fn unique_items<'a>(items: impl Iterator<Item = &'a SnapshotItem>) -> Vec<&'a SnapshotItem> {
    let (playable, unplayable): (Vec<_>, Vec<_>) =
        items.partition(|item| item.enclosure.is_some());

    let mut seen = HashSet::new();
    let mut unique: Vec<&SnapshotItem> = playable
        .into_iter()
        .filter(|&item| match item.identity() {
            Some(identity) => seen.insert(identity),
            None => true,
        })
        .collect();
    unique.extend(unplayable.into_iter().filter(|&item| match item.identity() {
        Some(identity) => seen.insert(identity),
        None => true,
    }));
    unique
}

fn build_episode(item: &SnapshotItem, layout: &FeedLayout) -> Result<Episode, FeedError> {
    let enclosure = item
        .enclosure
        .as_ref()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: item.title.clone(),
        })?;

    let guid = item.identity().unwrap_or_default().to_string();
    let guid_address = ContentAddress::of(&format!("guid of '{}'", item.title), &guid)
        .map_err(|source| FeedError::Unaddressable {
            title: item.title.clone(),
            source,
        })?;

    let sanitized = match item.description.as_deref() {
        Some(description) => sanitize_description(description, layout)?,
        None => Default::default(),
    };

    Ok(Episode {
        title: item.title.clone(),
        link: item.link.clone(),
        description: sanitized.html,
        guid,
        enclosure: layout.enclosure(
            guid_address.clone(),
            &enclosure.url,
            enclosure.mime_type.clone(),
            enclosure.length,
        ),
        guid_address,
        pub_date: item.pub_date,
        images: sanitized.images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rss_feed;
    use std::collections::BTreeSet;

    fn layout() -> FeedLayout {
        FeedLayout::new("/archive/show1", "https://example.com/pod/show1")
    }

    fn snapshot(title: &str, items: &[(&str, &str, &str, &str)]) -> ParsedSnapshot {
        ParsedSnapshot::parse(rss_feed(title, items).as_bytes()).unwrap()
    }

    const JAN: &str = "Mon, 01 Jan 2024 12:00:00 +0000";
    const FEB: &str = "Thu, 01 Feb 2024 12:00:00 +0000";
    const MAR: &str = "Fri, 01 Mar 2024 12:00:00 +0000";

    #[test]
    fn reconcile_requires_a_snapshot() {
        assert!(matches!(
            reconcile(&[], &layout()),
            Err(FeedError::NoSnapshots)
        ));
    }

    #[test]
    fn metadata_comes_from_newest_snapshot() {
        let newest = snapshot("New Title", &[("a", "A", JAN, "https://cdn.example.org/a.mp3")]);
        let oldest = snapshot("Old Title", &[("a", "A", JAN, "https://cdn.example.org/a.mp3")]);

        let channel = reconcile(&[newest, oldest], &layout()).unwrap();
        assert_eq!(channel.title, "New Title");
        assert_eq!(channel.author.as_deref(), Some("Some Host"));
    }

    #[test]
    fn episodes_are_union_without_duplicates() {
        let newest = snapshot(
            "Show",
            &[
                ("c", "C", MAR, "https://cdn.example.org/c.mp3"),
                ("b", "B", FEB, "https://cdn.example.org/b.mp3"),
            ],
        );
        let older = snapshot(
            "Show",
            &[
                ("b", "B (old copy)", FEB, "https://cdn.example.org/b.mp3"),
                ("a", "A", JAN, "https://cdn.example.org/a.mp3"),
            ],
        );
        let oldest = snapshot("Show", &[("a", "A", JAN, "https://cdn.example.org/a.mp3")]);

        let channel = reconcile(&[newest, older, oldest], &layout()).unwrap();

        let guids: Vec<_> = channel.episodes.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["c", "b", "a"]);
        let unique: BTreeSet<_> = guids.iter().collect();
        assert_eq!(unique.len(), guids.len());
    }

    #[test]
    fn episodes_are_sorted_newest_first() {
        let only = snapshot(
            "Show",
            &[
                ("a", "A", JAN, "https://cdn.example.org/a.mp3"),
                ("c", "C", MAR, "https://cdn.example.org/c.mp3"),
                ("x", "X", "not a date", "https://cdn.example.org/x.mp3"),
                ("b", "B", FEB, "https://cdn.example.org/b.mp3"),
            ],
        );

        let channel = reconcile(&[only], &layout()).unwrap();

        for pair in channel.episodes.windows(2) {
            assert!(pair[0].pub_date >= pair[1].pub_date);
        }
        assert_eq!(channel.episodes.last().unwrap().guid, "x");
        assert_eq!(
            channel.episodes.last().unwrap().pub_date,
            DateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn enclosures_resolve_to_local_identities() {
        let only = snapshot(
            "Show",
            &[
                ("a", "A", JAN, "https://cdn.example.org/a.mp3"),
                ("b", "B", FEB, "https://cdn.example.org/stream?id=b"),
            ],
        );

        let channel = reconcile(&[only], &layout()).unwrap();
        let b = &channel.episodes[0];
        let a = &channel.episodes[1];

        let addr_a = ContentAddress::of("guid", "a").unwrap();
        assert_eq!(a.guid_address, addr_a);
        assert_eq!(
            a.enclosure.local_url,
            format!("https://example.com/pod/show1/audio/{addr_a}.mp3")
        );
        assert_eq!(a.enclosure.remote_url, "https://cdn.example.org/a.mp3");
        // No extension in the URL; the declared audio/mpeg type decides
        assert!(b.enclosure.file_name.ends_with(".mp3"));
    }

    #[test]
    fn cover_image_is_resolved() {
        let only = snapshot("Show", &[]);
        let channel = reconcile(&[only], &layout()).unwrap();
        let image = channel.image.unwrap();
        assert_eq!(image.remote_url, "https://img.example.org/cover.jpg");
        assert!(image.local_url.ends_with(".jpg"));
    }

    #[test]
    fn items_without_enclosure_are_skipped() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title><description>D</description><link>L</link>
    <item><title>Text only</title><guid>t</guid></item>
    <item><title>Nothing at all</title></item>
    <item><title>Audio</title><guid>a</guid><enclosure url="https://cdn.example.org/a.mp3" length="1" type="audio/mpeg"/></item>
  </channel>
</rss>"#;
        let parsed = ParsedSnapshot::parse(feed.as_bytes()).unwrap();
        let channel = reconcile(&[parsed], &layout()).unwrap();

        assert_eq!(channel.episodes.len(), 1);
        assert_eq!(channel.episodes[0].guid, "a");
        assert!(channel.image.is_none());
        assert!(channel.owner.is_none());
    }

    #[test]
    fn copy_without_enclosure_does_not_hide_playable_copy() {
        let newest = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title><description>D</description><link>L</link>
    <item><title>A (audio pulled)</title><guid>a</guid></item>
    <item><title>Teaser</title><guid>t</guid></item>
  </channel>
</rss>"#;
        let newest = ParsedSnapshot::parse(newest.as_bytes()).unwrap();
        let older = snapshot("T", &[("a", "A", JAN, "https://cdn.example.org/a.mp3")]);

        let channel = reconcile(&[newest, older], &layout()).unwrap();

        assert_eq!(channel.episodes.len(), 1);
        assert_eq!(channel.episodes[0].guid, "a");
        assert_eq!(
            channel.episodes[0].enclosure.remote_url,
            "https://cdn.example.org/a.mp3"
        );
    }

    #[test]
    fn description_images_become_media() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title><description>D</description><link>L</link>
    <item>
      <title>Pics</title><guid>p</guid>
      <description><![CDATA[<p>Look <img src="https://img.example.org/p.gif"></p><script>x()</script>]]></description>
      <enclosure url="https://cdn.example.org/p.mp3" length="1" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;
        let parsed = ParsedSnapshot::parse(feed.as_bytes()).unwrap();
        let channel = reconcile(&[parsed], &layout()).unwrap();
        let episode = &channel.episodes[0];

        assert_eq!(episode.images.len(), 1);
        assert!(!episode.description.contains("script"));
        assert!(episode.description.contains(&episode.images[0].local_url));
        assert_eq!(channel.media().len(), 2);
    }

    #[test]
    fn parse_snapshots_skips_garbage() {
        let good = rss_feed("Show", &[("a", "A", JAN, "https://cdn.example.org/a.mp3")]);
        let raw: Vec<(&Path, &[u8])> = vec![
            (Path::new("3.xml"), &b"<html>oops"[..]),
            (Path::new("2.xml"), good.as_bytes()),
        ];
        let parsed = parse_snapshots(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].meta().title, "Show");
    }
}
