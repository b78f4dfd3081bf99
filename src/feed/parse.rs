// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed view of one snapshot.
//!
//! A snapshot is parsed exactly once. Every optional field of the feed is an
//! `Option` here (empty strings count as absent) and unparseable dates are
//! already collapsed to the Unix epoch, so later stages never re-check the
//! raw document.

use chrono::{DateTime, FixedOffset, Utc};

use crate::address::{ContentAddress, episode_set_signature};
use crate::error::FeedError;

/// Channel-level fields of a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMeta {
    pub title: String,
    pub description: String,
    pub link: String,
    pub language: Option<String>,
    pub author: Option<String>,
    pub copyright: Option<String>,
    pub owner: Option<Owner>,
    pub image_url: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub last_build_date: DateTime<Utc>,
}

/// The `itunes:owner` block; present only if both parts are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub email: String,
}

/// One `<item>` of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub guid: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub enclosure: Option<SnapshotEnclosure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEnclosure {
    pub url: String,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

impl SnapshotItem {
    /// The identity used for de-duplication: the GUID, or the enclosure URL
    /// when the feed omits GUIDs
    pub fn identity(&self) -> Option<&str> {
        self.guid
            .as_deref()
            .or_else(|| self.enclosure.as_ref().map(|e| e.url.as_str()))
    }
}

/// A parsed snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSnapshot {
    meta: ChannelMeta,
    items: Vec<SnapshotItem>,
}

impl ParsedSnapshot {
    /// Parse raw RSS bytes
    pub fn parse(xml_bytes: &[u8]) -> Result<Self, FeedError> {
        let channel = rss::Channel::read_from(xml_bytes)?;
        Ok(Self {
            meta: parse_meta(&channel),
            items: channel.items().iter().map(parse_item).collect(),
        })
    }

    /// Channel metadata projection
    pub fn meta(&self) -> &ChannelMeta {
        &self.meta
    }

    /// Item projection, in document order
    pub fn items(&self) -> &[SnapshotItem] {
        &self.items
    }

    /// Order-independent signature of the episode identities in this snapshot.
    ///
    /// Items without any identity do not contribute.
    pub fn episode_signature(&self) -> String {
        let addresses: Vec<ContentAddress> = self
            .items
            .iter()
            .filter_map(|item| item.identity())
            .filter_map(|identity| ContentAddress::of("guid", identity).ok())
            .collect();
        episode_set_signature(&addresses)
    }
}

fn parse_meta(channel: &rss::Channel) -> ChannelMeta {
    let itunes = channel.itunes_ext();

    let owner = itunes.and_then(|ext| ext.owner()).and_then(|owner| {
        Some(Owner {
            name: non_empty(owner.name())?,
            email: non_empty(owner.email())?,
        })
    });

    let image_url = channel
        .image()
        .and_then(|img| non_empty(Some(img.url())))
        .or_else(|| itunes.and_then(|ext| non_empty(ext.image())));

    ChannelMeta {
        title: channel.title().trim().to_string(),
        description: channel.description().to_string(),
        link: channel.link().trim().to_string(),
        language: non_empty(channel.language()),
        author: itunes.and_then(|ext| non_empty(ext.author())),
        copyright: non_empty(channel.copyright()),
        owner,
        image_url,
        pub_date: parse_date(channel.pub_date()),
        last_build_date: parse_date(channel.last_build_date()),
    }
}

fn parse_item(item: &rss::Item) -> SnapshotItem {
    let enclosure = item.enclosure().and_then(|enclosure| {
        Some(SnapshotEnclosure {
            url: non_empty(Some(enclosure.url()))?,
            length: enclosure.length().trim().parse().ok(),
            mime_type: non_empty(Some(enclosure.mime_type())),
        })
    });

    SnapshotItem {
        title: item.title().unwrap_or_default().trim().to_string(),
        link: non_empty(item.link()),
        description: non_empty(item.description()),
        guid: item.guid().and_then(|g| non_empty(Some(g.value()))),
        pub_date: parse_date(item.pub_date()),
        enclosure,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse an RSS date, falling back to the Unix epoch for missing or
/// malformed values
pub fn parse_date(date_str: Option<&str>) -> DateTime<Utc> {
    date_str
        .map(str::trim)
        .and_then(|s| {
            DateTime::parse_from_rfc2822(s)
                .ok()
                .or_else(|| parse_relaxed_date(s))
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    const FORMATS: [&str; 3] = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
}
