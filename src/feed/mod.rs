mod parse;
mod reconcile;
mod sanitize;
mod write;

pub use parse::{ChannelMeta, Owner, ParsedSnapshot, SnapshotEnclosure, SnapshotItem, parse_date};
pub use reconcile::{Channel, Episode, parse_snapshots, reconcile};
pub use sanitize::{SanitizedHtml, sanitize_description};
pub use write::channel_to_rss;
