mod cache;
mod extension;
mod reference;

pub use cache::{CachedMedia, scan_cached_media};
pub use extension::{DEFAULT_AUDIO_EXTENSION, enclosure_extension, image_extension};
pub use reference::{FeedLayout, MediaKind, MediaReference};
