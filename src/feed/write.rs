use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rss::extension::itunes::{ITunesChannelExtension, ITunesOwner};
use rss::{Enclosure, Guid, Image, Item};

use crate::error::FeedError;
use crate::media::MediaReference;

use super::reconcile::{Channel, Episode};

/// `itunes` is not listed: the writer declares it for the iTunes extension
const NAMESPACES: [(&str, &str); 3] = [
    ("googleplay", "http://www.google.com/schemas/play-podcasts/1.0"),
    ("atom", "http://www.w3.org/2005/Atom"),
    ("content", "http://purl.org/rss/1.0/modules/content/"),
];

const FALLBACK_MIME_TYPE: &str = "audio/mpeg";

/// Serialize a canonical channel as RSS 2.0.
///
/// Every media URL in the output is the local one.
pub fn channel_to_rss(channel: &Channel) -> Result<Vec<u8>, FeedError> {
    let mut rss_channel = rss::Channel::default();
    rss_channel.set_namespaces(
        NAMESPACES
            .iter()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect::<BTreeMap<_, _>>(),
    );

    rss_channel.set_title(channel.title.as_str());
    rss_channel.set_link(channel.link.as_str());
    rss_channel.set_description(channel.description.as_str());
    rss_channel.set_language(channel.language.clone());
    rss_channel.set_copyright(channel.copyright.clone());
    rss_channel.set_pub_date(known_date(channel.pub_date));
    rss_channel.set_last_build_date(known_date(channel.last_build_date));

    if let Some(image) = &channel.image {
        let mut rss_image = Image::default();
        rss_image.set_url(image.local_url.as_str());
        rss_image.set_title(channel.title.as_str());
        rss_image.set_link(channel.link.as_str());
        rss_channel.set_image(rss_image);
    }

    let mut itunes = ITunesChannelExtension::default();
    itunes.set_author(channel.author.clone());
    itunes.set_image(channel.image.as_ref().map(|image| image.local_url.clone()));
    itunes.set_owner(channel.owner.as_ref().map(|owner| {
        let mut itunes_owner = ITunesOwner::default();
        itunes_owner.set_name(owner.name.clone());
        itunes_owner.set_email(owner.email.clone());
        itunes_owner
    }));
    rss_channel.set_itunes_ext(itunes);

    rss_channel.set_items(channel.episodes.iter().map(episode_to_item).collect::<Vec<_>>());

    rss_channel
        .write_to(Vec::new())
        .map_err(FeedError::SerializeFailed)
}

fn episode_to_item(episode: &Episode) -> Item {
    let mut item = Item::default();
    item.set_title(episode.title.clone());
    item.set_link(episode.link.clone());
    item.set_description(episode.description.clone());
    item.set_pub_date(known_date(episode.pub_date));

    let mut guid = Guid::default();
    guid.set_value(episode.guid.as_str());
    guid.set_permalink(false);
    item.set_guid(guid);

    item.set_enclosure(local_enclosure(&episode.enclosure));
    item
}

/// RFC 2822 form of a date, or nothing when the date was never known
fn known_date(date: DateTime<Utc>) -> Option<String> {
    (date != DateTime::UNIX_EPOCH).then(|| date.to_rfc2822())
}

fn local_enclosure(reference: &MediaReference) -> Enclosure {
    let mut enclosure = Enclosure::default();
    enclosure.set_url(reference.local_url.as_str());
    enclosure.set_length(reference.length.unwrap_or(0).to_string());
    enclosure.set_mime_type(
        reference
            .mime_type
            .as_deref()
            .unwrap_or(FALLBACK_MIME_TYPE),
    );
    enclosure
}
