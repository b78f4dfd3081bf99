//! HTML indexes for the archive and for each feed.
//!
//! Rendering works from flat views so the markup never reaches into the
//! reconciled channel directly. Everything except the already sanitized
//! episode descriptions is escaped.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::feed::Channel;
use crate::media::FeedLayout;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One episode as shown on a feed's index page
#[derive(Debug, Clone)]
pub struct EpisodeView {
    pub title: String,
    pub published: String,
    pub link: Option<String>,
    pub audio_url: String,
    /// Sanitized HTML
    pub description_html: String,
}

/// One feed as shown on the archive and feed index pages
#[derive(Debug, Clone)]
pub struct FeedView {
    pub name: String,
    pub title: String,
    pub description: String,
    pub feed_url: String,
    pub page_url: String,
    pub cover_url: Option<String>,
    pub episodes: Vec<EpisodeView>,
}

impl FeedView {
    pub fn new(name: &str, layout: &FeedLayout, channel: &Channel) -> Self {
        Self {
            name: name.to_string(),
            title: channel.title.clone(),
            description: channel.description.clone(),
            feed_url: layout.local_feed_url(),
            page_url: format!("{}/index.html", layout.public_url()),
            cover_url: channel.image.as_ref().map(|image| image.local_url.clone()),
            episodes: channel
                .episodes
                .iter()
                .map(|episode| EpisodeView {
                    title: episode.title.clone(),
                    published: episode.pub_date.format(DATE_FORMAT).to_string(),
                    link: episode.link.clone(),
                    audio_url: episode.enclosure.local_url.clone(),
                    description_html: episode.description.clone(),
                })
                .collect(),
        }
    }

    fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// Render the archive's `index.html`
pub fn render_archive_index(base_url: &str, feeds: &[FeedView]) -> String {
    let mut body = String::new();
    if feeds.is_empty() {
        body.push_str("    <p>No podcasts archived yet.</p>\n");
    }
    for feed in feeds {
        let _ = writeln!(body, "    <section class=\"feed\">");
        if let Some(cover) = &feed.cover_url {
            let _ = writeln!(
                body,
                "      <img class=\"cover\" src=\"{}\" alt=\"{}\" width=\"120\" height=\"120\">",
                attr(cover),
                attr(feed.display_title())
            );
        }
        let _ = writeln!(
            body,
            "      <h2><a href=\"{}\">{}</a></h2>",
            attr(&feed.page_url),
            text(feed.display_title())
        );
        let _ = writeln!(
            body,
            "      <p>{} episodes &middot; <a href=\"{}\">RSS</a></p>",
            feed.episodes.len(),
            attr(&feed.feed_url)
        );
        let _ = writeln!(body, "    </section>");
    }

    page("Podcast archive", base_url, &body)
}

/// Render a feed's `index.html`
pub fn render_feed_index(base_url: &str, feed: &FeedView) -> String {
    let mut body = String::new();
    if let Some(cover) = &feed.cover_url {
        let _ = writeln!(
            body,
            "    <img class=\"cover\" src=\"{}\" alt=\"{}\" width=\"240\" height=\"240\">",
            attr(cover),
            attr(feed.display_title())
        );
    }
    let _ = writeln!(body, "    <p>{}</p>", text(&feed.description));
    let _ = writeln!(
        body,
        "    <p><a href=\"{}\">Subscribe (RSS)</a> &middot; <a href=\"{}/index.html\">All podcasts</a></p>",
        attr(&feed.feed_url),
        attr(base_url)
    );

    for episode in &feed.episodes {
        let _ = writeln!(body, "    <article class=\"episode\">");
        match &episode.link {
            Some(link) => {
                let _ = writeln!(
                    body,
                    "      <h2><a href=\"{}\">{}</a></h2>",
                    attr(link),
                    text(&episode.title)
                );
            }
            None => {
                let _ = writeln!(body, "      <h2>{}</h2>", text(&episode.title));
            }
        }
        let _ = writeln!(
            body,
            "      <p class=\"date\">{}</p>",
            text(&episode.published)
        );
        let _ = writeln!(
            body,
            "      <audio controls preload=\"none\" src=\"{}\"></audio>",
            attr(&episode.audio_url)
        );
        let _ = writeln!(
            body,
            "      <div class=\"notes\">{}</div>",
            episode.description_html
        );
        let _ = writeln!(body, "    </article>");
    }

    page(feed.display_title(), base_url, &body)
}

fn page(title: &str, base_url: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         \x20 <meta charset=\"utf-8\">\n\
         \x20 <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         \x20 <title>{title}</title>\n\
         \x20 <base href=\"{base}/\">\n\
         </head>\n\
         <body>\n\
         \x20 <main>\n\
         \x20   <h1>{title}</h1>\n\
         {body}\
         \x20 </main>\n\
         </body>\n\
         </html>\n",
        title = text(title),
        base = attr(base_url),
    )
}
