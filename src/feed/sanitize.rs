//! Allow-list sanitizer for episode descriptions, built on `lol_html`.

use std::cell::RefCell;

use lol_html::html_content::Element;
use lol_html::{RewriteStrSettings, doc_comments, element, rewrite_str};
use tracing::debug;

use crate::error::FeedError;
use crate::media::{FeedLayout, MediaReference};

const ALLOWED_TAGS: &[&str] = &["a", "div", "span", "p", "em", "strong", "img"];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "alt", "height", "width", "href", "src", "rel", "target", "title",
];

/// Removed together with everything inside them. Besides script-like
/// elements this covers every element whose content the parser reads as
/// text: unwrapping those would turn that text back into markup.
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "xmp", "noembed", "noframes",
    "textarea", "title", "plaintext",
];

const ALLOWED_LINK_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// A description reduced to the allow-list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedHtml {
    pub html: String,
    /// Images referenced by the description, already pointing at their
    /// local URLs in `html`
    pub images: Vec<MediaReference>,
}

/// Strip a description down to the allowed tags and attributes.
///
/// Disallowed elements are unwrapped (their text survives) except for
/// script-like elements, which disappear entirely. Every `<img>` has its
/// `src` rewritten to the local cache URL and is returned for download; an
/// image whose source cannot be fetched is dropped.
pub fn sanitize_description(html: &str, layout: &FeedLayout) -> Result<SanitizedHtml, FeedError> {
    let images: RefCell<Vec<MediaReference>> = RefCell::new(Vec::new());

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                scrub_element(el, layout, &images)?;
                Ok(())
            })],
            document_content_handlers: vec![doc_comments!(|comment| {
                comment.remove();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| FeedError::SanitizeFailed(e.to_string()))?;

    Ok(SanitizedHtml {
        html: output,
        images: images.into_inner(),
    })
}

fn scrub_element(
    el: &mut Element<'_, '_>,
    layout: &FeedLayout,
    images: &RefCell<Vec<MediaReference>>,
) -> Result<(), lol_html::errors::AttributeNameError> {
    let tag = el.tag_name().to_ascii_lowercase();

    if DROPPED_WITH_CONTENT.contains(&tag.as_str()) {
        el.remove();
        return Ok(());
    }
    if !ALLOWED_TAGS.contains(&tag.as_str()) {
        el.remove_and_keep_content();
        return Ok(());
    }

    let disallowed: Vec<String> = el
        .attributes()
        .iter()
        .map(|attr| attr.name())
        .filter(|name| !ALLOWED_ATTRIBUTES.contains(&name.to_ascii_lowercase().as_str()))
        .collect();
    for name in disallowed {
        el.remove_attribute(&name);
    }

    if let Some(href) = el.get_attribute("href")
        && !has_allowed_scheme(&href)
    {
        el.remove_attribute("href");
    }

    if tag == "img" {
        let reference = el
            .get_attribute("src")
            .filter(|src| is_fetchable(src))
            .and_then(|src| layout.image(&src).ok());

        match reference {
            Some(reference) => {
                el.set_attribute("src", &reference.local_url)?;
                let mut images = images.borrow_mut();
                if !images.iter().any(|known| known.address == reference.address) {
                    images.push(reference);
                }
            }
            None => {
                debug!("Dropping image without a fetchable source");
                el.remove();
            }
        }
    }

    Ok(())
}

fn is_fetchable(url: &str) -> bool {
    url::Url::parse(url.trim())
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

fn has_allowed_scheme(href: &str) -> bool {
    match url::Url::parse(href.trim()) {
        Ok(url) => ALLOWED_LINK_SCHEMES.contains(&url.scheme()),
        // Relative links carry no scheme
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}
