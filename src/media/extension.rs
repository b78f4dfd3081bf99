use url::Url;

/// Extension used for enclosures whose type cannot be inferred
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// Longest extension taken from a URL path
const MAX_EXTENSION_LENGTH: usize = 5;

/// Infer the cached file extension of an enclosure.
///
/// Tries the URL path first, then the declared MIME type, then falls back to
/// `mp3`.
pub fn enclosure_extension(url: &str, mime_type: Option<&str>) -> String {
    if let Some(ext) = url_extension(url) {
        return ext;
    }

    if let Some(mime) = mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    DEFAULT_AUDIO_EXTENSION.to_string()
}

/// Infer the cached file extension of an image from its URL path, if any
pub fn image_extension(url: &str) -> Option<String> {
    url_extension(url)
}

/// Extension of the last path segment, lowercased.
///
/// Query strings and fragments are ignored. Only short alphanumeric
/// extensions qualify so that a dotted segment like `v1.2-final` is not
/// mistaken for one.
fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let filename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())?;
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || !is_valid_extension(ext) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn is_valid_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LENGTH
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "video/mp4" => Some("mp4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === URL extension tests ===

    #[test]
    fn extension_from_url_path() {
        assert_eq!(
            enclosure_extension("https://cdn.example.com/ep1.m4a", None),
            "m4a"
        );
    }

    #[test]
    fn extension_ignores_query_string() {
        assert_eq!(
            enclosure_extension("https://cdn.example.com/ep1.ogg?token=a.b", None),
            "ogg"
        );
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(
            enclosure_extension("https://cdn.example.com/EP1.MP3", None),
            "mp3"
        );
    }

    #[test]
    fn dotted_segment_is_not_an_extension() {
        assert_eq!(image_extension("https://example.com/v1.2-final"), None);
        assert_eq!(image_extension("https://example.com/.hidden"), None);
    }

    // === Fallback tests ===

    #[test]
    fn extension_from_mime_when_url_has_none() {
        assert_eq!(
            enclosure_extension("https://cdn.example.com/stream", Some("audio/x-m4a")),
            "m4a"
        );
        assert_eq!(
            enclosure_extension(
                "https://cdn.example.com/stream",
                Some("audio/ogg; codecs=opus")
            ),
            "ogg"
        );
    }

    #[test]
    fn extension_defaults_to_mp3() {
        assert_eq!(
            enclosure_extension("https://cdn.example.com/stream", None),
            "mp3"
        );
        assert_eq!(
            enclosure_extension("https://cdn.example.com/stream", Some("application/unknown")),
            "mp3"
        );
        assert_eq!(enclosure_extension("not a url", None), "mp3");
    }

    #[test]
    fn image_without_extension_has_none() {
        assert_eq!(image_extension("https://img.example.com/cover"), None);
        assert_eq!(
            image_extension("https://img.example.com/cover.JPG"),
            Some("jpg".to_string())
        );
    }
}
