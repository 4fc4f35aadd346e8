//! Display helpers for discovered URLs.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Default maximum title length in characters.
pub const DEFAULT_TITLE_MAX_LEN: usize = 30;

/// Default maximum URL length in log lines.
pub const DEFAULT_LOG_URL_MAX_LEN: usize = 100;

static MEDIA_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(m3u8|mp4|webm|mpd|mov)$").unwrap());

/// Derive a short human-readable title from a stream URL.
///
/// Uses the last path segment without its media extension, falling back to
/// the host name (minus `www.`) when the segment is too short. Separators
/// become spaces and every word is capitalised.
#[must_use]
pub fn derive_title(url: &str, max_len: usize) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return truncate(url, max_len);
    };

    let last_segment = parsed.path().rsplit('/').next().unwrap_or_default();
    let mut name = MEDIA_EXTENSION.replace(last_segment, "").into_owned();

    if name.chars().count() < 2 {
        let host = parsed.host_str().unwrap_or_default();
        name = strip_www(host).to_string();
    }

    let name = name.replace(['_', '-'], " ");
    let name = name
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");

    if name.chars().count() > max_len {
        truncate(&name, max_len)
    } else {
        name
    }
}

/// Shorten a URL for log output.
#[must_use]
pub fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() > max_len {
        truncate(url, max_len)
    } else {
        url.to_string()
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    let head: String = text.chars().take(max_len).collect();
    format!("{head}...")
}

fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_file_name() {
        assert_eq!(
            derive_title("https://cdn.example.com/shows/my_great-show.m3u8?token=1", 30),
            "My Great Show"
        );
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(derive_title("https://a.test/Trailer.MP4", 30), "Trailer");
    }

    #[test]
    fn short_segment_falls_back_to_host() {
        assert_eq!(derive_title("https://www.example.com/", 30), "Example.com");
        assert_eq!(derive_title("https://WWW.cdn.test/a", 30), "Cdn.test");
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = derive_title(
            "https://a.test/an_extraordinarily_long_stream_name_for_testing.mp4",
            30,
        );
        assert_eq!(title, "An Extraordinarily Long Stream...");
        assert_eq!(title.chars().count(), 33);
    }

    #[test]
    fn unparsable_url_uses_prefix() {
        assert_eq!(derive_title("/relative/path/clip.mp4", 10), "/relative/...");
    }

    #[test]
    fn url_truncation_for_logs() {
        assert_eq!(truncate_url("https://a.test/x", 100), "https://a.test/x");
        assert_eq!(truncate_url("https://a.test/xyz", 10), "https://a....");
    }
}
