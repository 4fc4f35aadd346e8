//! Static URL discovery in inline scripts.
//!
//! Player setups often live in an inline `<script>`:
//!
//! - `jwplayer("p").setup({file: "https://cdn/x.m3u8"})`
//! - `new Hls().loadSource('/live/index.m3u8')`
//! - `var cfg = {"hls":"https:\/\/cdn\/a.m3u8"}` (JSON-escaped slashes)
//!
//! The probe pulls candidate URLs out of the source text without running
//! it. Candidates still go through the classifier like any other.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// A URL found in script text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeHit {
    /// Absolute URL, resolved against the page base when relative.
    pub url: String,
    /// Name of the pattern that found it.
    pub pattern: &'static str,
}

struct ScriptPattern {
    name: &'static str,
    regex: Regex,
}

static PATTERNS: LazyLock<Vec<ScriptPattern>> = LazyLock::new(|| {
    [
        // Any quoted absolute URL
        ("quoted_url", r#"["'`](https?:(?:\\?/){2}[^"'`\s]+)["'`]"#),
        // Player config keys: file: "...", "src": "...", hls = '...'
        (
            "player_key",
            r#"(?i)["']?\b(?:file|src|source|url|hls|dash|manifest|playlist|stream)["']?\s*[:=]\s*["'`]([^"'`\s]+)["'`]"#,
        ),
        // hls.js / shaka / video.js loaders
        (
            "load_call",
            r#"\.(?:loadSource|load|src)\s*\(\s*["'`]([^"'`\s]+)["'`]"#,
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| ScriptPattern {
        name,
        regex: Regex::new(pattern).unwrap(),
    })
    .collect()
});

/// Extract candidate URLs from script source.
///
/// Results keep first-seen order and contain each URL once. Template
/// literals with interpolation are skipped, and relative references are
/// dropped when there is no `base`.
#[must_use]
pub fn probe(script: &str, base: Option<&Url>) -> Vec<ProbeHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for pattern in PATTERNS.iter() {
        for cap in pattern.regex.captures_iter(script) {
            let Some(raw) = cap.get(1) else { continue };
            let raw = raw.as_str();

            // Can't resolve interpolations statically
            if raw.contains("${") || raw.len() < 4 {
                continue;
            }

            let Some(url) = absolutize(&raw.replace("\\/", "/"), base) else {
                continue;
            };
            if seen.insert(url.clone()) {
                hits.push(ProbeHit {
                    url,
                    pattern: pattern.name,
                });
            }
        }
    }

    hits
}

fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    let resolved = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
        Err(_) => return None,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.into())
}
