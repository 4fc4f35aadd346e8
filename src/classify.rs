//! URL → stream-type classifier
//!
//! Pure function over the URL string and a static [`RuleSet`]: deny rules
//! first, then the allow classes in priority order, first match wins.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rules::{RuleClass, RuleSet};

/// Stream type label attached to a discovered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// HLS playlist recognised by name (`*.m3u8`).
    M3u8,
    /// HLS stream recognised by path, query or MIME hint.
    Hls,
    /// Progressive media file.
    Video,
    /// DASH manifest.
    Dash,
}

impl StreamKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M3u8 => "m3u8",
            Self::Hls => "hls",
            Self::Video => "video",
            Self::Dash => "dash",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result with the rule that decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'r> {
    /// Empty input or characters no URL can contain.
    Malformed,
    /// A deny rule matched; allow rules were not consulted.
    Blocked { rule: &'r str },
    /// First matching allow rule.
    Matched { kind: StreamKind, rule: &'r str },
    /// No rule matched.
    Unmatched,
}

impl Verdict<'_> {
    /// The stream label, if the URL was accepted.
    #[must_use]
    pub fn kind(&self) -> Option<StreamKind> {
        match self {
            Self::Matched { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Name of the deciding rule, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::Blocked { rule } | Self::Matched { rule, .. } => Some(rule),
            Self::Malformed | Self::Unmatched => None,
        }
    }
}

/// Stream classifier
///
/// Cheap to clone; all clones share the same compiled rules. Safe to call
/// from every observation point at once since it holds no mutable state.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<RuleSet>,
}

impl Classifier {
    /// Classifier over the canonical built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(RuleSet::canonical())
    }

    #[must_use]
    pub fn with_rules(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classify a URL. `None` means blocked, unmatched or malformed.
    #[must_use]
    pub fn classify(&self, url: &str) -> Option<StreamKind> {
        self.explain(url).kind()
    }

    /// Classify a URL and report which rule decided.
    #[must_use]
    pub fn explain(&self, url: &str) -> Verdict<'_> {
        if is_malformed(url) {
            return Verdict::Malformed;
        }

        for class in RuleClass::PRIORITY {
            if let Some(rule) = self.rules.class_rules(class).find(|rule| rule.is_match(url)) {
                return match rule.kind() {
                    Some(kind) => Verdict::Matched {
                        kind,
                        rule: rule.name(),
                    },
                    None => Verdict::Blocked { rule: rule.name() },
                };
            }
        }

        Verdict::Unmatched
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Blank input or raw control characters. Interior spaces are left to the
/// rules: a URL parser percent-encodes them.
fn is_malformed(url: &str) -> bool {
    url.trim().is_empty() || url.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PatternRule;

    #[test]
    fn master_playlist_with_query_is_m3u8() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.classify("https://cdn.example.com/live/master.m3u8?token=abc"),
            Some(StreamKind::M3u8)
        );
    }

    #[test]
    fn transport_segments_are_blocked() {
        let classifier = Classifier::new();
        let verdict = classifier.explain("https://cdn.example.com/segments/seg-004.ts");
        assert_eq!(verdict, Verdict::Blocked { rule: "ext:ts" });
        assert_eq!(verdict.kind(), None);
    }

    #[test]
    fn deny_wins_over_allow() {
        let classifier = Classifier::new();
        // Matches /hls/ and .m3u8 but also the subtitle deny rule
        assert_eq!(classifier.classify("https://x.test/hls/subtitles/en.m3u8"), None);
        // Matches .mp4 but also segment-n
        assert_eq!(classifier.classify("https://x.test/video/segment_12.mp4"), None);
        assert_eq!(classifier.classify("blob:https://x.test/6f1c-live.m3u8"), None);
    }

    #[test]
    fn allow_class_priority_is_respected() {
        let classifier = Classifier::new();
        // Both /hls/ (hls) and .m3u8 (m3u8) match; m3u8 class goes first
        assert_eq!(
            classifier.explain("https://x.test/hls/stream.m3u8"),
            Verdict::Matched {
                kind: StreamKind::M3u8,
                rule: "ext:m3u8"
            }
        );
        // /live/ (hls) beats .mp4 (video)
        assert_eq!(classifier.classify("https://x.test/live/clip.mp4"), Some(StreamKind::Hls));
    }

    #[test]
    fn first_rule_in_class_wins() {
        let classifier = Classifier::new();
        let verdict = classifier.explain("https://x.test/a/master.m3u8");
        assert_eq!(verdict.rule(), Some("ext:m3u8"));
    }

    #[test]
    fn progressive_and_dash() {
        let classifier = Classifier::new();
        assert_eq!(classifier.classify("https://a/video.mp4"), Some(StreamKind::Video));
        assert_eq!(classifier.classify("https://a/movie.WEBM#t=10"), Some(StreamKind::Video));
        assert_eq!(classifier.classify("https://a/manifest.mpd?x=1"), Some(StreamKind::Dash));
        assert_eq!(classifier.classify("https://a/dash/stream"), Some(StreamKind::Dash));
    }

    #[test]
    fn query_string_is_part_of_the_match() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.explain("https://api.test/play?type=m3u8&id=9").rule(),
            Some("segment-m3u8")
        );
        assert_eq!(
            classifier.classify("https://api.test/play?mime=application/x-mpegURL"),
            Some(StreamKind::Hls)
        );
        // Extension anchors allow a trailing query but not a trailing path
        assert_eq!(classifier.classify("https://a/video.mp4/meta"), None);
    }

    #[test]
    fn malformed_input_is_non_matching() {
        let classifier = Classifier::new();
        assert_eq!(classifier.explain(""), Verdict::Malformed);
        assert_eq!(classifier.explain("   "), Verdict::Malformed);
        assert_eq!(classifier.explain("https://a/b\n.m3u8"), Verdict::Malformed);
        assert_eq!(classifier.explain("https://a/b\u{0}.mp4"), Verdict::Malformed);
    }

    #[test]
    fn spaces_in_path_still_classify() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.classify("https://cdn.test/my show.m3u8"),
            Some(StreamKind::M3u8)
        );
        assert_eq!(
            classifier.classify("https://cdn.test/videos/summer trip.mp4?dl=1"),
            Some(StreamKind::Video)
        );
    }

    #[test]
    fn unrelated_urls_are_unmatched() {
        let classifier = Classifier::new();
        assert_eq!(classifier.explain("https://example.com/about"), Verdict::Unmatched);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = Classifier::new();
        let urls = [
            "https://cdn.example.com/live/master.m3u8?token=abc",
            "https://cdn.example.com/segments/seg-004.ts",
            "https://a/video.mp4",
            "https://example.com/",
        ];
        for url in urls {
            let first = classifier.classify(url);
            for _ in 0..5 {
                assert_eq!(classifier.classify(url), first);
            }
        }
    }

    #[test]
    fn custom_rule_set() {
        let rules = RuleSet::from_rules(vec![
            PatternRule::new("allow-all", RuleClass::Video, ".").unwrap(),
            PatternRule::new("deny-private", RuleClass::Blocked, "/private/").unwrap(),
        ]);
        let classifier = Classifier::with_rules(Arc::new(rules));
        // Declared after, still evaluated first
        assert_eq!(classifier.classify("https://x/private/a"), None);
        assert_eq!(classifier.classify("https://x/public/a"), Some(StreamKind::Video));
    }
}
