//! Static, ordered rule tables for stream classification.
//!
//! Rules are grouped into four classes that are always evaluated in the
//! same order: [`RuleClass::Blocked`] first, then `m3u8`, `hls` and `video`.
//! Inside a class, rules keep their declaration order. Nothing else in the
//! crate is allowed to reorder them, so [`RuleSet`] only ever appends and
//! then performs a *stable* sort by class priority.
//!
//! ## Variants
//!
//! Two rule tables exist in the wild: the canonical table (the richer,
//! more recent userscript lists) and the older console-script format
//! lists. [`RuleSet::divergences`] reports where they disagree instead of
//! merging them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::classify::StreamKind;
use crate::error::{Result, WatchError};

/// Rule class, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleClass {
    /// Deny rules: segments, subtitles, keys, static assets, blob/data URIs.
    Blocked,
    /// HLS playlists recognised by file name.
    M3u8,
    /// HLS streams recognised by path or MIME hints.
    Hls,
    /// Progressive files and DASH manifests.
    Video,
}

impl RuleClass {
    /// Fixed evaluation order. Deny precedes every allow class.
    pub const PRIORITY: [RuleClass; 4] = [
        RuleClass::Blocked,
        RuleClass::M3u8,
        RuleClass::Hls,
        RuleClass::Video,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::M3u8 => "m3u8",
            Self::Hls => "hls",
            Self::Video => "video",
        }
    }

    /// Position in [`RuleClass::PRIORITY`].
    #[must_use]
    pub fn priority(self) -> usize {
        match self {
            Self::Blocked => 0,
            Self::M3u8 => 1,
            Self::Hls => 2,
            Self::Video => 3,
        }
    }

    /// Label yielded by a matching rule of this class, `None` for deny rules.
    #[must_use]
    pub fn default_kind(self) -> Option<StreamKind> {
        match self {
            Self::Blocked => None,
            Self::M3u8 => Some(StreamKind::M3u8),
            Self::Hls => Some(StreamKind::Hls),
            Self::Video => Some(StreamKind::Video),
        }
    }
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single case-insensitive matcher tagged with its class
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    class: RuleClass,
    kind: Option<StreamKind>,
    regex: Regex,
}

impl PatternRule {
    /// Compile a rule. Patterns are always matched case-insensitively
    /// against the full URL string.
    pub fn new(name: impl Into<String>, class: RuleClass, pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| WatchError::Rule {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.into(),
            class,
            kind: class.default_kind(),
            regex,
        })
    }

    /// Override the label an allow rule yields (e.g. DASH inside `video`).
    /// Deny rules never yield a label, so this is ignored for them.
    #[must_use]
    pub fn with_kind(mut self, kind: StreamKind) -> Self {
        if self.class != RuleClass::Blocked {
            self.kind = Some(kind);
        }
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn class(&self) -> RuleClass {
        self.class
    }

    #[must_use]
    pub fn kind(&self) -> Option<StreamKind> {
        self.kind
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Where two rule tables disagree, keyed by rule name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "divergence", rename_all = "snake_case")]
pub enum RuleDivergence {
    /// Present in this table only.
    OnlyInOurs { name: String, class: RuleClass },
    /// Present in the other table only.
    OnlyInTheirs { name: String, class: RuleClass },
    /// Same rule filed under different classes.
    ClassMismatch {
        name: String,
        ours: RuleClass,
        theirs: RuleClass,
    },
    /// Same rule and class, different pattern text.
    PatternMismatch {
        name: String,
        ours: String,
        theirs: String,
    },
}

impl fmt::Display for RuleDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlyInOurs { name, class } => write!(f, "only in canonical: {name} ({class})"),
            Self::OnlyInTheirs { name, class } => write!(f, "only in variant:   {name} ({class})"),
            Self::ClassMismatch { name, ours, theirs } => {
                write!(f, "class differs:     {name} ({ours} vs {theirs})")
            }
            Self::PatternMismatch { name, ours, theirs } => {
                write!(f, "pattern differs:   {name} ({ours} vs {theirs})")
            }
        }
    }
}

/// Ordered collection of [`PatternRule`]s
///
/// Invariant: rules are sorted by class priority, and within a class they
/// keep the order in which they were added.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

type RuleRow = (&'static str, RuleClass, &'static str, Option<StreamKind>);

/// Canonical table: the userscript's deny and stream lists.
const CANONICAL_RULES: &[RuleRow] = &[
    // Deny: media segments, keys, subtitles, opaque URIs, static assets
    ("ext:ts", RuleClass::Blocked, r"\.ts([?#].*)?$", None),
    ("segment-n", RuleClass::Blocked, r"segment[-_]?\d+", None),
    ("chunk-n", RuleClass::Blocked, r"chunk[-_]?\d+", None),
    ("frag-n", RuleClass::Blocked, r"frag[-_]?\d+", None),
    ("ext:aac", RuleClass::Blocked, r"\.aac([?#].*)?$", None),
    ("ext:vtt", RuleClass::Blocked, r"\.vtt([?#].*)?$", None),
    ("ext:srt", RuleClass::Blocked, r"\.srt([?#].*)?$", None),
    ("ext:key", RuleClass::Blocked, r"\.key([?#].*)?$", None),
    ("key.key", RuleClass::Blocked, r"key\.key", None),
    ("subtitle", RuleClass::Blocked, r"subtitle", None),
    ("caption", RuleClass::Blocked, r"caption", None),
    ("scheme:blob", RuleClass::Blocked, r"blob:", None),
    ("scheme:data", RuleClass::Blocked, r"^data:", None),
    ("path:/ts/", RuleClass::Blocked, r"/ts/", None),
    ("init-", RuleClass::Blocked, r"init-", None),
    ("ext:json", RuleClass::Blocked, r"\.json([?#].*)?$", None),
    ("ext:png", RuleClass::Blocked, r"\.png([?#].*)?$", None),
    ("ext:jpg", RuleClass::Blocked, r"\.jpg([?#].*)?$", None),
    ("ext:jpeg", RuleClass::Blocked, r"\.jpeg([?#].*)?$", None),
    ("ext:gif", RuleClass::Blocked, r"\.gif([?#].*)?$", None),
    ("ext:css", RuleClass::Blocked, r"\.css([?#].*)?$", None),
    ("ext:js", RuleClass::Blocked, r"\.js([?#].*)?$", None),
    ("ext:html", RuleClass::Blocked, r"\.html([?#].*)?$", None),
    ("ext:svg", RuleClass::Blocked, r"\.svg([?#].*)?$", None),
    ("ext:ico", RuleClass::Blocked, r"\.ico([?#].*)?$", None),
    ("ext:woff", RuleClass::Blocked, r"\.woff([?#].*)?$", None),
    ("ext:woff2", RuleClass::Blocked, r"\.woff2([?#].*)?$", None),
    ("ext:ttf", RuleClass::Blocked, r"\.ttf([?#].*)?$", None),
    ("ext:eot", RuleClass::Blocked, r"\.eot([?#].*)?$", None),
    ("favicon", RuleClass::Blocked, r"favicon", None),
    // HLS playlists by name
    ("ext:m3u8", RuleClass::M3u8, r"\.m3u8([?#].*)?$", None),
    ("segment-m3u8", RuleClass::M3u8, r"/[^/]*m3u8[^/]*$", None),
    ("master.m3u8", RuleClass::M3u8, r"master\.m3u8", None),
    ("index.m3u8", RuleClass::M3u8, r"index\.m3u8", None),
    ("playlist.m3u8", RuleClass::M3u8, r"playlist\.m3u8", None),
    ("manifest.m3u8", RuleClass::M3u8, r"manifest\.m3u8", None),
    ("live.m3u8", RuleClass::M3u8, r"live\.m3u8", None),
    // HLS by path, query or MIME hint
    ("path:/hls/", RuleClass::Hls, r"/hls/", None),
    ("path:/live/", RuleClass::Hls, r"/live/", None),
    ("path:/playlist/", RuleClass::Hls, r"/playlist/", None),
    ("query:type=m3u8", RuleClass::Hls, r"type=m3u8", None),
    ("mime:x-mpegurl", RuleClass::Hls, r"application/x-mpegURL", None),
    ("mime:vnd.apple.mpegurl", RuleClass::Hls, r"application/vnd\.apple\.mpegurl", None),
    ("query:content-type", RuleClass::Hls, r"content-type=[^&]*m3u8", None),
    // Progressive files and DASH
    ("ext:mp4", RuleClass::Video, r"\.mp4([?#].*)?$", None),
    ("ext:webm", RuleClass::Video, r"\.webm([?#].*)?$", None),
    ("ext:mov", RuleClass::Video, r"\.mov([?#].*)?$", None),
    ("ext:m4v", RuleClass::Video, r"\.m4v([?#].*)?$", None),
    ("ext:mkv", RuleClass::Video, r"\.mkv([?#].*)?$", None),
    ("ext:mpd", RuleClass::Video, r"\.mpd([?#].*)?$", Some(StreamKind::Dash)),
    ("path:/dash/", RuleClass::Video, r"/dash/", Some(StreamKind::Dash)),
];

/// Console-script table: plain substring lists, no deny rules.
const CONSOLE_RULES: &[RuleRow] = &[
    ("ext:m3u8", RuleClass::Hls, r"\.m3u8", None),
    ("path:/hls/", RuleClass::Hls, r"/hls/", None),
    ("manifest.m3u8", RuleClass::Hls, r"manifest\.m3u8", None),
    ("keyword:live", RuleClass::Hls, r"live", None),
    ("keyword:stream", RuleClass::Hls, r"stream", None),
    ("scheme:rtmp", RuleClass::Hls, r"rtmp://", None),
    ("scheme:rtsp", RuleClass::Hls, r"rtsp://", None),
    ("scheme:ws", RuleClass::Hls, r"ws://", None),
    ("scheme:wss", RuleClass::Hls, r"wss://", None),
    ("keyword:cdn", RuleClass::Hls, r"cdn", None),
    ("keyword:edge", RuleClass::Hls, r"edge", None),
    ("keyword:origin", RuleClass::Hls, r"origin", None),
    ("keyword:streaming", RuleClass::Hls, r"streaming", None),
    ("ext:mpd", RuleClass::Video, r"\.mpd", Some(StreamKind::Dash)),
    ("path:/dash/", RuleClass::Video, r"/dash/", Some(StreamKind::Dash)),
    ("manifest.mpd", RuleClass::Video, r"manifest\.mpd", Some(StreamKind::Dash)),
    ("ext:mp4", RuleClass::Video, r"\.mp4", None),
    ("ext:webm", RuleClass::Video, r"\.webm", None),
    ("ext:ogg", RuleClass::Video, r"\.ogg", None),
    ("ext:mov", RuleClass::Video, r"\.mov", None),
    ("ext:avi", RuleClass::Video, r"\.avi", None),
    ("ext:mkv", RuleClass::Video, r"\.mkv", None),
    ("ext:flv", RuleClass::Video, r"\.flv", None),
    ("ext:mp3", RuleClass::Video, r"\.mp3", None),
    ("ext:aac", RuleClass::Video, r"\.aac", None),
    ("ext:wav", RuleClass::Video, r"\.wav", None),
    ("ext:flac", RuleClass::Video, r"\.flac", None),
    ("ext:m4a", RuleClass::Video, r"\.m4a", None),
];

fn compile_table(table: &[RuleRow]) -> RuleSet {
    let rules = table
        .iter()
        .map(|&(name, class, pattern, kind)| {
            let rule = PatternRule::new(name, class, pattern)
                .unwrap_or_else(|e| panic!("built-in rule {name} must compile: {e}"));
            match kind {
                Some(kind) => rule.with_kind(kind),
                None => rule,
            }
        })
        .collect();
    RuleSet::from_rules(rules)
}

static CANONICAL: LazyLock<Arc<RuleSet>> = LazyLock::new(|| Arc::new(compile_table(CANONICAL_RULES)));

static CONSOLE: LazyLock<Arc<RuleSet>> = LazyLock::new(|| Arc::new(compile_table(CONSOLE_RULES)));

impl RuleSet {
    /// The canonical built-in table.
    #[must_use]
    pub fn canonical() -> Arc<RuleSet> {
        Arc::clone(&CANONICAL)
    }

    /// The older console-script table, kept for divergence reports.
    #[must_use]
    pub fn console_variant() -> Arc<RuleSet> {
        Arc::clone(&CONSOLE)
    }

    /// Build a set from rules in declaration order.
    #[must_use]
    pub fn from_rules(rules: Vec<PatternRule>) -> Self {
        let mut set = Self { rules };
        set.restore_priority_order();
        set
    }

    /// Append rules. Each lands after every existing rule of its class.
    pub fn extend(&mut self, extra: impl IntoIterator<Item = PatternRule>) {
        self.rules.extend(extra);
        self.restore_priority_order();
    }

    // slice::sort_by_key is stable, which is what keeps declaration order
    fn restore_priority_order(&mut self) {
        self.rules.sort_by_key(|rule| rule.class.priority());
    }

    /// All rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Rules of one class in declaration order.
    pub fn class_rules(&self, class: RuleClass) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |rule| rule.class == class)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compare two tables rule by rule (matched on rule name).
    ///
    /// Entries come out in `self`'s evaluation order, followed by the
    /// rules only `other` has, in `other`'s order.
    #[must_use]
    pub fn divergences(&self, other: &RuleSet) -> Vec<RuleDivergence> {
        let theirs: HashMap<&str, &PatternRule> =
            other.rules.iter().map(|rule| (rule.name(), rule)).collect();
        let ours: HashMap<&str, &PatternRule> =
            self.rules.iter().map(|rule| (rule.name(), rule)).collect();

        let mut report = Vec::new();

        for rule in &self.rules {
            match theirs.get(rule.name()) {
                None => report.push(RuleDivergence::OnlyInOurs {
                    name: rule.name.clone(),
                    class: rule.class,
                }),
                Some(other_rule) if other_rule.class != rule.class => {
                    report.push(RuleDivergence::ClassMismatch {
                        name: rule.name.clone(),
                        ours: rule.class,
                        theirs: other_rule.class,
                    });
                }
                Some(other_rule) if other_rule.pattern() != rule.pattern() => {
                    report.push(RuleDivergence::PatternMismatch {
                        name: rule.name.clone(),
                        ours: rule.pattern().to_string(),
                        theirs: other_rule.pattern().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for rule in &other.rules {
            if !ours.contains_key(rule.name()) {
                report.push(RuleDivergence::OnlyInTheirs {
                    name: rule.name.clone(),
                    class: rule.class,
                });
            }
        }

        report
    }
}
