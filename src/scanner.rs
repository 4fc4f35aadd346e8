//! DOM scanning: incremental, media-event and full-sweep modes.
//!
//! Every candidate URL found here goes through
//! [`MonitoringSession::observe`], the same path intercepted requests take.
//! A single pass never offers the same string twice, and the session
//! skips URLs it already knows, so overlapping modes cost little.
//!
//! Read failures are per node: the failing read is logged and counted,
//! and the walk moves on.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::dom::{Document, DomElement, DomError};
use crate::registry::DiscoverySource;
use crate::script_probe;
use crate::session::MonitoringSession;

/// `data-*` attributes that commonly carry a stream URL. Relative values
/// resolve against the document base like `src`.
pub const DATA_ATTRIBUTES: [&str; 4] = ["data-src", "data-url", "data-hls", "data-m3u8"];

/// Media element events worth inspecting.
pub const MEDIA_EVENTS: [&str; 4] = ["loadstart", "loadedmetadata", "playing", "canplay"];

const MEDIA_SELECTOR: &str = "video, audio, source";
const ANCHOR_SELECTOR: &str = "a[href]";
const DATA_SELECTOR: &str = "[data-src], [data-url], [data-hls], [data-m3u8]";
const IFRAME_SELECTOR: &str = "iframe[src]";
const SCRIPT_SELECTOR: &str = "script[src]";
const INLINE_SCRIPT_SELECTOR: &str = "script:not([src])";
const PLAYER_SELECTOR: &str = r#"[class*="player"], [class*="video"], [class*="media"]"#;

/// Outcome of one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Distinct candidate strings offered to the session.
    pub candidates: usize,
    /// Candidates that became new records.
    pub inserted: usize,
    /// Node reads that failed and were skipped.
    pub errors: usize,
}

/// Scanner bound to one session
#[derive(Clone)]
pub struct DomScanner {
    session: MonitoringSession,
}

impl DomScanner {
    #[must_use]
    pub fn new(session: MonitoringSession) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &MonitoringSession {
        &self.session
    }

    /// Inspect a newly inserted subtree, depth-first pre-order.
    pub fn on_insertion<E: DomElement>(&self, root: &E) -> SweepSummary {
        self.on_mutations([root])
    }

    /// Inspect one batch of inserted subtrees.
    pub fn on_mutations<'e, E, I>(&self, inserted: I) -> SweepSummary
    where
        E: DomElement + 'e,
        I: IntoIterator<Item = &'e E>,
    {
        if !self.session.is_active() {
            return SweepSummary::default();
        }

        let mut pass = ScanPass::new(&self.session, DiscoverySource::Mutation);
        for root in inserted {
            pass.subtree(root);
        }
        pass.finish()
    }

    /// Inspect a media element that fired `event`.
    ///
    /// Only [`MEDIA_EVENTS`] on `video` and `audio` elements are handled.
    pub fn on_media_event<E: DomElement>(&self, event: &str, element: &E) -> SweepSummary {
        if !self.session.is_active() || !MEDIA_EVENTS.contains(&event) {
            return SweepSummary::default();
        }
        if !matches!(element.tag_name().as_str(), "video" | "audio") {
            return SweepSummary::default();
        }

        let mut pass = ScanPass::new(&self.session, DiscoverySource::MediaEvent);
        pass.offer_property(element, "currentSrc");
        pass.offer_property(element, "src");
        pass.finish()
    }

    /// Re-walk the whole document.
    pub fn full_sweep<D: Document>(&self, document: &D) -> SweepSummary {
        if !self.session.is_active() {
            return SweepSummary::default();
        }

        let mut pass = ScanPass::new(&self.session, DiscoverySource::Sweep);

        for element in pass.query(document, MEDIA_SELECTOR) {
            pass.media_element(&element);
        }
        for anchor in pass.query(document, ANCHOR_SELECTOR) {
            pass.offer_property(&anchor, "href");
        }
        for element in pass.query(document, DATA_SELECTOR) {
            pass.data_attributes(&element);
        }
        for frame in pass.query(document, IFRAME_SELECTOR) {
            pass.offer_property(&frame, "src");
        }
        for script in pass.query(document, SCRIPT_SELECTOR) {
            pass.offer_property(&script, "src");
        }
        for element in pass.query(document, PLAYER_SELECTOR) {
            pass.http_attributes(&element);
        }
        for script in pass.query(document, INLINE_SCRIPT_SELECTOR) {
            for hit in script_probe::probe(&script.text(), document.base_url()) {
                pass.offer(&hit.url);
            }
        }

        let summary = pass.finish();
        debug!(
            candidates = summary.candidates,
            inserted = summary.inserted,
            errors = summary.errors,
            "Full sweep done"
        );
        summary
    }
}

/// State of a single scan call
struct ScanPass<'s> {
    session: &'s MonitoringSession,
    source: DiscoverySource,
    seen: HashSet<String>,
    summary: SweepSummary,
}

impl<'s> ScanPass<'s> {
    fn new(session: &'s MonitoringSession, source: DiscoverySource) -> Self {
        Self {
            session,
            source,
            seen: HashSet::new(),
            summary: SweepSummary::default(),
        }
    }

    fn finish(self) -> SweepSummary {
        self.summary
    }

    fn offer(&mut self, candidate: &str) {
        let candidate = candidate.trim();
        if candidate.is_empty() || !self.seen.insert(candidate.to_string()) {
            return;
        }
        self.summary.candidates += 1;

        if let Some(outcome) = self.session.observe(candidate, self.source) {
            if outcome.inserted() {
                self.summary.inserted += 1;
            }
        }
    }

    fn read<T>(&mut self, what: &str, result: Result<T, DomError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(source = %self.source, "Skipping {}: {}", what, e);
                self.summary.errors += 1;
                self.session.record_error();
                None
            }
        }
    }

    fn query<'d, D: Document>(&mut self, document: &'d D, selector: &str) -> Vec<D::Element<'d>> {
        self.read(selector, document.query_all(selector))
            .unwrap_or_default()
    }

    fn offer_property<E: DomElement>(&mut self, element: &E, name: &str) {
        if let Some(Some(url)) = self.read(name, element.url_property(name)) {
            self.offer(&url);
        }
    }

    fn data_attributes<E: DomElement>(&mut self, element: &E) {
        for name in DATA_ATTRIBUTES {
            self.offer_property(element, name);
        }
    }

    /// `src`, `currentSrc` and, for `video`/`audio`, nested `source` children.
    fn media_element<E: DomElement>(&mut self, element: &E) {
        self.offer_property(element, "src");
        self.offer_property(element, "currentSrc");

        if matches!(element.tag_name().as_str(), "video" | "audio") {
            for source in element.descendants_by_tag("source") {
                self.offer_property(&source, "src");
            }
        }
    }

    /// Any attribute value that looks like it holds an HTTP URL.
    fn http_attributes<E: DomElement>(&mut self, element: &E) {
        let Some(attributes) = self.read("attributes", element.attributes()) else {
            return;
        };
        for (_, value) in attributes {
            if value.contains("http") {
                self.offer(&value);
            }
        }
    }

    fn element<E: DomElement>(&mut self, element: &E) {
        let tag = element.tag_name();
        match tag.as_str() {
            "video" | "audio" | "source" => self.media_element(element),
            "a" => self.offer_property(element, "href"),
            _ => {}
        }

        if self.read("src", element.has_attribute("src")) == Some(true) {
            self.offer_property(element, "src");
        }
        self.data_attributes(element);
    }

    fn subtree<E: DomElement>(&mut self, root: &E) {
        self.element(root);

        let mut stack = root.children();
        stack.reverse();
        while let Some(node) = stack.pop() {
            self.element(&node);
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
    }
}
