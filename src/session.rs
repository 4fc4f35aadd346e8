//! Monitoring session state shared by every observation point.
//!
//! A [`MonitoringSession`] owns the `active` flag, the stream registry,
//! the listeners and the run statistics. The embedder owns the session
//! and hands clones of it to interceptors, the DOM scanner and the sweep
//! timer. Nothing is looked up through global state. [`PageContext`]
//! holds at most one session per page.
//!
//! All observation paths funnel into [`MonitoringSession::observe`]:
//!
//! ```text
//! inactive? ─yes─▶ suppressed
//!    │no
//! known URL? ─yes─▶ duplicate (no reclassification)
//!    │no
//! classify ─None─▶ ignored
//!    │kind
//! registry.insert ─▶ Inserted ─▶ listeners
//!                 └▶ Rejected(duplicate | capacity)
//! ```

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::classify::{Classifier, StreamKind, Verdict};
use crate::config::WatchConfig;
use crate::error::Result;
use crate::interceptor::{
    panic_message, Fetch, InstallOutcome, Intercepted, Observer, XhrOpen,
};
use crate::registry::{DiscoverySource, InsertOutcome, RejectReason, StreamRecord, StreamRegistry};
use crate::title::{truncate_url, DEFAULT_LOG_URL_MAX_LEN};

/// Callback invoked with every newly inserted record
pub type Listener = Arc<dyn Fn(&StreamRecord) + Send + Sync>;

/// Snapshot of a session's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since the last `start`; zero while stopped.
    pub uptime_secs: u64,
    /// Candidates seen while active.
    pub observed: u64,
    /// Candidates dropped because the session was stopped.
    pub suppressed: u64,
    /// Candidates the classifier accepted.
    pub classified: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub capacity_rejections: u64,
    /// Caught DOM and listener failures.
    pub errors: u64,
    pub streams: usize,
    pub max_streams: usize,
    /// Stream count per kind.
    pub by_kind: BTreeMap<String, usize>,
    /// Stream count per host; `unknown` for URLs without one.
    pub by_domain: BTreeMap<String, usize>,
}

#[derive(Default)]
struct Counters {
    observed: AtomicU64,
    suppressed: AtomicU64,
    classified: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    capacity_rejections: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        for counter in [
            &self.observed,
            &self.suppressed,
            &self.classified,
            &self.inserted,
            &self.duplicates,
            &self.capacity_rejections,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

struct SessionInner {
    active: AtomicBool,
    classifier: Classifier,
    registry: Mutex<StreamRegistry>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    listeners: Mutex<Vec<Listener>>,
    counters: Counters,
    fetch_installed: AtomicBool,
    xhr_installed: AtomicBool,
    log_url_max_len: usize,
}

/// Shared handle to one page's monitoring state
///
/// Clones are cheap and refer to the same session. A new session starts
/// stopped.
#[derive(Clone)]
pub struct MonitoringSession {
    inner: Arc<SessionInner>,
}

impl MonitoringSession {
    /// Session with default capacity and the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_classifier(Classifier::new(), StreamRegistry::default())
    }

    #[must_use]
    pub fn with_capacity(max_streams: usize) -> Self {
        Self::with_classifier(Classifier::new(), StreamRegistry::new(max_streams))
    }

    #[must_use]
    pub fn with_classifier(classifier: Classifier, registry: StreamRegistry) -> Self {
        Self::build(classifier, registry, DEFAULT_LOG_URL_MAX_LEN)
    }

    /// Build a session from validated configuration.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        config.validate()?;
        let classifier = Classifier::with_rules(Arc::new(config.rule_set()?));
        let registry =
            StreamRegistry::new(config.max_streams).with_title_max_len(config.title_max_len);
        Ok(Self::build(classifier, registry, config.log_url_max_len))
    }

    fn build(classifier: Classifier, registry: StreamRegistry, log_url_max_len: usize) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                active: AtomicBool::new(false),
                classifier,
                registry: Mutex::new(registry),
                started_at: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                counters: Counters::default(),
                fetch_installed: AtomicBool::new(false),
                xhr_installed: AtomicBool::new(false),
                log_url_max_len,
            }),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Stopped → Active. Returns `false` if already active.
    pub fn start(&self) -> bool {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            warn!("Monitoring already active");
            return false;
        }
        *lock(&self.inner.started_at) = Some(Utc::now());
        info!("Monitoring started");
        true
    }

    /// Active → Stopped. Returns `false` if already stopped.
    ///
    /// Records already discovered are kept.
    pub fn stop(&self) -> bool {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            warn!("Monitoring not active");
            return false;
        }
        info!(streams = self.len(), "Monitoring stopped");
        true
    }

    /// Flip between active and stopped, returning the new state.
    pub fn toggle(&self) -> bool {
        if self.is_active() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    // ─── Observation ─────────────────────────────────────────────────────

    /// Report a candidate URL.
    ///
    /// Returns `None` when the session is stopped or the URL is not a
    /// stream, otherwise the registry's verdict.
    pub fn observe(&self, url: &str, source: DiscoverySource) -> Option<InsertOutcome> {
        let counters = &self.inner.counters;
        if !self.is_active() {
            Counters::bump(&counters.suppressed);
            return None;
        }
        Counters::bump(&counters.observed);

        if self.registry().contains(url) {
            Counters::bump(&counters.duplicates);
            return Some(InsertOutcome::Rejected(RejectReason::Duplicate));
        }

        let kind = match self.inner.classifier.explain(url) {
            Verdict::Matched { kind, rule } => {
                debug!(rule, %source, "Matched {}", self.short(url));
                kind
            }
            Verdict::Blocked { rule } => {
                debug!(rule, %source, "Blocked {}", self.short(url));
                return None;
            }
            Verdict::Unmatched | Verdict::Malformed => return None,
        };
        Counters::bump(&counters.classified);

        let outcome = self.registry().insert_from(url, kind, source);
        match &outcome {
            InsertOutcome::Inserted(record) => {
                Counters::bump(&counters.inserted);
                info!(kind = %record.kind, %source, "New stream: {}", self.short(url));
                self.notify(record);
            }
            InsertOutcome::Rejected(RejectReason::Duplicate) => {
                Counters::bump(&counters.duplicates);
            }
            InsertOutcome::Rejected(RejectReason::Capacity) => {
                Counters::bump(&counters.capacity_rejections);
                warn!("Registry full; dropped {}", self.short(url));
            }
        }
        Some(outcome)
    }

    /// Callback feeding intercepted request URLs into this session.
    #[must_use]
    pub fn observer(&self) -> Observer {
        let session = self.clone();
        Arc::new(move |url: &str, source: DiscoverySource| {
            session.observe(url, source);
        })
    }

    /// Count a caught failure from an observation path.
    pub fn record_error(&self) {
        Counters::bump(&self.inner.counters.errors);
    }

    /// Register a listener for newly inserted records.
    pub fn subscribe(&self, listener: impl Fn(&StreamRecord) + Send + Sync + 'static) {
        lock(&self.inner.listeners).push(Arc::new(listener));
    }

    fn notify(&self, record: &StreamRecord) {
        // Run listeners outside the listener lock so they may subscribe
        // or query the session.
        let listeners: Vec<Listener> = lock(&self.inner.listeners).clone();
        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(record)));
            if let Err(payload) = outcome {
                self.record_error();
                error!("Stream listener failed: {}", panic_message(payload.as_ref()));
            }
        }
    }

    // ─── Interceptor installation ────────────────────────────────────────

    /// Install this session's observer into a fetch slot, at most once per
    /// session.
    pub fn install_fetch<F: Fetch>(&self, slot: &mut Intercepted<F>) -> InstallOutcome {
        self.install_guarded(&self.inner.fetch_installed, |observer| slot.install(observer))
    }

    /// Install this session's observer into an XHR `open` slot, at most
    /// once per session.
    pub fn install_xhr<X: XhrOpen>(&self, slot: &mut Intercepted<X>) -> InstallOutcome {
        self.install_guarded(&self.inner.xhr_installed, |observer| slot.install(observer))
    }

    /// Remove the observer from `slot`. The install guard is released only
    /// if the slot was actually observing.
    pub fn uninstall_fetch<F>(&self, slot: &mut Intercepted<F>) -> bool {
        Self::uninstall_guarded(&self.inner.fetch_installed, slot)
    }

    pub fn uninstall_xhr<X>(&self, slot: &mut Intercepted<X>) -> bool {
        Self::uninstall_guarded(&self.inner.xhr_installed, slot)
    }

    fn uninstall_guarded<P>(flag: &AtomicBool, slot: &mut Intercepted<P>) -> bool {
        let removed = slot.uninstall();
        if removed {
            flag.store(false, Ordering::SeqCst);
        } else {
            debug!("Slot was not observed; install guard kept");
        }
        removed
    }

    fn install_guarded(
        &self,
        flag: &AtomicBool,
        install: impl FnOnce(Observer) -> InstallOutcome,
    ) -> InstallOutcome {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Session interceptor already installed");
            return InstallOutcome::AlreadyInstalled;
        }

        let outcome = install(self.observer());
        if outcome != InstallOutcome::Installed {
            flag.store(false, Ordering::SeqCst);
        }
        outcome
    }

    // ─── Catalog ─────────────────────────────────────────────────────────

    /// Classify without recording anything.
    #[must_use]
    pub fn classify(&self, url: &str) -> Option<StreamKind> {
        self.inner.classifier.classify(url)
    }

    #[must_use]
    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    /// Insertion-ordered snapshot of the catalog.
    #[must_use]
    pub fn list(&self) -> Vec<StreamRecord> {
        self.registry().list().cloned().collect()
    }

    #[must_use]
    pub fn search(&self, keyword: &str) -> Vec<StreamRecord> {
        self.registry().search(keyword).cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.registry().contains(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Empty the catalog and reset counters. The active state is kept.
    pub fn clear(&self) {
        self.registry().clear();
        self.inner.counters.reset();
        info!("Stream list cleared");
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let active = self.is_active();
        let started_at = *lock(&self.inner.started_at);
        let uptime_secs = match (active, started_at) {
            (true, Some(started)) => {
                u64::try_from((Utc::now() - started).num_seconds()).unwrap_or(0)
            }
            _ => 0,
        };

        let (streams, max_streams, by_kind, by_domain) = {
            let registry = self.registry();
            let mut by_kind = BTreeMap::new();
            let mut by_domain = BTreeMap::new();
            for record in registry.list() {
                *by_kind.entry(record.kind.as_str().to_string()).or_insert(0) += 1;
                *by_domain.entry(domain_of(&record.url)).or_insert(0) += 1;
            }
            (registry.len(), registry.max_streams(), by_kind, by_domain)
        };

        let counters = &self.inner.counters;
        SessionStats {
            active,
            started_at,
            uptime_secs,
            observed: Counters::read(&counters.observed),
            suppressed: Counters::read(&counters.suppressed),
            classified: Counters::read(&counters.classified),
            inserted: Counters::read(&counters.inserted),
            duplicates: Counters::read(&counters.duplicates),
            capacity_rejections: Counters::read(&counters.capacity_rejections),
            errors: Counters::read(&counters.errors),
            streams,
            max_streams,
            by_kind,
            by_domain,
        }
    }

    fn registry(&self) -> MutexGuard<'_, StreamRegistry> {
        lock(&self.inner.registry)
    }

    fn short(&self, url: &str) -> String {
        truncate_url(url, self.inner.log_url_max_len)
    }
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self::new()
    }
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holder for a page's single session
#[derive(Default)]
pub struct PageContext {
    session: OnceLock<MonitoringSession>,
}

impl PageContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the page's session on first call. Later calls return the
    /// existing session and never run `make`.
    pub fn init(&self, make: impl FnOnce() -> MonitoringSession) -> &MonitoringSession {
        let mut created = false;
        let session = self.session.get_or_init(|| {
            created = true;
            make()
        });
        if !created {
            debug!("Session already initialised for this page");
        }
        session
    }

    #[must_use]
    pub fn session(&self) -> Option<&MonitoringSession> {
        self.session.get()
    }
}
