//! Consumer-facing facade over a monitoring session.
//!
//! [`StreamMonitor`] is what a presentation layer (panel, console, CLI)
//! talks to. Besides the session's catalog operations it owns the
//! periodic full sweep: `start` arms the timer and sweeps once right away,
//! `stop` cancels the timer so nothing keeps running after the session
//! ends.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error};
use url::Url;

use crate::classify::StreamKind;
use crate::dom::HtmlPage;
use crate::interceptor::panic_message;
use crate::registry::StreamRecord;
use crate::scanner::{DomScanner, SweepSummary};
use crate::session::{MonitoringSession, SessionStats};
use crate::timer::{IntervalTimer, TimerHandle};

/// What the sweep timer scans on every tick
pub trait SweepSource: Send + Sync {
    fn sweep(&self, scanner: &DomScanner) -> SweepSummary;
}

/// Latest HTML of a page, swept on every tick
///
/// A fetch loop calls [`HtmlSnapshot::update`]; the timer parses whatever
/// is current. Clones share the same snapshot.
#[derive(Clone, Default)]
pub struct HtmlSnapshot {
    latest: Arc<Mutex<Option<(String, Option<Url>)>>>,
}

impl HtmlSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, html: impl Into<String>, base: Option<Url>) {
        *self.lock() = Some((html.into(), base));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<(String, Option<Url>)>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SweepSource for HtmlSnapshot {
    fn sweep(&self, scanner: &DomScanner) -> SweepSummary {
        let Some((html, base)) = self.lock().clone() else {
            return SweepSummary::default();
        };
        scanner.full_sweep(&HtmlPage::parse(&html, base))
    }
}

/// Session, scanner and sweep timer behind one handle
pub struct StreamMonitor<T: IntervalTimer> {
    scanner: DomScanner,
    source: Arc<dyn SweepSource>,
    timer: T,
    interval: Duration,
    sweep_timer: Mutex<Option<TimerHandle>>,
}

impl<T: IntervalTimer> StreamMonitor<T> {
    pub fn new(
        session: MonitoringSession,
        timer: T,
        source: Arc<dyn SweepSource>,
        interval: Duration,
    ) -> Self {
        Self {
            scanner: DomScanner::new(session),
            source,
            timer,
            interval,
            sweep_timer: Mutex::new(None),
        }
    }

    /// Activate monitoring and arm the sweep timer.
    ///
    /// Idempotent: returns `false` and changes nothing if already active.
    pub fn start(&self) -> bool {
        let started = self.session().start();

        let armed = {
            let mut slot = self.sweep_slot();
            if slot.is_none() {
                *slot = Some(self.timer.every(self.interval, self.tick_fn()));
                true
            } else {
                false
            }
        };

        if armed {
            debug!(interval = ?self.interval, "Sweep timer armed");
            self.sweep_now();
        }
        started
    }

    /// Deactivate monitoring and cancel the sweep timer.
    ///
    /// Discovered streams are kept. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        if let Some(handle) = self.sweep_slot().take() {
            handle.cancel();
            debug!("Sweep timer cancelled");
        }
        self.session().stop()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session().is_active()
    }

    #[must_use]
    pub fn classify(&self, url: &str) -> Option<StreamKind> {
        self.session().classify(url)
    }

    #[must_use]
    pub fn list(&self) -> Vec<StreamRecord> {
        self.session().list()
    }

    pub fn clear(&self) {
        self.session().clear();
    }

    #[must_use]
    pub fn search(&self, keyword: &str) -> Vec<StreamRecord> {
        self.session().search(keyword)
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.session().stats()
    }

    /// Call `listener` with every newly inserted record.
    pub fn subscribe(&self, listener: impl Fn(&StreamRecord) + Send + Sync + 'static) {
        self.session().subscribe(listener);
    }

    /// Run one full sweep outside the timer.
    pub fn sweep_now(&self) -> SweepSummary {
        run_sweep(self.source.as_ref(), &self.scanner)
    }

    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweep_slot().is_some()
    }

    #[must_use]
    pub fn scanner(&self) -> &DomScanner {
        &self.scanner
    }

    #[must_use]
    pub fn session(&self) -> &MonitoringSession {
        self.scanner.session()
    }

    fn tick_fn(&self) -> Box<dyn FnMut() + Send> {
        let scanner = self.scanner.clone();
        let source = Arc::clone(&self.source);
        Box::new(move || {
            run_sweep(source.as_ref(), &scanner);
        })
    }

    fn sweep_slot(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.sweep_timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_sweep(source: &dyn SweepSource, scanner: &DomScanner) -> SweepSummary {
    match panic::catch_unwind(AssertUnwindSafe(|| source.sweep(scanner))) {
        Ok(summary) => summary,
        Err(payload) => {
            scanner.session().record_error();
            error!("Sweep failed: {}", panic_message(payload.as_ref()));
            SweepSummary::default()
        }
    }
}
