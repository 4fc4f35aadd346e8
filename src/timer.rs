//! Fixed-interval timer capability.
//!
//! The periodic full sweep needs a timer that can be armed on `start` and
//! must be cancelled on `stop`. [`TokioTimer`] runs ticks on a tokio
//! runtime; [`ManualTimer`] fires only when the host calls
//! [`ManualTimer::tick`], for hosts that drive their own event loop.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Callback run on every tick
pub type TickFn = Box<dyn FnMut() + Send>;

/// Something that can call a function every `period`
pub trait IntervalTimer {
    /// Arm a repeating timer. The first call happens one `period` from now.
    fn every(&self, period: Duration, tick: TickFn) -> TimerHandle;
}

/// Cancels its timer on [`TimerHandle::cancel`] or drop
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, task }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Interval timer backed by `tokio::time::interval`
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Timer on the runtime of the calling context, if there is one.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl IntervalTimer for TokioTimer {
    fn every(&self, period: Duration, mut tick: TickFn) -> TimerHandle {
        let period = period.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() completes its first tick immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                tick();
            }
        });

        TimerHandle::new(cancelled, Some(task))
    }
}

type ManualEntry = (Arc<AtomicBool>, TickFn);

/// Host-driven timer: callbacks run only from [`ManualTimer::tick`]
///
/// The period is ignored; each `tick` fires every armed callback once.
#[derive(Clone, Default)]
pub struct ManualTimer {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every live callback once. Returns how many ran.
    pub fn tick(&self) -> usize {
        let mut due = mem::take(&mut *self.lock());
        due.retain(|(cancelled, _)| !cancelled.load(Ordering::SeqCst));
        for (_, tick) in &mut due {
            tick();
        }
        let fired = due.len();

        // Callbacks may have armed new timers meanwhile
        let mut entries = self.lock();
        due.append(&mut entries);
        *entries = due;
        fired
    }

    /// Number of armed, uncancelled callbacks.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(cancelled, _)| !cancelled.load(Ordering::SeqCst))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ManualEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IntervalTimer for ManualTimer {
    fn every(&self, _period: Duration, tick: TickFn) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.lock().push((Arc::clone(&cancelled), tick));
        TimerHandle::new(cancelled, None)
    }
}
