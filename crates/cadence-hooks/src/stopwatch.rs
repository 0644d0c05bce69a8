use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, clock, remember_with_key, signal};
use web_time::{Duration, Instant};

const DEFAULT_STOPWATCH_POLL: Duration = Duration::from_millis(50);

/// Running elapsed-time display with start/pause/reset and lap capture.
///
/// Elapsed time is always `accumulated + (now - started_at)`, re-derived from
/// clock reads; the poller only exists to republish it for display.
pub struct Stopwatch {
    elapsed: Signal<Duration>,
    is_running: Signal<bool>,
    laps: Signal<Vec<Duration>>,
    inner: Rc<RefCell<StopwatchInner>>,
}

struct StopwatchInner {
    poll: Duration,
    accumulated: Duration,
    started_at: Option<Instant>,
    ticker: Option<TimerHandle>,
}

impl Clone for Stopwatch {
    fn clone(&self) -> Self {
        Self {
            elapsed: self.elapsed.clone(),
            is_running: self.is_running.clone(),
            laps: self.laps.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl StopwatchInner {
    fn current(&self) -> Duration {
        let running = self
            .started_at
            .map(|t| clock::now().saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.accumulated + running
    }
}

impl Stopwatch {
    pub fn new(poll: Duration) -> Self {
        Self {
            elapsed: signal(Duration::ZERO),
            is_running: signal(false),
            laps: signal(Vec::new()),
            inner: Rc::new(RefCell::new(StopwatchInner {
                poll,
                accumulated: Duration::ZERO,
                started_at: None,
                ticker: None,
            })),
        }
    }

    pub fn start(&self) {
        let poll = {
            let mut inner = self.inner.borrow_mut();
            if inner.started_at.is_some() {
                return;
            }
            inner.started_at = Some(clock::now());
            inner.poll
        };
        let weak = Rc::downgrade(&self.inner);
        let elapsed = self.elapsed.clone();
        let handle = timer::schedule_repeating(poll, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let current = {
                let st = inner.borrow();
                if st.started_at.is_none() {
                    return false;
                }
                st.current()
            };
            elapsed.set(current);
            true
        });
        self.inner.borrow_mut().ticker = Some(handle);
        self.is_running.set(true);
    }

    pub fn pause(&self) {
        let current = {
            let mut inner = self.inner.borrow_mut();
            if inner.started_at.is_none() {
                return;
            }
            inner.accumulated = inner.current();
            inner.started_at = None;
            timer::clear_slot(&mut inner.ticker);
            inner.accumulated
        };
        self.elapsed.set(current);
        self.is_running.set(false);
    }

    pub fn toggle(&self) {
        if self.inner.borrow().started_at.is_some() {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Back to zero. A running stopwatch keeps running from zero.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.accumulated = Duration::ZERO;
            if inner.started_at.is_some() {
                inner.started_at = Some(clock::now());
            }
        }
        self.laps.set(Vec::new());
        self.elapsed.set(Duration::ZERO);
    }

    /// Record the current elapsed time as a lap.
    pub fn lap(&self) {
        let current = self.inner.borrow().current();
        self.laps.update(|laps| laps.push(current));
    }

    /// Elapsed time re-derived from the clock right now.
    pub fn value(&self) -> Duration {
        self.inner.borrow().current()
    }

    pub fn elapsed(&self) -> Signal<Duration> {
        self.elapsed.clone()
    }

    pub fn is_running(&self) -> Signal<bool> {
        self.is_running.clone()
    }

    pub fn laps(&self) -> Signal<Vec<Duration>> {
        self.laps.clone()
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWATCH_POLL)
    }
}

/// Composition hook: remembered per `key`, paused on unmount.
pub fn use_stopwatch(key: impl Into<String>) -> Stopwatch {
    let key = key.into();
    let stopwatch = remember_with_key(format!("stopwatch:{key}"), Stopwatch::default);
    let stopwatch = stopwatch.as_ref().clone();

    crate::install_teardown(format!("stopwatch:{key}:teardown"), {
        let stopwatch = stopwatch.clone();
        move || stopwatch.pause()
    });

    stopwatch
}
