use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, remember_with_key, signal};
use web_time::Duration;

/// Repeating callback with start/stop controls.
pub struct Interval {
    inner: Rc<RefCell<IntervalInner>>,
    is_running: Signal<bool>,
}

struct IntervalInner {
    period: Duration,
    callback: Rc<dyn Fn()>,
    ticker: Option<TimerHandle>,
}

impl Clone for Interval {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            is_running: self.is_running.clone(),
        }
    }
}

impl Interval {
    /// Created stopped; call [`start`](Interval::start).
    pub fn new(period: Duration, callback: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(IntervalInner {
                period,
                callback: Rc::new(callback),
                ticker: None,
            })),
            is_running: signal(false),
        }
    }

    pub fn start(&self) {
        let period = {
            let inner = self.inner.borrow();
            if inner.ticker.is_some() {
                return;
            }
            inner.period
        };
        let weak = Rc::downgrade(&self.inner);
        let handle = timer::schedule_repeating(period, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            // Latest callback wins, even for ticks scheduled long ago.
            let cb = inner.borrow().callback.clone();
            cb();
            true
        });
        self.inner.borrow_mut().ticker = Some(handle);
        self.is_running.set(true);
    }

    pub fn stop(&self) {
        timer::clear_slot(&mut self.inner.borrow_mut().ticker);
        self.is_running.set(false);
    }

    pub fn toggle(&self) {
        if self.inner.borrow().ticker.is_some() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    pub fn is_running(&self) -> Signal<bool> {
        self.is_running.clone()
    }

    /// Applies on the next `start`; a running interval restarts its cadence.
    pub fn set_period(&self, period: Duration) {
        let (changed, running) = {
            let mut inner = self.inner.borrow_mut();
            let changed = inner.period != period;
            inner.period = period;
            (changed, inner.ticker.is_some())
        };
        if changed && running {
            self.restart();
        }
    }

    pub fn set_callback(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().callback = Rc::new(callback);
    }
}

/// Composition hook: remembered per `key`, stopped on unmount. Created
/// stopped; callers start it from an event handler or effect.
pub fn use_interval(
    key: impl Into<String>,
    period: Duration,
    callback: impl Fn() + 'static,
) -> Interval {
    let key = key.into();
    let interval = remember_with_key(format!("interval:{key}"), || {
        Interval::new(period, || {})
    });
    let interval = interval.as_ref().clone();

    interval.set_callback(callback);
    interval.set_period(period);

    crate::install_teardown(format!("interval:{key}:teardown"), {
        let interval = interval.clone();
        move || interval.stop()
    });

    interval
}
