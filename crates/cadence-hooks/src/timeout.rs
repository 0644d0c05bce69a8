use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, remember_with_key, signal};
use web_time::Duration;

use crate::countdown::Countdown;

/// One-shot callback after a delay, with restart/cancel and a live
/// remaining-time countdown.
pub struct Timeout {
    inner: Rc<RefCell<TimeoutInner>>,
    countdown: Rc<Countdown>,
    is_pending: Signal<bool>,
}

struct TimeoutInner {
    delay: Duration,
    callback: Rc<dyn Fn()>,
    handle: Option<TimerHandle>,
    generation: u64,
}

impl Clone for Timeout {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            countdown: self.countdown.clone(),
            is_pending: self.is_pending.clone(),
        }
    }
}

impl Timeout {
    /// Created idle; call [`start`](Timeout::start).
    pub fn new(delay: Duration, callback: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimeoutInner {
                delay,
                callback: Rc::new(callback),
                handle: None,
                generation: 0,
            })),
            countdown: Rc::new(Countdown::new(crate::countdown::DEFAULT_COUNTDOWN_POLL)),
            is_pending: signal(false),
        }
    }

    /// Arm (or re-arm) the timeout for a full `delay` from now.
    pub fn start(&self) {
        let (delay, generation) = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
            (inner.delay, inner.generation)
        };
        let weak = Rc::downgrade(&self.inner);
        let is_pending = self.is_pending.clone();
        let handle = timer::schedule_once(delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let cb = {
                let mut st = inner.borrow_mut();
                if st.generation != generation {
                    return;
                }
                st.handle = None;
                st.callback.clone()
            };
            is_pending.set(false);
            cb();
        });
        self.inner.borrow_mut().handle = Some(handle);
        self.countdown.arm(delay);
        self.is_pending.set(true);
    }

    pub fn restart(&self) {
        self.start();
    }

    /// Idempotent.
    pub fn cancel(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
        }
        self.countdown.disarm();
        self.is_pending.set(false);
    }

    pub fn is_pending(&self) -> Signal<bool> {
        self.is_pending.clone()
    }

    /// Time left before the callback fires, re-derived from the clock.
    pub fn remaining(&self) -> Duration {
        self.countdown.value()
    }

    pub fn remaining_signal(&self) -> Signal<Duration> {
        self.countdown.remaining()
    }

    /// Applies on the next `start`.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.borrow_mut().delay = delay;
    }

    pub fn set_callback(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().callback = Rc::new(callback);
    }
}

/// Composition hook: remembered per `key`, cancelled on unmount.
pub fn use_timeout(
    key: impl Into<String>,
    delay: Duration,
    callback: impl Fn() + 'static,
) -> Timeout {
    let key = key.into();
    let timeout = remember_with_key(format!("timeout:{key}"), || Timeout::new(delay, || {}));
    let timeout = timeout.as_ref().clone();

    timeout.set_callback(callback);
    timeout.set_delay(delay);

    crate::install_teardown(format!("timeout:{key}:teardown"), {
        let timeout = timeout.clone();
        move || timeout.cancel()
    });

    timeout
}
