use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{clock, remember_with_key};
use web_time::{Duration, Instant};

/// Rate-limited callback: invokes on the leading edge at most once per
/// `interval`, and delivers the latest suppressed argument on the trailing
/// edge so the final call of a burst is never lost.
pub struct Throttle<T: 'static> {
    inner: Rc<RefCell<ThrottleInner<T>>>,
}

struct ThrottleInner<T> {
    interval: Duration,
    callback: Rc<dyn Fn(&T)>,
    last_fire: Option<Instant>,
    trailing: Option<T>,
    handle: Option<TimerHandle>,
}

impl<T: 'static> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Throttle<T> {
    pub fn new(interval: Duration, callback: impl Fn(&T) + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ThrottleInner {
                interval,
                callback: Rc::new(callback),
                last_fire: None,
                trailing: None,
                handle: None,
            })),
        }
    }

    pub fn call(&self, arg: T) {
        let now = clock::now();
        let fire = {
            let mut inner = self.inner.borrow_mut();
            let since = match inner.last_fire {
                Some(t) => now.saturating_duration_since(t),
                None => inner.interval,
            };
            if since >= inner.interval {
                inner.last_fire = Some(now);
                Some((inner.callback.clone(), arg))
            } else {
                inner.trailing = Some(arg);
                if inner.handle.is_none() {
                    let wait = inner.interval - since;
                    let weak = Rc::downgrade(&self.inner);
                    inner.handle = Some(timer::schedule_once(wait, move || {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        let fire = {
                            let mut st = inner.borrow_mut();
                            st.handle = None;
                            match st.trailing.take() {
                                Some(v) => {
                                    st.last_fire = Some(clock::now());
                                    Some((st.callback.clone(), v))
                                }
                                None => None,
                            }
                        };
                        if let Some((cb, v)) = fire {
                            cb(&v);
                        }
                    }));
                }
                None
            }
        };
        if let Some((cb, arg)) = fire {
            cb(&arg);
        }
    }

    /// Drop the trailing call, if any. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.trailing = None;
        timer::clear_slot(&mut inner.handle);
    }

    pub fn has_trailing(&self) -> bool {
        self.inner.borrow().trailing.is_some()
    }

    /// Applies to calls after this one.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.borrow_mut().interval = interval;
    }

    pub fn set_callback(&self, callback: impl Fn(&T) + 'static) {
        self.inner.borrow_mut().callback = Rc::new(callback);
    }
}

/// Composition hook: remembered per `key`, trailing call dropped on unmount.
pub fn use_throttled_callback<T: 'static>(
    key: impl Into<String>,
    interval: Duration,
    callback: impl Fn(&T) + 'static,
) -> Throttle<T> {
    let key = key.into();
    let throttle = remember_with_key(format!("throttle:{key}"), || {
        Throttle::new(interval, |_: &T| {})
    });
    let throttle = throttle.as_ref().clone();

    throttle.set_callback(callback);
    throttle.set_interval(interval);

    crate::install_teardown(format!("throttle:{key}:teardown"), {
        let throttle = throttle.clone();
        move || throttle.cancel()
    });

    throttle
}
