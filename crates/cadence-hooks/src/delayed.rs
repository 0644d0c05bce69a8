use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, remember_with_key, signal};
use web_time::Duration;

/// A signal whose writes land after a delay. A newer pending write replaces
/// an older one; `set_now` bypasses the wait.
pub struct DelayedState<T: Clone + 'static> {
    value: Signal<T>,
    inner: Rc<RefCell<DelayedInner<T>>>,
}

struct DelayedInner<T> {
    delay: Duration,
    pending: Option<T>,
    handle: Option<TimerHandle>,
    generation: u64,
}

impl<T: Clone + 'static> Clone for DelayedState<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> DelayedState<T> {
    pub fn new(initial: T, delay: Duration) -> Self {
        Self {
            value: signal(initial),
            inner: Rc::new(RefCell::new(DelayedInner {
                delay,
                pending: None,
                handle: None,
                generation: 0,
            })),
        }
    }

    /// Schedule `value` to land after the configured delay.
    pub fn set(&self, value: T) {
        let delay = self.inner.borrow().delay;
        self.set_after(value, delay);
    }

    /// Schedule `value` to land after `delay`, replacing any pending write.
    pub fn set_after(&self, value: T, delay: Duration) {
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.pending = Some(value);
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
            inner.generation
        };
        let weak = Rc::downgrade(&self.inner);
        let out = self.value.clone();
        let handle = timer::schedule_once(delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let landed = {
                let mut st = inner.borrow_mut();
                if st.generation != generation {
                    return;
                }
                st.handle = None;
                st.pending.take()
            };
            if let Some(v) = landed {
                out.set(v);
            }
        });
        self.inner.borrow_mut().handle = Some(handle);
    }

    /// Write immediately, dropping any pending delayed write.
    pub fn set_now(&self, value: T) {
        self.cancel_pending();
        self.value.set(value);
    }

    /// Drop the pending write, if any. Idempotent.
    pub fn cancel_pending(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.generation += 1;
        inner.pending = None;
        timer::clear_slot(&mut inner.handle);
    }

    pub fn pending(&self) -> Option<T> {
        self.inner.borrow().pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    pub fn value(&self) -> Signal<T> {
        self.value.clone()
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Applies to writes scheduled after this call.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.borrow_mut().delay = delay;
    }
}

/// Composition hook: remembered per `key`, pending write dropped on unmount.
pub fn use_delayed_state<T: Clone + 'static>(
    key: impl Into<String>,
    initial: T,
    delay: Duration,
) -> DelayedState<T> {
    let key = key.into();
    let delayed = remember_with_key(format!("delayed:{key}"), move || {
        DelayedState::new(initial, delay)
    });
    let delayed = delayed.as_ref().clone();
    delayed.set_delay(delay);

    crate::install_teardown(format!("delayed:{key}:teardown"), {
        let delayed = delayed.clone();
        move || delayed.cancel_pending()
    });

    delayed
}
