use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, remember_state_with_key, remember_with_key, signal};
use web_time::Duration;

/// Trailing-edge debounced value: the output settles to the most recent input
/// once `delay` has passed without another feed.
pub struct Debounced<T: Clone + 'static> {
    value: Signal<T>,
    inner: Rc<RefCell<DebouncedInner<T>>>,
}

struct DebouncedInner<T> {
    delay: Duration,
    pending: Option<T>,
    handle: Option<TimerHandle>,
    generation: u64,
}

impl<T: Clone + 'static> Clone for Debounced<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Debounced<T> {
    pub fn new(initial: T, delay: Duration) -> Self {
        Self {
            value: signal(initial),
            inner: Rc::new(RefCell::new(DebouncedInner {
                delay,
                pending: None,
                handle: None,
                generation: 0,
            })),
        }
    }

    /// Feed a new input; the quiet-period timer re-arms from now.
    pub fn feed(&self, value: T) {
        let (delay, generation) = {
            let mut inner = self.inner.borrow_mut();
            inner.pending = Some(value);
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
            (inner.delay, inner.generation)
        };
        let weak = Rc::downgrade(&self.inner);
        let out = self.value.clone();
        let handle = timer::schedule_once(delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let settled = {
                let mut st = inner.borrow_mut();
                if st.generation != generation {
                    return;
                }
                st.handle = None;
                st.pending.take()
            };
            if let Some(v) = settled {
                out.set(v);
            }
        });
        self.inner.borrow_mut().handle = Some(handle);
    }

    /// Settle the pending input immediately.
    pub fn flush(&self) {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
            inner.pending.take()
        };
        if let Some(v) = settled {
            self.value.set(v);
        }
    }

    /// Drop the pending input without settling it. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.generation += 1;
        inner.pending = None;
        timer::clear_slot(&mut inner.handle);
    }

    pub fn value(&self) -> Signal<T> {
        self.value.clone()
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Applies to feeds after this call.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.borrow_mut().delay = delay;
    }
}

/// Composition hook: returns a signal that trails `input` by `delay`. Feeds
/// happen automatically whenever the composed-in `input` differs from the
/// previous build pass.
pub fn use_debounced_value<T: Clone + PartialEq + 'static>(
    key: impl Into<String>,
    input: T,
    delay: Duration,
) -> Signal<T> {
    let key = key.into();
    let debounced = remember_with_key(format!("debounce:{key}"), {
        let input = input.clone();
        move || Debounced::new(input, delay)
    });
    let debounced = debounced.as_ref().clone();
    debounced.set_delay(delay);

    let last_input = remember_state_with_key(format!("debounce:{key}:last"), {
        let input = input.clone();
        move || input
    });
    let changed = *last_input.borrow() != input;
    if changed {
        *last_input.borrow_mut() = input.clone();
        debounced.feed(input);
    }

    crate::install_teardown(format!("debounce:{key}:teardown"), {
        let debounced = debounced.clone();
        move || debounced.cancel()
    });

    debounced.value()
}
