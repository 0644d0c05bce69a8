use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive;

pub type SubId = usize;

/// Observable, reactive value. Cloning the handle shares the cell.
///
/// Reads under an active observer (a [`crate::Composition`] build pass)
/// register dependency edges, so writes re-run the observers that read the
/// value. Direct subscribers are notified synchronously on every write.
pub struct Signal<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
    id: reactive::SignalId,
}

struct Inner<T> {
    value: T,
    subs: Vec<Option<Box<dyn Fn(&T)>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            id: self.id,
        }
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                subs: Vec::new(),
            })),
            id: reactive::next_signal_id(),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        reactive::register_signal_read(self.id);
        self.inner.borrow().value.clone()
    }

    /// Read without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        reactive::register_signal_read(self.id);
        f(&self.inner.borrow().value)
    }

    pub fn set(&self, v: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = v;
        }
        self.notify();
    }

    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        {
            let mut inner = self.inner.borrow_mut();
            f(&mut inner.value);
        }
        self.notify();
    }

    fn notify(&self) {
        {
            // Immutable borrow while notifying: subscribers may read this
            // signal but must not write it re-entrantly.
            let inner = self.inner.borrow();
            for sub in inner.subs.iter().flatten() {
                sub(&inner.value);
            }
        }
        reactive::signal_changed(self.id);
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubId {
        let mut inner = self.inner.borrow_mut();
        inner.subs.push(Some(Box::new(f)));
        inner.subs.len() - 1
    }

    /// Drop a subscriber. Unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: SubId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.subs.get_mut(id) {
            *slot = None;
        }
    }
}

pub fn signal<T>(t: T) -> Signal<T> {
    Signal::new(t)
}
