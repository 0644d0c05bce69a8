use std::cell::RefCell;
use std::rc::Rc;

/// Single-settlement result cell.
///
/// The callback-driven rendering of "a promise that always settles": the
/// producer calls [`Deferred::settle`] exactly once; consumers attach
/// [`Deferred::on_settled`] callbacks that run on settlement (or immediately,
/// if the value already landed). Settling twice logs and keeps the first
/// result.
pub struct Deferred<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

struct Inner<T, E> {
    result: Option<Result<T, E>>,
    callbacks: Vec<Box<dyn FnOnce(&Result<T, E>)>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Deferred<T, E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                result: None,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().result.is_some()
    }

    /// Settle with `result` and run pending callbacks in registration order.
    pub fn settle(&self, result: Result<T, E>) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.result.is_some() {
                log::warn!("deferred settled twice; keeping the first result");
                return;
            }
            inner.result = Some(result);
            std::mem::take(&mut inner.callbacks)
        };
        for cb in callbacks {
            let inner = self.inner.borrow();
            if let Some(r) = inner.result.as_ref() {
                cb(r);
            }
        }
    }

    /// Run `cb` on settlement; immediately if already settled.
    pub fn on_settled(&self, cb: impl FnOnce(&Result<T, E>) + 'static) {
        {
            let inner = self.inner.borrow();
            if let Some(r) = inner.result.as_ref() {
                cb(r);
                return;
            }
        }
        self.inner.borrow_mut().callbacks.push(Box::new(cb));
    }

    /// Copy of the settled result, if any.
    pub fn peek(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.inner.borrow().result.clone()
    }
}
