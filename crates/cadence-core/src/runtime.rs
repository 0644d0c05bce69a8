use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::reactive::{self, ObserverId};
use crate::scope::Scope;

thread_local! {
    pub static COMPOSER: RefCell<Composer> = RefCell::new(Composer::default());
}

/// Slot storage backing the `remember*` family. One composer per thread; the
/// Nth order-based call in a build pass always refers to the Nth stored value,
/// keyed calls are stable across conditional branches.
#[derive(Default)]
pub struct Composer {
    pub slots: Vec<Box<dyn Any>>,
    pub cursor: usize,
    pub keyed_slots: HashMap<String, Box<dyn Any>>,
}

impl Composer {
    pub fn reset_for_build(&mut self) {
        self.cursor = 0;
    }

    /// Drop every stored slot. Used between independent compositions and by
    /// tests that reuse the thread.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
        self.keyed_slots.clear();
    }
}

/// Slot-based remember (sequential composition only).
pub fn remember<T: 'static>(init: impl FnOnce() -> T) -> Rc<T> {
    COMPOSER.with(|c| {
        let mut c = c.borrow_mut();
        let cursor = c.cursor;
        c.cursor += 1;

        if cursor >= c.slots.len() {
            let rc: Rc<T> = Rc::new(init());
            c.slots.push(Box::new(rc.clone()));
            return rc;
        }

        if let Some(rc) = c.slots[cursor].downcast_ref::<Rc<T>>() {
            rc.clone()
        } else {
            log::warn!(
                "remember: slot {} type changed; replacing. \
                 If this is due to conditional composition, prefer remember_with_key.",
                cursor
            );
            let rc: Rc<T> = Rc::new(init());
            c.slots[cursor] = Box::new(rc.clone());
            rc
        }
    })
}

/// Key-based remember.
pub fn remember_with_key<T: 'static>(key: impl Into<String>, init: impl FnOnce() -> T) -> Rc<T> {
    COMPOSER.with(|c| {
        let mut c = c.borrow_mut();
        let key = key.into();

        if let Some(existing) = c.keyed_slots.get(&key) {
            if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
                return rc.clone();
            } else {
                log::warn!(
                    "remember_with_key: key '{}' reused with a different type; replacing.",
                    key
                );
            }
        }

        let rc: Rc<T> = Rc::new(init());
        c.keyed_slots.insert(key, Box::new(rc.clone()));
        rc
    })
}

pub fn remember_state<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    remember(|| RefCell::new(init()))
}

pub fn remember_state_with_key<T: 'static>(
    key: impl Into<String>,
    init: impl FnOnce() -> T,
) -> Rc<RefCell<T>> {
    remember_with_key(key, || RefCell::new(init()))
}

/// The reactive host collaborator: holds the build closure, re-runs it when a
/// signal it read changes, and runs teardown callbacks exactly once.
///
/// The root scope persists across recompositions: `on_unmount` means the
/// composition went away, not that a new build pass started. Hooks created
/// during any build pass register their cleanup here.
pub struct Composition {
    scope: Scope,
    observer: ObserverId,
}

impl Composition {
    /// Build once, tracking signal reads; future writes to those signals
    /// recompose automatically.
    pub fn new(build: impl FnMut() + 'static) -> Self {
        let scope = Scope::new();
        let build = Rc::new(RefCell::new(build));
        let observer = {
            let scope = scope.clone();
            reactive::new_observer(move || {
                COMPOSER.with(|c| c.borrow_mut().reset_for_build());
                let build = build.clone();
                scope.run(move || (build.borrow_mut())());
            })
        };
        reactive::run_observer_now(observer);
        Composition { scope, observer }
    }

    /// Force a build pass outside the signal graph.
    pub fn recompose(&self) {
        reactive::run_observer_now(self.observer);
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Tear down: stop observing and run every registered cleanup.
    pub fn dispose(self) {
        reactive::remove_observer(self.observer);
        self.scope.dispose();
    }
}
