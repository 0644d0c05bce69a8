use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

pub type SignalId = usize;
pub type ObserverId = usize;

thread_local! {
    static CURRENT_OBSERVER: RefCell<Option<ObserverId>> = const { RefCell::new(None) };
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::default());
    static NEXT_SIGNAL: Cell<SignalId> = const { Cell::new(0) };
}

#[derive(Default)]
struct Graph {
    next_observer: ObserverId,
    // signal -> observers that read it during their last run
    dependents: HashMap<SignalId, HashSet<ObserverId>>,
    // observer -> signals it read during its last run
    reads: HashMap<ObserverId, HashSet<SignalId>>,
    observers: HashMap<ObserverId, Rc<dyn Fn()>>,
    running: HashSet<ObserverId>,
}

impl Graph {
    fn clear_reads(&mut self, obs: ObserverId) {
        if let Some(signals) = self.reads.remove(&obs) {
            for sig in signals {
                if let Some(set) = self.dependents.get_mut(&sig) {
                    set.remove(&obs);
                }
            }
        }
    }

    fn remove(&mut self, obs: ObserverId) {
        self.observers.remove(&obs);
        self.clear_reads(obs);
        for set in self.dependents.values_mut() {
            set.remove(&obs);
        }
        self.running.remove(&obs);
    }
}

pub fn next_signal_id() -> SignalId {
    NEXT_SIGNAL.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

/// Record that the currently-running observer (if any) read `sig`.
pub fn register_signal_read(sig: SignalId) {
    CURRENT_OBSERVER.with(|co| {
        if let Some(obs) = *co.borrow() {
            GRAPH.with(|g| {
                let mut g = g.borrow_mut();
                g.dependents.entry(sig).or_default().insert(obs);
                g.reads.entry(obs).or_default().insert(sig);
            });
        }
    });
}

/// Re-run every observer that depends on `sig`. Dependency edges are rebuilt
/// from scratch on each run; an observer already mid-run is skipped rather
/// than recursed into.
pub fn signal_changed(sig: SignalId) {
    GRAPH.with(|gcell| {
        let mut queue: VecDeque<ObserverId> = gcell
            .borrow()
            .dependents
            .get(&sig)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        while let Some(obs) = queue.pop_front() {
            let runnable = {
                let mut g = gcell.borrow_mut();
                if g.running.contains(&obs) {
                    false
                } else {
                    g.running.insert(obs);
                    g.clear_reads(obs);
                    true
                }
            };
            if !runnable {
                continue;
            }
            run_tracked(obs);
            gcell.borrow_mut().running.remove(&obs);
        }
    });
}

fn run_tracked(obs: ObserverId) {
    let f = GRAPH.with(|g| g.borrow().observers.get(&obs).cloned());
    if let Some(f) = f {
        CURRENT_OBSERVER.with(|co| {
            let prev = *co.borrow();
            *co.borrow_mut() = Some(obs);
            f();
            *co.borrow_mut() = prev;
        });
    }
}

pub fn new_observer(f: impl Fn() + 'static) -> ObserverId {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let id = g.next_observer;
        g.next_observer += 1;
        g.observers.insert(id, Rc::new(f));
        id
    })
}

/// Remove an observer and all of its dependency edges.
pub fn remove_observer(id: ObserverId) {
    GRAPH.with(|g| g.borrow_mut().remove(id));
}

/// Run an observer immediately under dependency tracking.
pub fn run_observer_now(id: ObserverId) {
    GRAPH.with(|g| g.borrow_mut().clear_reads(id));
    run_tracked(id);
}
