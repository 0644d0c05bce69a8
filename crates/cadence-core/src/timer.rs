//! # Timer queue
//!
//! The host's scheduling primitive: one-shot and repeating callbacks keyed by
//! generational handles. A run loop calls [`pump_timers`] once per tick;
//! everything due at pump entry fires in deadline order. Timers armed *during*
//! a pump wait for the next pump, which is what gives zero-delay one-shots
//! their "next tick, never same tick" semantics.
//!
//! Handles are [`slotmap`] keys, so cancelling twice, or cancelling a handle
//! whose timer already fired, is an inert no-op. Every exit path that owns a
//! timer clears it through [`clear_slot`] rather than ad hoc.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::clock;

new_key_type! {
    struct TimerKey;
}

/// Handle to a scheduled timer. Copyable; stale handles are inert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle(TimerKey);

enum TimerKind {
    /// Fires once, then the entry is removed.
    Once(Option<Box<dyn FnOnce()>>),
    /// Fires every `period` until cancelled or the callback returns `false`.
    Repeating {
        period: Duration,
        callback: Rc<RefCell<dyn FnMut() -> bool>>,
    },
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    kind: TimerKind,
}

#[derive(Default)]
struct TimerQueue {
    entries: SlotMap<TimerKey, TimerEntry>,
    next_seq: u64,
}

thread_local! {
    static TIMERS: RefCell<TimerQueue> = RefCell::new(TimerQueue::default());
}

/// Schedule `f` to run once, no earlier than `after` from now.
pub fn schedule_once(after: Duration, f: impl FnOnce() + 'static) -> TimerHandle {
    TIMERS.with(|t| {
        let mut q = t.borrow_mut();
        let seq = q.next_seq;
        q.next_seq += 1;
        let key = q.entries.insert(TimerEntry {
            deadline: clock::now() + after,
            seq,
            kind: TimerKind::Once(Some(Box::new(f))),
        });
        TimerHandle(key)
    })
}

/// Schedule `f` to run every `period`. The callback returns whether it wants
/// to keep running; returning `false` removes the timer, so a poller whose
/// owner has gone away cleans itself up.
pub fn schedule_repeating(period: Duration, f: impl FnMut() -> bool + 'static) -> TimerHandle {
    TIMERS.with(|t| {
        let mut q = t.borrow_mut();
        let seq = q.next_seq;
        q.next_seq += 1;
        let key = q.entries.insert(TimerEntry {
            deadline: clock::now() + period,
            seq,
            kind: TimerKind::Repeating {
                period,
                callback: Rc::new(RefCell::new(f)),
            },
        });
        TimerHandle(key)
    })
}

/// Cancel a timer. Safe to call with a handle that already fired, was already
/// cancelled, or belongs to a previous queue generation.
pub fn cancel_timer(handle: TimerHandle) {
    // try_with: cancellation may run from Drop impls during thread teardown.
    let _ = TIMERS.try_with(|t| {
        t.borrow_mut().entries.remove(handle.0);
    });
}

/// Clear an optionally-armed timer slot. The uniform "clear if armed" used by
/// every exit path (manual action, firing, cancellation, teardown).
pub fn clear_slot(slot: &mut Option<TimerHandle>) {
    if let Some(handle) = slot.take() {
        cancel_timer(handle);
    }
}

/// Earliest pending deadline, if any. Lets a run loop sleep instead of spin.
pub fn next_timer_deadline() -> Option<Instant> {
    TIMERS.with(|t| t.borrow().entries.values().map(|e| e.deadline).min())
}

/// Number of timers currently scheduled.
pub fn pending_timer_count() -> usize {
    TIMERS.with(|t| t.borrow().entries.len())
}

enum Fire {
    Once(Box<dyn FnOnce()>),
    Repeating(TimerKey, Rc<RefCell<dyn FnMut() -> bool>>),
}

/// Fire every timer due at pump entry, in deadline order. Returns how many
/// callbacks ran. Timers armed by those callbacks are left for the next pump.
pub fn pump_timers() -> usize {
    let now = clock::now();

    let mut due: SmallVec<[(Instant, u64, TimerKey); 8]> = TIMERS.with(|t| {
        t.borrow()
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(k, e)| (e.deadline, e.seq, k))
            .collect()
    });
    due.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut fired = 0;
    for (_, _, key) in due {
        // Re-check per entry: an earlier callback in this pump may have
        // cancelled it.
        let fire = TIMERS.with(|t| {
            let mut q = t.borrow_mut();
            let is_once = matches!(q.entries.get(key)?.kind, TimerKind::Once(_));
            if is_once {
                let entry = q.entries.remove(key)?;
                match entry.kind {
                    TimerKind::Once(f) => f.map(Fire::Once),
                    TimerKind::Repeating { .. } => None,
                }
            } else {
                let entry = q.entries.get_mut(key)?;
                let (period, callback) = match &entry.kind {
                    TimerKind::Repeating { period, callback } => (*period, callback.clone()),
                    TimerKind::Once(_) => return None,
                };
                // Next deadline re-derived from the wall clock, not from the
                // requested deadline: late pumps must not backlog.
                entry.deadline = clock::now() + period;
                Some(Fire::Repeating(key, callback))
            }
        });

        match fire {
            Some(Fire::Once(f)) => {
                f();
                fired += 1;
            }
            Some(Fire::Repeating(key, callback)) => {
                let keep = (callback.borrow_mut())();
                fired += 1;
                if !keep {
                    let _ = TIMERS.try_with(|t| {
                        t.borrow_mut().entries.remove(key);
                    });
                }
            }
            None => {}
        }
    }
    fired
}

/// Pump repeatedly until no timer is due. Bounded by `max_rounds` so a
/// zero-period repeating timer cannot wedge the loop.
pub fn drain_due_timers(max_rounds: usize) -> usize {
    let mut total = 0;
    for _ in 0..max_rounds {
        let fired = pump_timers();
        if fired == 0 {
            break;
        }
        total += fired;
    }
    total
}
