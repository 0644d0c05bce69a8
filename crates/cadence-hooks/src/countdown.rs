use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, clock, signal};
use web_time::{Duration, Instant};

/// Default poll cadence for countdown display. Finer-grained than the delays
/// it projects, so "retrying in Xs" ticks smoothly; never the authority on
/// expiry, which is always the owner's own one-shot timer.
pub const DEFAULT_COUNTDOWN_POLL: Duration = Duration::from_millis(100);

/// Live "time remaining" projector.
///
/// Armed with a duration, it publishes `max(0, deadline - now())` into a
/// signal on every poll until it reaches zero or is disarmed. Each tick
/// re-checks liveness through a generation stamp, so a poller armed before a
/// re-arm or disarm can never publish stale values.
pub struct Countdown {
    remaining: Signal<Duration>,
    inner: Rc<RefCell<CountdownInner>>,
}

struct CountdownInner {
    poll: Duration,
    deadline: Option<Instant>,
    ticker: Option<TimerHandle>,
    generation: u64,
}

impl Countdown {
    pub fn new(poll: Duration) -> Self {
        Self {
            remaining: signal(Duration::ZERO),
            inner: Rc::new(RefCell::new(CountdownInner {
                poll,
                deadline: None,
                ticker: None,
                generation: 0,
            })),
        }
    }

    /// Signal carrying the projected remaining time.
    pub fn remaining(&self) -> Signal<Duration> {
        self.remaining.clone()
    }

    /// Remaining time re-derived from the clock right now, not the last poll.
    pub fn value(&self) -> Duration {
        self.inner
            .borrow()
            .deadline
            .map(|d| d.saturating_duration_since(clock::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_armed(&self) -> bool {
        self.inner.borrow().deadline.is_some()
    }

    /// Start (or restart) a countdown of `duration` from now.
    pub fn arm(&self, duration: Duration) {
        let (generation, poll) = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.ticker);
            inner.deadline = Some(clock::now() + duration);
            (inner.generation, inner.poll)
        };
        self.remaining.set(duration);

        let weak = Rc::downgrade(&self.inner);
        let remaining = self.remaining.clone();
        let handle = timer::schedule_repeating(poll, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let left = {
                let mut st = inner.borrow_mut();
                if st.generation != generation {
                    return false;
                }
                let Some(deadline) = st.deadline else {
                    return false;
                };
                let left = deadline.saturating_duration_since(clock::now());
                if left.is_zero() {
                    st.deadline = None;
                    st.ticker = None;
                }
                left
            };
            remaining.set(left);
            !left.is_zero()
        });
        self.inner.borrow_mut().ticker = Some(handle);
    }

    /// Stop projecting and report zero. Idempotent.
    pub fn disarm(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            inner.deadline = None;
            timer::clear_slot(&mut inner.ticker);
        }
        self.remaining.set(Duration::ZERO);
    }

    pub fn set_poll(&self, poll: Duration) {
        self.inner.borrow_mut().poll = poll;
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        timer::clear_slot(&mut self.inner.borrow_mut().ticker);
    }
}
