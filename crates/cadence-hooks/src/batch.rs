//! # Batched updates
//!
//! [`BatchCoalescer`] accumulates discrete updates under a reducer and
//! delivers them to one consumer callback: when the batch window elapses,
//! when the batch hits its size cap, eagerly on the first update of a window,
//! on demand, or on teardown. A flush atomically snapshots and clears the
//! batch, so no update is ever delivered twice and the consumer never sees an
//! empty batch. [`use_batched_updates`] is the composition wrapper.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Signal, remember_with_key, signal};
use web_time::Duration;

use crate::countdown::{Countdown, DEFAULT_COUNTDOWN_POLL};

/// Batching policy. The reducer owns merge/uniqueness semantics; the
/// coalescer never interprets update content.
pub struct BatchConfig<T> {
    pub batch_window: Duration,
    /// A batch reaching this size flushes immediately instead of waiting for
    /// the window.
    pub max_batch_size: usize,
    /// Flush the first update of each window eagerly.
    pub flush_on_first: bool,
    /// Combines the accumulated batch with the next item. Default: append.
    pub reducer: Rc<dyn Fn(Vec<T>, T) -> Vec<T>>,
    /// Observer invoked with the snapshot just before the consumer.
    pub on_flush: Option<Rc<dyn Fn(&[T])>>,
    pub countdown_poll: Duration,
}

impl<T: 'static> Default for BatchConfig<T> {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(100),
            max_batch_size: 50,
            flush_on_first: false,
            reducer: Rc::new(|mut batch, item| {
                batch.push(item);
                batch
            }),
            on_flush: None,
            countdown_poll: DEFAULT_COUNTDOWN_POLL,
        }
    }
}

impl<T> Clone for BatchConfig<T> {
    fn clone(&self) -> Self {
        Self {
            batch_window: self.batch_window,
            max_batch_size: self.max_batch_size,
            flush_on_first: self.flush_on_first,
            reducer: self.reducer.clone(),
            on_flush: self.on_flush.clone(),
            countdown_poll: self.countdown_poll,
        }
    }
}

/// Published counters for "N pending, flush in X ms" displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchStats {
    pub pending: usize,
    pub time_until_flush: Duration,
}

struct BatchInner<T> {
    config: BatchConfig<T>,
    batch: Vec<T>,
    flush_timer: Option<TimerHandle>,
    first_since_flush: bool,
}

struct BatchCore<T> {
    inner: RefCell<BatchInner<T>>,
    stats: Signal<BatchStats>,
    countdown: Countdown,
    // Holder cell: a scheduled flush delivers to the latest consumer.
    consumer: RefCell<Rc<dyn Fn(Vec<T>)>>,
}

/// See the module docs. Cloning shares the coalescer.
pub struct BatchCoalescer<T: 'static> {
    core: Rc<BatchCore<T>>,
}

impl<T: 'static> Clone for BatchCoalescer<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

enum Arm {
    Window(Duration),
    Immediate,
    Retain,
}

impl<T: 'static> BatchCoalescer<T> {
    pub fn new(consumer: impl Fn(Vec<T>) + 'static, config: BatchConfig<T>) -> Self {
        Self::from_consumer(Rc::new(consumer), config)
    }

    pub fn from_consumer(consumer: Rc<dyn Fn(Vec<T>)>, config: BatchConfig<T>) -> Self {
        let countdown = Countdown::new(config.countdown_poll);
        let stats = signal(BatchStats::default());
        {
            let stats = stats.clone();
            countdown.remaining().subscribe(move |left| {
                stats.update(|s| s.time_until_flush = *left);
            });
        }
        Self {
            core: Rc::new(BatchCore {
                inner: RefCell::new(BatchInner {
                    config,
                    batch: Vec::new(),
                    flush_timer: None,
                    first_since_flush: true,
                }),
                stats,
                countdown,
                consumer: RefCell::new(consumer),
            }),
        }
    }

    /// Reduce `item` into the batch and evaluate the flush triggers:
    /// flush-on-first, then size, then (only on the empty→non-empty
    /// transition) arming the window timer. Triggered flushes are scheduled
    /// on a zero-delay timer, never run synchronously in here.
    pub fn add_update(&self, item: T) {
        // Reduce outside the borrow: the reducer is caller code.
        let (batch, reducer) = {
            let mut inner = self.core.inner.borrow_mut();
            (
                std::mem::take(&mut inner.batch),
                inner.config.reducer.clone(),
            )
        };
        let was_empty = batch.is_empty();
        let reduced = (reducer)(batch, item);

        let (arm, len) = {
            let mut inner = self.core.inner.borrow_mut();
            let first = inner.first_since_flush;
            inner.first_since_flush = false;
            inner.batch = reduced;
            let len = inner.batch.len();

            let arm = if (inner.config.flush_on_first && first)
                || len >= inner.config.max_batch_size
            {
                Self::arm_flush(&self.core, &mut inner, Duration::ZERO);
                Arm::Immediate
            } else if was_empty && len > 0 {
                let window = inner.config.batch_window;
                Self::arm_flush(&self.core, &mut inner, window);
                Arm::Window(window)
            } else {
                Arm::Retain
            };
            (arm, len)
        };

        match arm {
            Arm::Window(window) => self.core.countdown.arm(window),
            Arm::Immediate => self.core.countdown.disarm(),
            Arm::Retain => {}
        }
        self.core.stats.update(|s| s.pending = len);
    }

    fn arm_flush(core: &Rc<BatchCore<T>>, inner: &mut BatchInner<T>, after: Duration) {
        timer::clear_slot(&mut inner.flush_timer);
        let weak = Rc::downgrade(core);
        inner.flush_timer = Some(timer::schedule_once(after, move || {
            if let Some(core) = weak.upgrade() {
                core.inner.borrow_mut().flush_timer = None;
                BatchCore::flush(&core);
            }
        }));
    }

    /// Deliver the pending batch now. No-op when empty.
    pub fn flush(&self) {
        BatchCore::flush(&self.core);
    }

    /// Drop the pending batch and cancel timers without delivering anything.
    pub fn clear(&self) {
        {
            let mut inner = self.core.inner.borrow_mut();
            inner.batch.clear();
            inner.first_since_flush = true;
            timer::clear_slot(&mut inner.flush_timer);
        }
        self.core.countdown.disarm();
        self.core.stats.update(|s| s.pending = 0);
    }

    /// Teardown: one final flush if anything is pending, otherwise just
    /// release timers.
    pub fn finish(&self) {
        if self.has_pending_updates() {
            self.flush();
        } else {
            self.clear();
        }
    }

    pub fn pending_updates(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.core.inner.borrow().batch.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.core.inner.borrow().batch.len()
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.core.inner.borrow().batch.is_empty()
    }

    /// Remaining window time, re-derived from the clock.
    pub fn time_until_flush(&self) -> Duration {
        self.core.countdown.value()
    }

    pub fn stats(&self) -> Signal<BatchStats> {
        self.core.stats.clone()
    }

    /// Swap the policy; takes effect on the next window.
    pub fn set_config(&self, config: BatchConfig<T>) {
        self.core.countdown.set_poll(config.countdown_poll);
        self.core.inner.borrow_mut().config = config;
    }

    /// Swap the consumer; the next flush delivers to the latest one.
    pub fn set_consumer(&self, consumer: impl Fn(Vec<T>) + 'static) {
        *self.core.consumer.borrow_mut() = Rc::new(consumer);
    }

    pub fn set_consumer_rc(&self, consumer: Rc<dyn Fn(Vec<T>)>) {
        *self.core.consumer.borrow_mut() = consumer;
    }
}

impl<T: 'static> BatchCore<T> {
    fn flush(core: &Rc<Self>) {
        let (snapshot, on_flush) = {
            let mut inner = core.inner.borrow_mut();
            if inner.batch.is_empty() {
                return;
            }
            // Cancel the outstanding timer before delivering: every flush
            // path must win the race against the auto-flush.
            timer::clear_slot(&mut inner.flush_timer);
            inner.first_since_flush = true;
            (std::mem::take(&mut inner.batch), inner.config.on_flush.clone())
        };
        core.countdown.disarm();
        core.stats.update(|s| s.pending = 0);
        if let Some(cb) = on_flush {
            cb(&snapshot);
        }
        let consumer = core.consumer.borrow().clone();
        (consumer)(snapshot);
    }
}

/// Composition hook: remembers a [`BatchCoalescer`] under `key`, refreshes
/// its config every build pass, and flushes anything pending on unmount.
pub fn use_batched_updates<T: 'static>(
    key: impl Into<String>,
    config: BatchConfig<T>,
    consumer: impl Fn(Vec<T>) + 'static,
) -> BatchCoalescer<T> {
    let key = key.into();
    let consumer: Rc<dyn Fn(Vec<T>)> = Rc::new(consumer);

    let coalescer = remember_with_key(format!("batch:{key}"), {
        let consumer = consumer.clone();
        let config = config.clone();
        move || BatchCoalescer::from_consumer(consumer, config)
    });
    let coalescer = coalescer.as_ref().clone();

    coalescer.set_config(config);
    coalescer.set_consumer_rc(consumer);

    crate::install_teardown(format!("batch:{key}:teardown"), {
        let coalescer = coalescer.clone();
        move || coalescer.finish()
    });

    coalescer
}
