//! # Retry with backoff
//!
//! [`RetryController`] drives a fallible asynchronous operation through a
//! bounded sequence of attempts: on failure it consults the retry policy,
//! computes the next backoff delay, waits, and tries again, publishing a live
//! [`RetryState`] snapshot the whole way so a host can render
//! "retrying in Xs". [`use_retry`] is the composition wrapper.
//!
//! Attempts complete through an [`AttemptContext`] handed to the operation,
//! so an attempt may finish later from any callback. Completions are stamped
//! with the execution generation and attempt index they belong to: a
//! completion superseded by `reset()` or a newer `execute()` is discarded,
//! and one arriving after `cancel()` settles the caller's [`Deferred`] with
//! [`RetryFailure::Cancelled`] without publishing further state. Cancellation
//! is cooperative: no abort signal is passed into the operation itself.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{Deferred, Signal, remember_with_key, signal};
use web_time::Duration;

use crate::countdown::{Countdown, DEFAULT_COUNTDOWN_POLL};

/// The wrapped operation: invoked once per attempt with a clone of the args
/// and a completion context.
pub type Operation<A, T, E> = Rc<dyn Fn(A, AttemptContext<T, E>)>;

/// Completion handle for one attempt. Consume it with [`succeed`] or
/// [`fail`]; completing a stale attempt is a no-op.
///
/// [`succeed`]: AttemptContext::succeed
/// [`fail`]: AttemptContext::fail
pub struct AttemptContext<T, E> {
    complete: Rc<dyn Fn(Result<T, E>)>,
    pub attempt: u32,
}

impl<T, E> AttemptContext<T, E> {
    pub fn succeed(self, value: T) {
        (self.complete)(Ok(value));
    }

    pub fn fail(self, error: E) {
        (self.complete)(Err(error));
    }
}

/// Retry policy and observers. All fields have defaults; callbacks are
/// optional. A live controller picks up config changes on the next cycle,
/// never retroactively on an in-flight wait.
pub struct RetryConfig<E> {
    /// Retry budget: a permanently failing operation runs `max_attempts + 1`
    /// times (one initial call plus `max_attempts` retries).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
    /// Policy veto: called with the error and the 0-based index of the failed
    /// attempt. Returning `false` stops the loop without counting as budget
    /// exhaustion.
    pub should_retry: Rc<dyn Fn(&E, u32) -> bool>,
    /// Observer: `(error, retry_number (1-based), next_delay)` before each wait.
    pub on_retry: Option<Rc<dyn Fn(&E, u32, Duration)>>,
    /// Observer: `(last_error, total_attempts)` exactly once on exhaustion.
    pub on_max_attempts_reached: Option<Rc<dyn Fn(&E, u32)>>,
    pub countdown_poll: Duration,
}

impl<E> Default for RetryConfig<E> {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            use_exponential_backoff: true,
            should_retry: Rc::new(|_, _| true),
            on_retry: None,
            on_max_attempts_reached: None,
            countdown_poll: DEFAULT_COUNTDOWN_POLL,
        }
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            backoff_multiplier: self.backoff_multiplier,
            max_delay: self.max_delay,
            use_exponential_backoff: self.use_exponential_backoff,
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
            on_max_attempts_reached: self.on_max_attempts_reached.clone(),
            countdown_poll: self.countdown_poll,
        }
    }
}

impl<E> RetryConfig<E> {
    /// Backoff before the retry that follows the 0-based `failed_attempt`:
    /// `min(initial * multiplier^failed_attempt, max_delay)`, so the first
    /// retry waits `initial_delay`. Clamped into `[0, max_delay]`.
    pub fn delay_before_retry(&self, failed_attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.initial_delay.min(self.max_delay);
        }
        let exponent = failed_attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs < 0.0 {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Published snapshot of the retry loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RetryState<E> {
    /// True from `execute()` until success, exhaustion, or cancellation.
    pub is_retrying: bool,
    /// 0-based index of the attempt in flight (or last completed).
    pub current_attempt: u32,
    pub last_error: Option<E>,
    pub time_until_next_retry: Duration,
    /// 1-based count of attempts actually made.
    pub total_attempts: u32,
}

impl<E> Default for RetryState<E> {
    fn default() -> Self {
        Self {
            is_retrying: false,
            current_attempt: 0,
            last_error: None,
            time_until_next_retry: Duration::ZERO,
            total_attempts: 0,
        }
    }
}

/// Terminal failure of an `execute()` call. The operation's own error value
/// travels verbatim inside `Operation`, never wrapped or swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure<E> {
    Cancelled,
    Operation(E),
}

impl<E> RetryFailure<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryFailure::Cancelled)
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryFailure::Operation(e) => Some(e),
            RetryFailure::Cancelled => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Attempting,
    Waiting,
}

struct RetryInner<A, T, E> {
    config: RetryConfig<E>,
    operation: Operation<A, T, E>,
    generation: u64,
    phase: Phase,
    cancelled: bool,
    attempt: u32,
    args: Option<A>,
    retry_timer: Option<TimerHandle>,
    pending: Option<Deferred<T, RetryFailure<E>>>,
}

struct RetryCore<A, T, E: 'static> {
    inner: RefCell<RetryInner<A, T, E>>,
    state: Signal<RetryState<E>>,
    countdown: Countdown,
}

/// See the module docs. Cloning shares the controller.
pub struct RetryController<A, T, E>
where
    A: Clone + 'static,
    T: 'static,
    E: Clone + 'static,
{
    core: Rc<RetryCore<A, T, E>>,
}

impl<A, T, E> Clone for RetryController<A, T, E>
where
    A: Clone + 'static,
    T: 'static,
    E: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<A, T, E> RetryController<A, T, E>
where
    A: Clone + 'static,
    T: 'static,
    E: Clone + 'static,
{
    pub fn new(operation: impl Fn(A, AttemptContext<T, E>) + 'static, config: RetryConfig<E>) -> Self {
        Self::from_operation(Rc::new(operation), config)
    }

    pub fn from_operation(operation: Operation<A, T, E>, config: RetryConfig<E>) -> Self {
        let countdown = Countdown::new(config.countdown_poll);
        let state = signal(RetryState::default());
        {
            let state = state.clone();
            countdown.remaining().subscribe(move |left| {
                state.update(|s| s.time_until_next_retry = *left);
            });
        }
        Self {
            core: Rc::new(RetryCore {
                inner: RefCell::new(RetryInner {
                    config,
                    operation,
                    generation: 0,
                    phase: Phase::Idle,
                    cancelled: false,
                    attempt: 0,
                    args: None,
                    retry_timer: None,
                    pending: None,
                }),
                state,
                countdown,
            }),
        }
    }

    /// Start a fresh execution. Any execution still in flight is superseded:
    /// its deferred settles as cancelled and its late completions are
    /// discarded.
    pub fn execute(&self, args: A) -> Deferred<T, RetryFailure<E>> {
        let deferred = Deferred::new();
        let (generation, superseded) = {
            let mut inner = self.core.inner.borrow_mut();
            inner.generation += 1;
            inner.cancelled = false;
            inner.phase = Phase::Idle;
            inner.attempt = 0;
            inner.args = Some(args);
            timer::clear_slot(&mut inner.retry_timer);
            let superseded = inner.pending.replace(deferred.clone());
            (inner.generation, superseded)
        };
        if let Some(old) = superseded {
            old.settle(Err(RetryFailure::Cancelled));
        }
        self.core.countdown.disarm();
        self.core.state.set(RetryState {
            is_retrying: true,
            ..RetryState::default()
        });
        RetryCore::begin_attempt(&self.core, generation);
        deferred
    }

    /// Stop retrying: clears the pending wait and suppresses any further
    /// state publication. An in-flight attempt is not aborted; its eventual
    /// completion settles the deferred as cancelled. Idempotent.
    pub fn cancel(&self) {
        let pending = {
            let mut inner = self.core.inner.borrow_mut();
            inner.cancelled = true;
            timer::clear_slot(&mut inner.retry_timer);
            match inner.phase {
                // Nothing will ever complete this execution; settle it here.
                Phase::Waiting | Phase::Idle => {
                    inner.phase = Phase::Idle;
                    inner.args = None;
                    inner.pending.take()
                }
                // The in-flight attempt observes the flag on completion.
                Phase::Attempting => None,
            }
        };
        self.core.countdown.disarm();
        self.core.state.update(|s| {
            s.is_retrying = false;
            s.time_until_next_retry = Duration::ZERO;
        });
        if let Some(p) = pending {
            p.settle(Err(RetryFailure::Cancelled));
        }
    }

    /// `cancel()` plus restoring the published state to its initial form.
    /// Anything still in flight is fully discarded.
    pub fn reset(&self) {
        self.cancel();
        let pending = {
            let mut inner = self.core.inner.borrow_mut();
            inner.generation += 1;
            inner.phase = Phase::Idle;
            inner.cancelled = false;
            inner.attempt = 0;
            inner.args = None;
            timer::clear_slot(&mut inner.retry_timer);
            inner.pending.take()
        };
        if let Some(p) = pending {
            p.settle(Err(RetryFailure::Cancelled));
        }
        self.core.state.set(RetryState::default());
    }

    pub fn state(&self) -> Signal<RetryState<E>> {
        self.core.state.clone()
    }

    pub fn snapshot(&self) -> RetryState<E> {
        self.core.state.get()
    }

    pub fn is_retrying(&self) -> bool {
        self.core.state.with(|s| s.is_retrying)
    }

    /// Remaining backoff wait, re-derived from the clock.
    pub fn time_until_next_retry(&self) -> Duration {
        self.core.countdown.value()
    }

    /// Swap the policy; takes effect on the next cycle.
    pub fn set_config(&self, config: RetryConfig<E>) {
        self.core.countdown.set_poll(config.countdown_poll);
        self.core.inner.borrow_mut().config = config;
    }

    /// Swap the operation; the next attempt invokes the latest one.
    pub fn set_operation(&self, operation: impl Fn(A, AttemptContext<T, E>) + 'static) {
        self.set_operation_rc(Rc::new(operation));
    }

    pub fn set_operation_rc(&self, operation: Operation<A, T, E>) {
        self.core.inner.borrow_mut().operation = operation;
    }
}

impl<A, T, E> RetryCore<A, T, E>
where
    A: Clone + 'static,
    T: 'static,
    E: Clone + 'static,
{
    fn begin_attempt(core: &Rc<Self>, generation: u64) {
        let (operation, args, attempt) = {
            let mut inner = core.inner.borrow_mut();
            if inner.generation != generation || inner.cancelled {
                return;
            }
            let Some(args) = inner.args.clone() else {
                return;
            };
            inner.phase = Phase::Attempting;
            (inner.operation.clone(), args, inner.attempt)
        };

        core.state.update(|s| {
            s.is_retrying = true;
            s.current_attempt = attempt;
            s.total_attempts = attempt + 1;
            s.time_until_next_retry = Duration::ZERO;
        });

        let weak = Rc::downgrade(core);
        let ctx = AttemptContext {
            attempt,
            complete: Rc::new(move |result| {
                if let Some(core) = weak.upgrade() {
                    RetryCore::complete(&core, generation, attempt, result);
                }
            }),
        };
        (operation)(args, ctx);
    }

    fn complete(core: &Rc<Self>, generation: u64, attempt: u32, result: Result<T, E>) {
        // Triage under one short borrow; every later step re-validates.
        let cancelled_pending = {
            let mut inner = core.inner.borrow_mut();
            if inner.generation != generation {
                // Superseded by reset() or a newer execute(): discard.
                return;
            }
            if inner.phase != Phase::Attempting || inner.attempt != attempt {
                log::warn!("retry attempt {attempt} completed more than once; ignoring");
                return;
            }
            if inner.cancelled {
                inner.phase = Phase::Idle;
                inner.args = None;
                Some(inner.pending.take())
            } else {
                None
            }
        };
        if let Some(pending) = cancelled_pending {
            // Post-cancel completion: the deferred must still settle, but no
            // further state is published.
            if let Some(p) = pending {
                p.settle(Err(RetryFailure::Cancelled));
            }
            return;
        }

        match result {
            Ok(value) => {
                let pending = {
                    let mut inner = core.inner.borrow_mut();
                    inner.phase = Phase::Idle;
                    inner.args = None;
                    inner.pending.take()
                };
                core.countdown.disarm();
                core.state.update(|s| {
                    s.is_retrying = false;
                    s.time_until_next_retry = Duration::ZERO;
                });
                if let Some(p) = pending {
                    p.settle(Ok(value));
                }
            }
            Err(error) => Self::handle_failure(core, generation, attempt, error),
        }
    }

    fn handle_failure(core: &Rc<Self>, generation: u64, attempt: u32, error: E) {
        let (exhausted, should_retry, on_retry, on_max, delay) = {
            let mut inner = core.inner.borrow_mut();
            // Waiting while the policy decides: a re-entrant cancel() inside
            // a callback then settles the deferred instead of stranding it.
            inner.phase = Phase::Waiting;
            let cfg = &inner.config;
            (
                attempt >= cfg.max_attempts,
                cfg.should_retry.clone(),
                cfg.on_retry.clone(),
                cfg.on_max_attempts_reached.clone(),
                cfg.delay_before_retry(attempt),
            )
        };

        let retryable = !exhausted && (should_retry)(&error, attempt);

        // The policy callback may have cancelled, reset, or re-executed.
        {
            let inner = core.inner.borrow();
            if inner.generation != generation || inner.cancelled || inner.phase != Phase::Waiting {
                return;
            }
        }

        if !retryable {
            let pending = {
                let mut inner = core.inner.borrow_mut();
                inner.phase = Phase::Idle;
                inner.args = None;
                inner.pending.take()
            };
            core.countdown.disarm();
            core.state.update(|s| {
                s.is_retrying = false;
                s.last_error = Some(error.clone());
                s.time_until_next_retry = Duration::ZERO;
                s.current_attempt = attempt;
                s.total_attempts = attempt + 1;
            });
            if exhausted {
                if let Some(cb) = on_max {
                    cb(&error, attempt + 1);
                }
            }
            if let Some(p) = pending {
                p.settle(Err(RetryFailure::Operation(error)));
            }
            return;
        }

        core.state.update(|s| {
            s.last_error = Some(error.clone());
            s.time_until_next_retry = delay;
        });
        if let Some(cb) = on_retry {
            cb(&error, attempt + 1, delay);
        }

        {
            let mut inner = core.inner.borrow_mut();
            if inner.generation != generation || inner.cancelled || inner.phase != Phase::Waiting {
                return;
            }
            inner.attempt = attempt + 1;
            timer::clear_slot(&mut inner.retry_timer);
            let weak = Rc::downgrade(core);
            inner.retry_timer = Some(timer::schedule_once(delay, move || {
                if let Some(core) = weak.upgrade() {
                    core.inner.borrow_mut().retry_timer = None;
                    RetryCore::begin_attempt(&core, generation);
                }
            }));
        }
        core.countdown.arm(delay);
    }
}

/// Composition hook: remembers a [`RetryController`] under `key`, refreshes
/// its config and operation every build pass, and cancels it on unmount.
pub fn use_retry<A, T, E>(
    key: impl Into<String>,
    config: RetryConfig<E>,
    operation: impl Fn(A, AttemptContext<T, E>) + 'static,
) -> RetryController<A, T, E>
where
    A: Clone + 'static,
    T: 'static,
    E: Clone + 'static,
{
    let key = key.into();
    let operation: Operation<A, T, E> = Rc::new(operation);

    let ctrl = remember_with_key(format!("retry:{key}"), {
        let operation = operation.clone();
        let config = config.clone();
        move || RetryController::from_operation(operation, config)
    });
    let ctrl = ctrl.as_ref().clone();

    // Latest config/operation win for the next cycle (scheduled callbacks
    // dereference the holder at fire time, not at schedule time).
    ctrl.set_config(config);
    ctrl.set_operation_rc(operation);

    crate::install_teardown(format!("retry:{key}:teardown"), {
        let ctrl = ctrl.clone();
        move || ctrl.cancel()
    });

    ctrl
}

#[cfg(test)]
mod backoff_tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_then_clamps() {
        let cfg: RetryConfig<()> = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            ..RetryConfig::default()
        };
        assert_eq!(cfg.delay_before_retry(0), Duration::from_millis(100));
        assert_eq!(cfg.delay_before_retry(1), Duration::from_millis(200));
        assert_eq!(cfg.delay_before_retry(2), Duration::from_millis(400));
        assert_eq!(cfg.delay_before_retry(3), Duration::from_millis(500));
        assert_eq!(cfg.delay_before_retry(30), Duration::from_millis(500));
    }

    #[test]
    fn linear_backoff_is_constant() {
        let cfg: RetryConfig<()> = RetryConfig {
            initial_delay: Duration::from_millis(250),
            use_exponential_backoff: false,
            ..RetryConfig::default()
        };
        assert_eq!(cfg.delay_before_retry(0), Duration::from_millis(250));
        assert_eq!(cfg.delay_before_retry(7), Duration::from_millis(250));
    }

    #[test]
    fn huge_exponents_saturate_at_max_delay() {
        let cfg: RetryConfig<()> = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(30),
            ..RetryConfig::default()
        };
        assert_eq!(cfg.delay_before_retry(u32::MAX), Duration::from_secs(30));
    }
}
