//! # Signals, scopes, and timers
//!
//! Cadence's core is a small headless reactive host. There are four main
//! pieces:
//!
//! - `Signal<T>` — observable, reactive value.
//! - `remember*` — lifecycle‑aware storage bound to composition.
//! - `Scope` / `effect` — side‑effects with cleanup on teardown.
//! - `clock` / `timer` — a swappable wall clock and a pumped timer queue.
//!
//! ## Signals
//!
//! `Signal<T>` is a cloneable handle to a piece of state:
//!
//! ```rust
//! use cadence_core::*;
//!
//! let count = signal(0);
//! count.set(1);
//! count.update(|v| *v += 1);
//! assert_eq!(count.get(), 2);
//! ```
//!
//! Reads participate in a dependency graph: when you call `get()` inside a
//! [`Composition`] build pass, future writes will automatically recompose it.
//!
//! ## Remembered state
//!
//! Hook state is held in `remember_*` slots rather than globals:
//!
//! - `remember` and `remember_state` are order‑based: the Nth call in a
//!   build pass always refers to the Nth stored value.
//! - `remember_with_key` and `remember_state_with_key` are key‑based and more
//!   stable across conditional branches.
//!
//! ## Time
//!
//! Everything time-related goes through [`clock::now`] and the thread's timer
//! queue. The host loop pumps timers; engines arm one-shot timers for "do X
//! after N ms" and repeating timers for pollers, and always re-derive elapsed
//! time from clock reads at fire time. Tests install a [`TestClock`], advance
//! it, and call [`pump_timers`]:
//!
//! ```rust
//! use cadence_core::*;
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use web_time::Duration;
//!
//! let clock = TestClock::new().install();
//! let fired = Rc::new(Cell::new(false));
//! let fired2 = fired.clone();
//! schedule_once(Duration::from_millis(100), move || fired2.set(true));
//!
//! clock.advance(Duration::from_millis(100));
//! pump_timers();
//! assert!(fired.get());
//! ```
//!
//! ## Effects and cleanup
//!
//! `scoped_effect` registers cleanup with the current scope; a
//! [`Composition`] runs those cleanups exactly once when it is disposed.
//! Long‑running hooks (retries, batch windows, pollers) build on this so
//! everything stops when the composition that owns it disappears.

pub mod clock;
pub mod deferred;
pub mod effects;
pub mod error;
pub mod reactive;
pub mod runtime;
pub mod scope;
pub mod signal;
pub mod tests;
pub mod timer;

pub use clock::{Clock, SystemClock, TestClock, set_clock};
pub use deferred::*;
pub use effects::*;
pub use error::*;
pub use runtime::*;
pub use scope::*;
pub use signal::*;
pub use timer::{
    TimerHandle, cancel_timer, clear_slot, drain_due_timers, next_timer_deadline,
    pending_timer_count, pump_timers, schedule_once, schedule_repeating,
};
