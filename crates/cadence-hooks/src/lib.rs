//! # Timer hooks
//!
//! Timer-based behaviors for declarative component code, built on
//! `cadence-core`'s reactive host. Each behavior is a plain controller usable
//! on its own plus a `use_*` wrapper that remembers it under a caller key and
//! tears it down when the owning composition unmounts:
//!
//! - [`use_retry`] — drive a fallible async operation through bounded
//!   attempts with exponential backoff, cancellation, and live progress.
//! - [`use_batched_updates`] — coalesce updates over a sliding window (or
//!   size/first-update triggers) into single deliveries.
//! - [`Countdown`] — live "time remaining" projection both of the above use
//!   for their "in Xs" displays.
//! - [`use_interval`], [`use_timeout`], [`use_debounced_value`],
//!   [`use_throttled_callback`], [`use_stopwatch`], [`use_delayed_state`],
//!   [`use_step_sequence`] — thin wrappers over the same timer/scope
//!   plumbing.
//!
//! ```rust
//! use cadence_hooks::*;
//! use web_time::Duration;
//!
//! let retry = RetryController::new(
//!     |url: &'static str, ctx: AttemptContext<&'static str, &'static str>| {
//!         // a real operation would finish later, from another callback
//!         if ctx.attempt < 2 {
//!             ctx.fail("connection refused");
//!         } else {
//!             ctx.succeed(url);
//!         }
//!     },
//!     RetryConfig {
//!         initial_delay: Duration::from_millis(100),
//!         ..RetryConfig::default()
//!     },
//! );
//! let outcome = retry.execute("https://example.test");
//! # let _ = outcome;
//! ```

use std::cell::Cell;

use cadence_core::{on_unmount, remember_with_key, scoped_effect};

pub mod batch;
pub mod countdown;
pub mod debounce;
pub mod delayed;
pub mod interval;
pub mod retry;
pub mod sequence;
pub mod stopwatch;
pub mod throttle;
pub mod timeout;

pub use batch::*;
pub use countdown::*;
pub use debounce::*;
pub use delayed::*;
pub use interval::*;
pub use retry::*;
pub use sequence::*;
pub use stopwatch::*;
pub use throttle::*;
pub use timeout::*;

/// Register `teardown` with the current scope exactly once per `slot_key`,
/// no matter how many build passes revisit the callsite.
pub(crate) fn install_teardown(slot_key: String, teardown: impl FnOnce() + 'static) {
    let installed = remember_with_key(slot_key, || Cell::new(false));
    if !installed.get() {
        installed.set(true);
        scoped_effect(move || on_unmount(teardown));
    }
}
