use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use web_time::{Duration, Instant};

/// Wall clock used for every time computation in the runtime.
///
/// Platform installs `SystemClock`; tests install a `TestClock` and drive it
/// explicitly. Timers and countdowns always re-derive "elapsed"/"remaining"
/// from `now()` instead of trusting that a timer fired exactly on time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

static CLOCK: RwLock<Option<Arc<dyn Clock>>> = RwLock::new(None);

/// Install a global clock. Replaces any previously installed clock.
pub fn set_clock(clock: Arc<dyn Clock>) {
    *CLOCK.write() = Some(clock);
}

/// Current time from the installed clock, falling back to the system clock.
pub fn now() -> Instant {
    CLOCK
        .read()
        .as_ref()
        .map(|c| c.now())
        .unwrap_or_else(Instant::now)
}

/// A test clock you can drive deterministically.
///
/// The handle is shared: advancing any clone moves the installed clock, so a
/// test keeps its handle and calls `advance` without reinstalling.
#[derive(Clone)]
pub struct TestClock {
    t: Arc<Mutex<Instant>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self::start_at(Instant::now())
    }

    pub fn start_at(t: Instant) -> Self {
        Self {
            t: Arc::new(Mutex::new(t)),
        }
    }

    /// Install this clock globally and return the handle.
    pub fn install(&self) -> Self {
        set_clock(Arc::new(self.clone()));
        self.clone()
    }

    pub fn advance(&self, by: Duration) {
        let mut t = self.t.lock();
        *t += by;
    }

    pub fn set(&self, to: Instant) {
        *self.t.lock() = to;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.t.lock()
    }
}
