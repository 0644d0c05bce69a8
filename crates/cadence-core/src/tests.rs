#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::{Mutex, MutexGuard};

    use web_time::Duration;

    use crate::clock::TestClock;
    use crate::deferred::Deferred;
    use crate::runtime::{COMPOSER, Composition, remember_with_key};
    use crate::scope::Scope;
    use crate::signal::signal;
    use crate::timer::{
        cancel_timer, clear_slot, pending_timer_count, pump_timers, schedule_once,
        schedule_repeating,
    };

    // The installed clock is process-global; timer tests take this so a
    // parallel test cannot move time underneath them.
    fn clock_lock() -> MutexGuard<'static, ()> {
        static LOCK: Mutex<()> = Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_signal_basic() {
        let sig = signal(42);
        assert_eq!(sig.get(), 42);

        sig.set(100);
        assert_eq!(sig.get(), 100);

        sig.update(|v| *v += 1);
        assert_eq!(sig.get(), 101);
    }

    #[test]
    fn test_signal_subscription() {
        let sig = signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen2 = seen.clone();
        let sub = sig.subscribe(move |v| seen2.borrow_mut().push(*v));

        sig.set(1);
        sig.set(2);
        sig.unsubscribe(sub);
        sig.set(3);

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let sig = signal(0);
        let sub = sig.subscribe(|_| {});
        sig.unsubscribe(sub);
        sig.unsubscribe(sub);
        sig.set(1);
    }

    #[test]
    fn test_scope_explicit_dispose() {
        let cleaned_up = Rc::new(Cell::new(false));

        let scope = Scope::new();
        let cleaned_up2 = cleaned_up.clone();
        scope.add_disposer(move || cleaned_up2.set(true));

        assert!(!cleaned_up.get());
        scope.dispose();
        assert!(cleaned_up.get());
    }

    #[test]
    fn test_child_scope_disposes_before_parent() {
        let order = Rc::new(RefCell::new(Vec::new()));

        let parent = Scope::new();
        let child = parent.child();
        {
            let order = order.clone();
            parent.add_disposer(move || order.borrow_mut().push("parent"));
        }
        {
            let order = order.clone();
            child.add_disposer(move || order.borrow_mut().push("child"));
        }

        parent.dispose();
        assert_eq!(*order.borrow(), vec!["child", "parent"]);
    }

    #[test]
    fn test_effect_registers_cleanup_with_scope() {
        let cleaned = Rc::new(Cell::new(false));

        let scope = Scope::new();
        scope.run({
            let cleaned = cleaned.clone();
            move || crate::effect(move || crate::on_unmount(move || cleaned.set(true)))
        });

        assert!(!cleaned.get());
        scope.dispose();
        assert!(cleaned.get());
    }

    #[test]
    fn test_disposable_effect_reruns_on_key_change() {
        COMPOSER.with(|c| c.borrow_mut().clear());

        let key = signal("a");
        let runs = Rc::new(RefCell::new(Vec::new()));
        let cleanups = Rc::new(RefCell::new(Vec::new()));

        let comp = {
            let key = key.clone();
            let runs = runs.clone();
            let cleanups = cleanups.clone();
            Composition::new(move || {
                let k = key.get();
                let runs = runs.clone();
                let cleanups = cleanups.clone();
                crate::disposable_effect(k, move || {
                    runs.borrow_mut().push(k);
                    crate::on_unmount(move || cleanups.borrow_mut().push(k))
                });
            })
        };
        assert_eq!(*runs.borrow(), vec!["a"]);
        assert!(cleanups.borrow().is_empty());

        key.set("b"); // key change: previous cleanup runs, then the new effect
        assert_eq!(*runs.borrow(), vec!["a", "b"]);
        assert_eq!(*cleanups.borrow(), vec!["a"]);

        key.set("b"); // same key: nothing re-runs
        assert_eq!(*runs.borrow(), vec!["a", "b"]);

        comp.dispose();
        assert_eq!(*cleanups.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_key_based_remember() {
        COMPOSER.with(|c| c.borrow_mut().clear());

        let val1 = remember_with_key("core:test", || 42);
        let val2 = remember_with_key("core:test", || 100);

        assert_eq!(*val1, 42);
        assert_eq!(*val2, 42); // not 100: the key already exists
    }

    #[test]
    fn test_composition_recomposes_on_signal_write() {
        COMPOSER.with(|c| c.borrow_mut().clear());

        let count = signal(0);
        let builds = Rc::new(Cell::new(0));

        let comp = {
            let count = count.clone();
            let builds = builds.clone();
            Composition::new(move || {
                let _ = count.get();
                builds.set(builds.get() + 1);
            })
        };
        assert_eq!(builds.get(), 1);

        count.set(1);
        assert_eq!(builds.get(), 2);

        comp.dispose();
        count.set(2);
        assert_eq!(builds.get(), 2); // disposed: no further builds
    }

    #[test]
    fn test_composition_dispose_runs_cleanup_once() {
        COMPOSER.with(|c| c.borrow_mut().clear());

        let cleanups = Rc::new(Cell::new(0));
        let trigger = signal(0);

        let comp = {
            let cleanups = cleanups.clone();
            let trigger = trigger.clone();
            Composition::new(move || {
                let _ = trigger.get();
                let installed = remember_with_key("core:cleanup-once", || Cell::new(false));
                if !installed.get() {
                    installed.set(true);
                    let cleanups = cleanups.clone();
                    crate::scoped_effect(move || {
                        crate::on_unmount(move || cleanups.set(cleanups.get() + 1))
                    });
                }
            })
        };

        // Recomposition must not fire unmount cleanups.
        trigger.set(1);
        trigger.set(2);
        assert_eq!(cleanups.get(), 0);

        comp.dispose();
        assert_eq!(cleanups.get(), 1);
    }

    #[test]
    fn test_test_clock_drives_now() {
        let _guard = clock_lock();
        let clock = TestClock::new().install();

        let t0 = crate::clock::now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(crate::clock::now() - t0, Duration::from_millis(250));

        // A clone shares the same underlying instant.
        let other = clock.clone();
        other.advance(Duration::from_millis(50));
        assert_eq!(crate::clock::now() - t0, Duration::from_millis(300));
    }

    #[test]
    fn test_timer_once_fires_after_deadline() {
        let _guard = clock_lock();
        let clock = TestClock::new().install();

        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        schedule_once(Duration::from_millis(100), move || fired2.set(true));

        clock.advance(Duration::from_millis(99));
        pump_timers();
        assert!(!fired.get());

        clock.advance(Duration::from_millis(1));
        pump_timers();
        assert!(fired.get());
    }

    #[test]
    fn test_timer_fires_in_deadline_order() {
        let _guard = clock_lock();
        let clock = TestClock::new().install();

        let order = Rc::new(RefCell::new(Vec::new()));
        for (label, ms) in [("b", 200u64), ("a", 100), ("c", 300)] {
            let order = order.clone();
            schedule_once(Duration::from_millis(ms), move || {
                order.borrow_mut().push(label);
            });
        }

        clock.advance(Duration::from_millis(300));
        pump_timers();
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_timer_cancel_is_idempotent() {
        let _guard = clock_lock();
        let clock = TestClock::new().install();

        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        let handle = schedule_once(Duration::from_millis(50), move || fired2.set(true));

        cancel_timer(handle);
        cancel_timer(handle);
        let mut slot = Some(handle);
        clear_slot(&mut slot);
        clear_slot(&mut slot);

        clock.advance(Duration::from_millis(100));
        pump_timers();
        assert!(!fired.get());
    }

    #[test]
    fn test_zero_delay_timer_waits_for_next_pump() {
        let _guard = clock_lock();
        let _clock = TestClock::new().install();

        let outer = Rc::new(Cell::new(false));
        let inner = Rc::new(Cell::new(false));
        let outer2 = outer.clone();
        let inner2 = inner.clone();
        schedule_once(Duration::ZERO, move || {
            outer2.set(true);
            let inner2 = inner2.clone();
            schedule_once(Duration::ZERO, move || inner2.set(true));
        });

        pump_timers();
        assert!(outer.get());
        assert!(!inner.get()); // armed during the pump: next pump only

        pump_timers();
        assert!(inner.get());
    }

    #[test]
    fn test_repeating_timer_stops_when_callback_declines() {
        let _guard = clock_lock();
        let clock = TestClock::new().install();

        let before = pending_timer_count();
        let ticks = Rc::new(Cell::new(0));
        let ticks2 = ticks.clone();
        schedule_repeating(Duration::from_millis(10), move || {
            ticks2.set(ticks2.get() + 1);
            ticks2.get() < 3
        });

        for _ in 0..5 {
            clock.advance(Duration::from_millis(10));
            pump_timers();
        }
        assert_eq!(ticks.get(), 3);
        assert_eq!(pending_timer_count(), before);
    }

    #[test]
    fn test_deferred_settles_once() {
        let deferred: Deferred<i32, &str> = Deferred::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen2 = seen.clone();
        deferred.on_settled(move |r| seen2.borrow_mut().push(r.is_ok()));

        deferred.settle(Ok(7));
        deferred.settle(Err("late")); // ignored

        assert_eq!(*seen.borrow(), vec![true]);
        assert_eq!(deferred.peek(), Some(Ok(7)));

        // Late registration runs immediately with the first result.
        let seen3 = seen.clone();
        deferred.on_settled(move |r| seen3.borrow_mut().push(r.is_ok()));
        assert_eq!(*seen.borrow(), vec![true, true]);
    }
}
