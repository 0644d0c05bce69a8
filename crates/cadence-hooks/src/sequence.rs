use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::timer::{self, TimerHandle};
use cadence_core::{HookError, Signal, remember_with_key, signal};
use web_time::Duration;

/// One entry of a [`StepSequence`]: wait `delay`, then run `action`.
pub struct Step {
    pub delay: Duration,
    pub action: Rc<dyn Fn()>,
}

impl Step {
    pub fn new(delay: Duration, action: impl Fn() + 'static) -> Self {
        Self {
            delay,
            action: Rc::new(action),
        }
    }

    pub fn immediate(action: impl Fn() + 'static) -> Self {
        Self::new(Duration::ZERO, action)
    }
}

impl Clone for Step {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            action: self.action.clone(),
        }
    }
}

/// Runs an ordered list of steps strictly sequentially: step N+1 is not even
/// scheduled until step N's action has returned. `cancel` stops between
/// steps; a re-`run` supersedes the previous run.
pub struct StepSequence {
    current_step: Signal<Option<usize>>,
    is_running: Signal<bool>,
    inner: Rc<RefCell<SequenceInner>>,
}

struct SequenceInner {
    steps: Vec<Step>,
    handle: Option<TimerHandle>,
    generation: u64,
}

impl Clone for StepSequence {
    fn clone(&self) -> Self {
        Self {
            current_step: self.current_step.clone(),
            is_running: self.is_running.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl StepSequence {
    /// An empty step list is a usage error, not an empty run.
    pub fn new(steps: Vec<Step>) -> Result<Self, HookError> {
        if steps.is_empty() {
            return Err(HookError::Usage(
                "a step sequence needs at least one step".into(),
            ));
        }
        Ok(Self {
            current_step: signal(None),
            is_running: signal(false),
            inner: Rc::new(RefCell::new(SequenceInner {
                steps,
                handle: None,
                generation: 0,
            })),
        })
    }

    /// Start from the first step, superseding any run in progress.
    pub fn run(&self) {
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
            inner.generation
        };
        self.is_running.set(true);
        self.current_step.set(None);
        Self::schedule_step(
            &self.inner,
            &self.current_step,
            &self.is_running,
            0,
            generation,
        );
    }

    fn schedule_step(
        inner: &Rc<RefCell<SequenceInner>>,
        current_step: &Signal<Option<usize>>,
        is_running: &Signal<bool>,
        index: usize,
        generation: u64,
    ) {
        let delay = {
            let st = inner.borrow();
            match st.steps.get(index) {
                Some(step) => step.delay,
                None => return,
            }
        };
        let weak = Rc::downgrade(inner);
        let current_step = current_step.clone();
        let is_running = is_running.clone();
        let handle = timer::schedule_once(delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let action = {
                let mut st = inner.borrow_mut();
                if st.generation != generation {
                    return;
                }
                st.handle = None;
                match st.steps.get(index) {
                    Some(step) => step.action.clone(),
                    None => return,
                }
            };
            current_step.set(Some(index));
            action();

            // The action may have cancelled or re-run the sequence.
            let next = {
                let st = inner.borrow();
                if st.generation != generation {
                    None
                } else if index + 1 < st.steps.len() {
                    Some(index + 1)
                } else {
                    None
                }
            };
            match next {
                Some(next_index) => {
                    Self::schedule_step(&inner, &current_step, &is_running, next_index, generation);
                }
                None => {
                    let still_current = inner.borrow().generation == generation;
                    if still_current {
                        is_running.set(false);
                        current_step.set(None);
                    }
                }
            }
        });
        inner.borrow_mut().handle = Some(handle);
    }

    /// Stop between steps. A step already past its delay still runs once its
    /// pump turn comes only if it fired before the cancel. Idempotent.
    pub fn cancel(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            timer::clear_slot(&mut inner.handle);
        }
        self.is_running.set(false);
        self.current_step.set(None);
    }

    pub fn step_count(&self) -> usize {
        self.inner.borrow().steps.len()
    }

    pub fn current_step(&self) -> Signal<Option<usize>> {
        self.current_step.clone()
    }

    pub fn is_running(&self) -> Signal<bool> {
        self.is_running.clone()
    }

    /// Applies to the next `run`, not to a run in progress.
    pub fn set_steps(&self, steps: Vec<Step>) -> Result<(), HookError> {
        if steps.is_empty() {
            return Err(HookError::Usage(
                "a step sequence needs at least one step".into(),
            ));
        }
        self.inner.borrow_mut().steps = steps;
        Ok(())
    }
}

/// Composition hook: remembered per `key`, cancelled on unmount.
pub fn use_step_sequence(
    key: impl Into<String>,
    steps: Vec<Step>,
) -> Result<StepSequence, HookError> {
    if steps.is_empty() {
        return Err(HookError::Usage(
            "a step sequence needs at least one step".into(),
        ));
    }
    let key = key.into();
    let sequence = remember_with_key(format!("sequence:{key}"), {
        let steps = steps.clone();
        move || StepSequence::new(steps)
    });
    let sequence = match sequence.as_ref() {
        Ok(s) => s.clone(),
        Err(e) => return Err(e.clone()),
    };

    // Latest steps win for the next run.
    sequence.set_steps(steps)?;

    crate::install_teardown(format!("sequence:{key}:teardown"), {
        let sequence = sequence.clone();
        move || sequence.cancel()
    });

    Ok(sequence)
}
