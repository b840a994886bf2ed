//! Single-threaded cooperative scheduler.
//!
//! A [`RunLoop`] fires timers at their due times and, while waiting for the
//! next one, spins in small sleeps invoking wait callbacks and draining the
//! deferred call queue. That spin is where input polling and display refresh
//! run; there are no other threads involved. Work from other threads reaches
//! the loop only through a [`DeferredSender`].

mod deferred;
mod fault;
mod timer;

pub use deferred::DeferredSender;
pub use timer::{ActionRef, Timer, TimerHandle};

use crate::callbacks::CallbackList;
use crate::settings::Settings;
use anyhow::{Error, Result};
use deferred::DeferredQueue;
use fault::{guarded, FaultPolicy};
use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};
use timer::TimerQueue;

#[derive(Debug, thiserror::Error)]
pub enum RunLoopError {
    #[error("no timer is scheduled for that action")]
    TimerNotFound,
    #[error("run loop has been dropped")]
    LoopGone,
}

/// Timing knobs for the wait spin and fault recovery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    /// How long to wait per cycle when no timer is scheduled.
    pub idle_slice: Duration,
    /// Sleep between wait-callback invocations.
    pub wait_quantum: Duration,
    /// Pause after a fault before scheduling resumes.
    pub fault_pause: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            idle_slice: Duration::from_millis(100),
            wait_quantum: Duration::from_millis(1),
            fault_pause: Duration::from_millis(500),
        }
    }
}

impl From<&Settings> for LoopConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            idle_slice: Duration::from_millis(settings.idle_slice_ms),
            wait_quantum: Duration::from_millis(settings.wait_quantum_ms),
            fault_pause: Duration::from_millis(settings.fault_pause_ms),
        }
    }
}

pub struct RunLoop {
    config: LoopConfig,
    queue: RefCell<TimerQueue>,
    current: RefCell<Option<TimerHandle>>,
    running: Cell<bool>,
    wait_callbacks: CallbackList,
    before_action_callbacks: CallbackList,
    after_action_callbacks: CallbackList,
    deferred: DeferredQueue,
    fault: FaultPolicy,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            config,
            queue: RefCell::new(TimerQueue::default()),
            current: RefCell::new(None),
            running: Cell::new(false),
            wait_callbacks: CallbackList::new(),
            before_action_callbacks: CallbackList::new(),
            after_action_callbacks: CallbackList::new(),
            deferred: DeferredQueue::default(),
            fault: FaultPolicy::new(config.fault_pause),
        }
    }

    pub fn config(&self) -> LoopConfig {
        self.config
    }

    /// Create a nested loop for modal work started from inside a timer
    /// action.
    ///
    /// The child copies this loop's callback registrations, shares its
    /// deferred queue and fault hook, and carries over background timers.
    /// Running the child blocks the caller until the child is stopped.
    pub fn spawn_child(&self) -> RunLoop {
        let child = RunLoop {
            config: self.config,
            queue: RefCell::new(TimerQueue::default()),
            current: RefCell::new(None),
            running: Cell::new(false),
            wait_callbacks: self.wait_callbacks.clone(),
            before_action_callbacks: self.before_action_callbacks.clone(),
            after_action_callbacks: self.after_action_callbacks.clone(),
            deferred: self.deferred.clone(),
            fault: self.fault.clone(),
        };
        {
            let mut queue = child.queue.borrow_mut();
            for (timer, due) in self.queue.borrow().background_timers() {
                queue.push(timer, due);
            }
        }
        child
    }

    /// Queue `timer`. A timer that has never fired is due now when repeating,
    /// or after one period when it is a one-shot.
    pub fn schedule(&self, timer: &TimerHandle) {
        let due = match timer.next_fire_time() {
            Some(due) => due,
            None => {
                let now = Instant::now();
                let due = if timer.is_repeating() {
                    now
                } else {
                    now + timer.period()
                };
                timer.set_next_fire_time(due);
                due
            }
        };
        self.queue.borrow_mut().push(timer.clone(), due);
    }

    pub fn create_timer(&self, action: &ActionRef, period: Duration, repeating: bool) -> TimerHandle {
        let timer = Timer::new(action.clone(), period, repeating);
        self.schedule(&timer);
        timer
    }

    /// Run `f` now and then every `period`.
    pub fn every<F>(&self, period: Duration, f: F) -> TimerHandle
    where
        F: FnMut(&RunLoop) -> Result<()> + 'static,
    {
        self.create_timer(&ActionRef::new(f), period, true)
    }

    /// Like [`RunLoop::every`], but the timer keeps firing inside nested
    /// loops.
    pub fn every_background<F>(&self, period: Duration, f: F) -> TimerHandle
    where
        F: FnMut(&RunLoop) -> Result<()> + 'static,
    {
        let timer = Timer::new(ActionRef::new(f), period, true).background();
        self.schedule(&timer);
        timer
    }

    /// Run `f` once after `delay`.
    pub fn after<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnMut(&RunLoop) -> Result<()> + 'static,
    {
        self.create_timer(&ActionRef::new(f), delay, false)
    }

    /// Unschedule every timer running `action`.
    ///
    /// Called from inside that action, the executing timer is made
    /// non-repeating so it is not put back after this run.
    pub fn remove(&self, action: &ActionRef) -> Result<(), RunLoopError> {
        let removed = self.queue.borrow_mut().remove_action(action);
        let current = self
            .current
            .borrow()
            .as_ref()
            .filter(|timer| timer.action().ptr_eq(action))
            .cloned();
        if let Some(timer) = &current {
            timer.set_repeating(false);
        }
        if removed == 0 && current.is_none() {
            return Err(RunLoopError::TimerNotFound);
        }
        tracing::debug!(removed, self_cancel = current.is_some(), "removed timer action");
        Ok(())
    }

    /// The action of the timer currently executing, if any.
    pub fn current_action(&self) -> Option<ActionRef> {
        self.current.borrow().as_ref().map(|t| t.action().clone())
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_scheduled(&self, timer: &TimerHandle) -> bool {
        self.queue.borrow().contains(timer)
    }

    pub fn add_wait_callback<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.wait_callbacks.add(callback);
    }

    pub fn add_before_action_callback<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.before_action_callbacks.add(callback);
    }

    pub fn add_after_action_callback<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.after_action_callbacks.add(callback);
    }

    /// Replace the hook told about every fault, e.g. to draw an error screen.
    pub fn set_fault_hook<F>(&self, hook: F)
    where
        F: FnMut(&Error) + 'static,
    {
        self.fault.set_hook(Box::new(hook));
    }

    pub fn deferred_sender(&self) -> DeferredSender {
        self.deferred.sender()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Ask the loop to exit once the current cycle completes.
    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Fire timers until [`RunLoop::stop`] is called.
    ///
    /// The next timer stays queued while the loop waits for it, so wait
    /// callbacks and deferred calls can still remove or stop it.
    pub fn run(&self) {
        self.running.set(true);
        tracing::debug!(timers = self.pending_timers(), "run loop started");
        while self.running.get() {
            let cycle_start = Instant::now();
            let next_due = self.queue.borrow().peek_due();
            let Some(due) = next_due else {
                self.wait_until(cycle_start + self.config.idle_slice);
                continue;
            };
            self.wait_until(due);

            // The queue may have changed during the wait; take whatever is
            // due now, or go round again.
            let next = self.queue.borrow_mut().pop_due(Instant::now());
            let Some((timer, queued_due)) = next else {
                continue;
            };
            if !timer.is_active() {
                tracing::trace!("dropping stopped timer");
                continue;
            }
            // A nested loop may have fired a shared background timer and
            // moved it later; requeue under its current time.
            if let Some(actual) = timer.next_fire_time().filter(|t| *t > queued_due) {
                self.queue.borrow_mut().push(timer, actual);
                continue;
            }
            self.fire(timer, cycle_start);
        }
        tracing::debug!("run loop stopped");
    }

    fn fire(&self, timer: TimerHandle, cycle_start: Instant) {
        if let Err(err) = guarded(|| self.before_action_callbacks.invoke()) {
            self.fault.handle("before-action callback", err);
        }

        if timer.is_active() {
            *self.current.borrow_mut() = Some(timer.clone());
            let result = guarded(|| timer.action().call(self));
            *self.current.borrow_mut() = None;
            if let Err(err) = result {
                self.fault.handle("timer action", err);
            }
        }

        if let Err(err) = guarded(|| self.after_action_callbacks.invoke()) {
            self.fault.handle("after-action callback", err);
        }

        if timer.is_repeating() && timer.is_active() {
            // Next period counts from the cycle start, not from now.
            let due = cycle_start + timer.period();
            timer.set_next_fire_time(due);
            self.queue.borrow_mut().push(timer, due);
        }
    }

    /// Spin until `deadline`, invoking the wait hooks at least once.
    fn wait_until(&self, deadline: Instant) {
        self.spin_once();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.config.wait_quantum.min(deadline - now));
            self.spin_once();
        }
    }

    fn spin_once(&self) {
        for call in self.deferred.take_all() {
            if let Err(err) = guarded(|| call(self)) {
                self.fault.handle("deferred call", err);
            }
        }
        if let Err(err) = guarded(|| self.wait_callbacks.invoke()) {
            self.fault.handle("wait callback", err);
        }
    }
}
