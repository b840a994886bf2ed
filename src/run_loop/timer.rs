use super::RunLoop;
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

type ActionFn = dyn FnMut(&RunLoop) -> Result<()>;

/// Shared handle to a timer action.
///
/// Two handles are the same action when one was cloned from the other; this
/// is the identity [`RunLoop::remove`] matches on.
#[derive(Clone)]
pub struct ActionRef(Rc<RefCell<ActionFn>>);

impl ActionRef {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&RunLoop) -> Result<()> + 'static,
    {
        Self(Rc::new(RefCell::new(f)))
    }

    pub fn ptr_eq(&self, other: &ActionRef) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }

    pub(crate) fn call(&self, run_loop: &RunLoop) -> Result<()> {
        let mut f = self
            .0
            .try_borrow_mut()
            .map_err(|_| anyhow!("timer action is already executing"))?;
        (&mut *f)(run_loop)
    }
}

impl std::fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActionRef({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

struct TimerState {
    action: ActionRef,
    period: Duration,
    repeating: Cell<bool>,
    active: Cell<bool>,
    background: Cell<bool>,
    next_fire_time: Cell<Option<Instant>>,
}

/// A unit of deferred or periodic work.
///
/// Handles are cheap clones of the same timer; stopping one stops them all.
#[derive(Clone)]
pub struct TimerHandle(Rc<TimerState>);

/// Namespace for creating timers that are scheduled later with
/// [`RunLoop::schedule`].
pub struct Timer;

impl Timer {
    pub fn new(action: ActionRef, period: Duration, repeating: bool) -> TimerHandle {
        TimerHandle(Rc::new(TimerState {
            action,
            period,
            repeating: Cell::new(repeating),
            active: Cell::new(true),
            background: Cell::new(false),
            next_fire_time: Cell::new(None),
        }))
    }
}

impl TimerHandle {
    /// Mark the timer as background work that keeps running inside nested
    /// loops created with [`RunLoop::spawn_child`].
    pub fn background(self) -> Self {
        self.0.background.set(true);
        self
    }

    /// Deactivate the timer. It is dropped from the queue the next time it
    /// reaches the front.
    pub fn stop(&self) {
        self.0.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_repeating(&self) -> bool {
        self.0.repeating.get()
    }

    pub fn is_background(&self) -> bool {
        self.0.background.get()
    }

    pub fn period(&self) -> Duration {
        self.0.period
    }

    pub fn next_fire_time(&self) -> Option<Instant> {
        self.0.next_fire_time.get()
    }

    pub fn action(&self) -> &ActionRef {
        &self.0.action
    }

    pub fn ptr_eq(&self, other: &TimerHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set_next_fire_time(&self, at: Instant) {
        self.0.next_fire_time.set(Some(at));
    }

    pub(crate) fn set_repeating(&self, repeating: bool) {
        self.0.repeating.set(repeating);
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("period", &self.0.period)
            .field("repeating", &self.0.repeating.get())
            .field("active", &self.0.active.get())
            .field("background", &self.0.background.get())
            .finish()
    }
}

struct QueueEntry {
    due: Instant,
    seq: u64,
    timer: TimerHandle,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Min-heap of timers ordered by due time, ties broken by insertion order.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    next_seq: u64,
}

impl TimerQueue {
    /// Insert `timer` at its `next_fire_time`, replacing any entry it
    /// already has so it is queued at most once.
    pub(crate) fn push(&mut self, timer: TimerHandle, due: Instant) {
        self.heap.retain(|Reverse(e)| !e.timer.ptr_eq(&timer));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(QueueEntry { due, seq, timer }));
    }

    pub(crate) fn pop(&mut self) -> Option<TimerHandle> {
        self.heap.pop().map(|Reverse(e)| e.timer)
    }

    /// Due time of the front entry.
    pub(crate) fn peek_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(e)| e.due)
    }

    /// Pop the front entry if it is due at `now`, along with the due time it
    /// was queued under.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, Instant)> {
        let due = self.peek_due().filter(|due| *due <= now)?;
        self.pop().map(|timer| (timer, due))
    }

    /// Drop every timer running `action`, returning how many were removed.
    pub(crate) fn remove_action(&mut self, action: &ActionRef) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(e)| {
            if e.timer.action().ptr_eq(action) {
                e.timer.stop();
                false
            } else {
                true
            }
        });
        before - self.heap.len()
    }

    pub(crate) fn contains(&self, timer: &TimerHandle) -> bool {
        self.heap.iter().any(|Reverse(e)| e.timer.ptr_eq(timer))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn background_timers(&self) -> Vec<(TimerHandle, Instant)> {
        let mut entries: Vec<&QueueEntry> = self
            .heap
            .iter()
            .map(|Reverse(e)| e)
            .filter(|e| e.timer.is_background())
            .collect();
        entries.sort();
        entries.into_iter().map(|e| (e.timer.clone(), e.due)).collect()
    }
}
