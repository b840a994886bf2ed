use super::{RunLoop, RunLoopError};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

pub(crate) type DeferredCall = Box<dyn FnOnce(&RunLoop) -> Result<()> + Send>;

/// Thread-safe queue of calls waiting to run on the loop thread.
#[derive(Clone, Default)]
pub(crate) struct DeferredQueue {
    calls: Arc<Mutex<VecDeque<DeferredCall>>>,
}

impl DeferredQueue {
    pub(crate) fn sender(&self) -> DeferredSender {
        DeferredSender {
            calls: Arc::downgrade(&self.calls),
        }
    }

    /// Take every call queued so far. Calls submitted while these run wait
    /// for the next drain.
    pub(crate) fn take_all(&self) -> VecDeque<DeferredCall> {
        match self.calls.lock() {
            Ok(mut calls) => std::mem::take(&mut *calls),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Handle for submitting work to a [`RunLoop`] from any thread.
///
/// Calls run on the loop thread during its next wait-spin iteration.
#[derive(Clone)]
pub struct DeferredSender {
    calls: Weak<Mutex<VecDeque<DeferredCall>>>,
}

impl DeferredSender {
    pub fn call<F>(&self, f: F) -> Result<(), RunLoopError>
    where
        F: FnOnce(&RunLoop) -> Result<()> + Send + 'static,
    {
        let calls = self.calls.upgrade().ok_or(RunLoopError::LoopGone)?;
        let mut guard = calls.lock().map_err(|_| RunLoopError::LoopGone)?;
        guard.push_back(Box::new(f));
        Ok(())
    }
}
