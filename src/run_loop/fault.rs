use anyhow::{anyhow, Error, Result};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

pub(crate) type FaultHook = Box<dyn FnMut(&Error)>;

/// What happens when an action or callback fails: log, notify the hook,
/// pause, carry on.
#[derive(Clone)]
pub(crate) struct FaultPolicy {
    pause: Duration,
    hook: Rc<RefCell<Option<FaultHook>>>,
}

impl FaultPolicy {
    pub(crate) fn new(pause: Duration) -> Self {
        Self {
            pause,
            hook: Rc::new(RefCell::new(None)),
        }
    }

    pub(crate) fn set_hook(&self, hook: FaultHook) {
        *self.hook.borrow_mut() = Some(hook);
    }

    pub(crate) fn handle(&self, context: &str, err: Error) {
        tracing::error!("{context} failed: {err:?}");
        match self.hook.try_borrow_mut() {
            Ok(mut hook) => {
                if let Some(hook) = hook.as_mut() {
                    hook(&err);
                }
            }
            Err(_) => tracing::warn!("fault hook re-entered; skipping"),
        }
        if !self.pause.is_zero() {
            std::thread::sleep(self.pause);
        }
    }
}

/// Run `f`, turning a panic into an error so the loop survives it.
pub(crate) fn guarded<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(anyhow!("panicked: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn guarded_converts_panics() {
        let err = guarded(|| panic!("kaboom")).unwrap_err();
        assert_eq!(err.to_string(), "panicked: kaboom");
        assert!(guarded(|| Ok(())).is_ok());
    }

    #[test]
    fn handle_invokes_hook_with_error() {
        let policy = FaultPolicy::new(Duration::ZERO);
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        policy.set_hook(Box::new(move |err| {
            assert_eq!(err.to_string(), "bad");
            flag.set(true);
        }));
        policy.handle("timer action", anyhow!("bad"));
        assert!(seen.get());
    }
}
