use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

type Callback = Rc<RefCell<dyn FnMut() -> Result<()>>>;

/// Ordered list of callbacks invoked together.
///
/// Cloning a list copies the registrations: both lists call the same closures
/// but later additions to one are not seen by the other.
#[derive(Clone, Default)]
pub struct CallbackList {
    callbacks: RefCell<Vec<Callback>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.callbacks.borrow_mut().push(Rc::new(RefCell::new(callback)));
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Invoke every callback in registration order.
    ///
    /// All callbacks run even when one fails; the first error is returned.
    /// A callback that is already executing further up the stack (a nested
    /// run loop started from inside it) is skipped for this round.
    pub fn invoke(&self) -> Result<()> {
        let snapshot: Vec<Callback> = self.callbacks.borrow().clone();
        let mut first_err = None;
        for callback in snapshot {
            let Ok(mut f) = callback.try_borrow_mut() else {
                tracing::trace!("skipping re-entrant callback");
                continue;
            };
            if let Err(err) = (&mut *f)() {
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    tracing::error!("additional callback failure: {err:#}");
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn invokes_in_registration_order() {
        let list = CallbackList::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            list.add(move || {
                log.borrow_mut().push(i);
                Ok(())
            });
        }
        list.invoke().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn failure_does_not_skip_later_callbacks() {
        let list = CallbackList::new();
        let ran = Rc::new(Cell::new(false));
        list.add(|| anyhow::bail!("boom"));
        let flag = ran.clone();
        list.add(move || {
            flag.set(true);
            Ok(())
        });
        let err = list.invoke().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(ran.get());
    }

    #[test]
    fn clone_does_not_share_later_registrations() {
        let list = CallbackList::new();
        list.add(|| Ok(()));
        let copy = list.clone();
        copy.add(|| Ok(()));
        assert_eq!(list.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
