//! Listener bookkeeping shared by the store and auth adapters

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Teardown guard for a live listener.
///
/// The teardown runs exactly once: on [`Subscription::unsubscribe`] or when
/// the guard is dropped, whichever comes first.
#[must_use = "dropping a Subscription tears the listener down immediately"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.teardown.is_some())
            .finish()
    }
}

type Entries<L> = RefCell<BTreeMap<u64, Rc<L>>>;

/// Id-keyed set of live listeners
pub struct ListenerRegistry<L: ?Sized> {
    entries: Rc<Entries<L>>,
    next_id: RefCell<u64>,
}

impl<L: ?Sized + 'static> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(BTreeMap::new())),
            next_id: RefCell::new(0),
        }
    }

    /// Register a listener; the returned guard removes it again
    pub fn register(&self, listener: Rc<L>) -> Subscription {
        let id = {
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            *next
        };
        self.entries.borrow_mut().insert(id, listener);

        let entries: Weak<Entries<L>> = Rc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.borrow_mut().remove(&id);
            }
        })
    }

    /// Snapshot of the live listeners.
    ///
    /// Callers invoke listeners from the snapshot so a listener may register
    /// or drop subscriptions without a re-entrant borrow.
    pub fn snapshot(&self) -> Vec<Rc<L>> {
        self.entries.borrow().values().cloned().collect()
    }

    pub fn active(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl<L: ?Sized + 'static> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}
