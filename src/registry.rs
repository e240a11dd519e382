//! Per-handler bookkeeping for implicit (`listen`/`unlisten`) registrations.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cancellation::CancellationListener;
use crate::realm::{ContextBuilder, Realm, RealmAllocation, WeakRealm};

/// Active cancellation listeners of one handler, in insertion order.
#[derive(Debug)]
pub struct Registry {
    listeners: RefCell<Vec<Rc<CancellationListener>>>,
    allocation: RealmAllocation,
}

impl Registry {
    pub fn realm(&self) -> &Realm {
        self.allocation.realm()
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// First live listener registered for `(emitter, event_name, capture)`.
    ///
    /// `emitter` is compared by address only.
    pub(crate) fn find(
        &self,
        emitter: *const (),
        event_name: &str,
        capture: bool,
    ) -> Option<Rc<CancellationListener>> {
        self.listeners
            .borrow()
            .iter()
            .find(|listener| listener.matches(emitter, event_name, capture))
            .cloned()
    }

    pub(crate) fn insert(&self, listener: Rc<CancellationListener>) {
        self.listeners.borrow_mut().push(listener);
    }

    pub(crate) fn remove(&self, listener: &CancellationListener) {
        let mut listeners = self.listeners.borrow_mut();
        let removed = listeners
            .iter()
            .position(|entry| std::ptr::eq(Rc::as_ptr(entry), listener))
            .map(|index| listeners.remove(index));
        drop(listeners);
        // Dropped outside the borrow.
        drop(removed);
    }

    /// Detach every listener whose interceptor is gone or unregistered.
    pub(crate) fn take_stale(&self) -> Vec<Rc<CancellationListener>> {
        let mut listeners = self.listeners.borrow_mut();
        let (stale, live): (Vec<_>, Vec<_>) = listeners
            .drain(..)
            .partition(|listener| listener.is_stale());
        *listeners = live;
        stale
    }
}

/// Builds registries inside a handler's realm.
pub struct RegistryFactory {
    realm: WeakRealm,
}

impl ContextBuilder for RegistryFactory {
    fn compile(realm: &Realm) -> Self {
        Self {
            realm: realm.downgrade(),
        }
    }
}

impl RegistryFactory {
    pub(crate) fn create(&self) -> Option<Rc<Registry>> {
        let realm = self.realm.upgrade()?;
        Some(Rc::new(Registry {
            listeners: RefCell::new(Vec::new()),
            allocation: RealmAllocation::new(realm),
        }))
    }
}
