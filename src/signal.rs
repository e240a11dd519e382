use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::cancellation::{same_abort_listener, AbortListenerRef, CancellationSignal};

/// In-process cancellation signal. Fires at most once.
#[derive(Default)]
pub struct AbortSignal {
    aborted: Cell<bool>,
    listeners: RefCell<Vec<AbortListenerRef>>,
}

impl AbortSignal {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Fire the signal. Listeners run once, in registration order, and are
    /// released afterwards.
    pub fn abort(&self) {
        if self.aborted.replace(true) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        debug!(target: "weak_listener", listeners = listeners.len(), "signal aborted");
        for listener in &listeners {
            listener.on_abort();
        }
    }
}

impl CancellationSignal for AbortSignal {
    fn aborted(&self) -> bool {
        self.aborted.get()
    }

    fn add_abort_listener(&self, listener: AbortListenerRef) {
        if self.aborted.get() {
            return;
        }
        let mut listeners = self.listeners.borrow_mut();
        if listeners
            .iter()
            .any(|existing| same_abort_listener(existing, &listener))
        {
            return;
        }
        listeners.push(listener);
    }

    fn remove_abort_listener(&self, listener: &AbortListenerRef) {
        let mut listeners = self.listeners.borrow_mut();
        let removed = listeners
            .iter()
            .position(|existing| same_abort_listener(existing, listener))
            .map(|index| listeners.remove(index));
        drop(listeners);
        drop(removed);
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.aborted.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Owner side of an [`AbortSignal`].
#[derive(Debug)]
pub struct AbortController {
    signal: Rc<AbortSignal>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal::new(),
        }
    }

    pub fn signal(&self) -> Rc<AbortSignal> {
        Rc::clone(&self.signal)
    }

    pub fn abort(&self) {
        self.signal.abort();
    }
}
