//! A plain in-process [`EventEmitter`].
//!
//! Listener semantics follow DOM `EventTarget`: a (listener, event name,
//! capture) triple is registered at most once, capture listeners run before
//! non-capture ones, and a listener removed during dispatch is skipped for
//! the rest of that dispatch. Listeners added during dispatch wait for the
//! next one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::cancellation::{AbortListener, AbortListenerRef, CancellationSignal};
use crate::interceptor::{listener_addr, EventEmitter, ListenerRef};
use crate::options::ListenerOptions;
use crate::realm::Realm;

struct Registration<E: ?Sized, O> {
    event_name: String,
    listener: ListenerRef<E, O>,
    capture: bool,
    passive: bool,
    removed: Cell<bool>,
    abort: RefCell<Option<(Weak<dyn CancellationSignal>, AbortListenerRef)>>,
}

impl<E: ?Sized, O> Registration<E, O> {
    fn matches(&self, event_name: &str, listener: *const (), capture: bool) -> bool {
        self.event_name == event_name
            && listener_addr(&self.listener) == listener
            && self.capture == capture
    }
}

pub struct EventTarget<E: ?Sized + 'static, O: 'static = ()> {
    this: Weak<EventTarget<E, O>>,
    realm: Option<Realm>,
    registrations: RefCell<Vec<Rc<Registration<E, O>>>>,
}

impl<E: ?Sized + 'static, O: 'static> EventTarget<E, O> {
    pub fn new(realm: &Realm) -> Rc<Self> {
        Self::build(Some(realm.clone()))
    }

    /// A target with no resolvable realm.
    pub fn detached() -> Rc<Self> {
        Self::build(None)
    }

    fn build(realm: Option<Realm>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: Weak::clone(this),
            realm,
            registrations: RefCell::new(Vec::new()),
        })
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|registration| registration.event_name == event_name)
            .count()
    }

    /// Whether a passive registration exists for `event_name`.
    pub fn has_passive_listener(&self, event_name: &str) -> bool {
        self.registrations
            .borrow()
            .iter()
            .any(|registration| registration.event_name == event_name && registration.passive)
    }

    /// Deliver `event` to every listener of `event_name` and collect their
    /// outputs.
    pub fn dispatch(&self, event_name: &str, event: &E) -> Vec<O> {
        let snapshot: Vec<_> = {
            let registrations = self.registrations.borrow();
            let (capture, bubble): (Vec<_>, Vec<_>) = registrations
                .iter()
                .filter(|registration| registration.event_name == event_name)
                .cloned()
                .partition(|registration| registration.capture);
            capture.into_iter().chain(bubble).collect()
        };
        trace!(
            target: "weak_listener",
            event_name,
            listeners = snapshot.len(),
            "dispatching event"
        );

        let mut outputs = Vec::new();
        for registration in snapshot {
            if registration.removed.get() {
                continue;
            }
            if let Some(output) = registration.listener.handle_event(event) {
                outputs.push(output);
            }
        }
        outputs
    }

    fn remove_registration(&self, registration: &Rc<Registration<E, O>>) {
        registration.removed.set(true);
        let mut registrations = self.registrations.borrow_mut();
        let removed = registrations
            .iter()
            .position(|entry| Rc::ptr_eq(entry, registration))
            .map(|index| registrations.remove(index));
        drop(registrations);
        let abort = registration.abort.borrow_mut().take();
        if let Some((signal, hook)) = abort {
            if let Some(signal) = signal.upgrade() {
                signal.remove_abort_listener(&hook);
            }
        }
        drop(removed);
    }
}

impl<E: ?Sized + 'static, O: 'static> EventEmitter for EventTarget<E, O> {
    type Event = E;
    type Output = O;

    fn add_listener(&self, event_name: &str, listener: ListenerRef<E, O>, options: &ListenerOptions) {
        if options.is_aborted() {
            return;
        }
        let addr = listener_addr(&listener);
        if self
            .registrations
            .borrow()
            .iter()
            .any(|registration| registration.matches(event_name, addr, options.capture))
        {
            return;
        }

        let registration = Rc::new(Registration {
            event_name: event_name.to_string(),
            listener,
            capture: options.capture,
            passive: options.passive.unwrap_or(false),
            removed: Cell::new(false),
            abort: RefCell::new(None),
        });

        if let Some(signal) = &options.signal {
            let hook: AbortListenerRef = Rc::new(TargetAbortHook {
                target: Weak::clone(&self.this),
                registration: Rc::downgrade(&registration),
            });
            *registration.abort.borrow_mut() = Some((Rc::downgrade(signal), Rc::clone(&hook)));
            signal.add_abort_listener(hook);
        }

        self.registrations.borrow_mut().push(registration);
    }

    fn remove_listener(&self, event_name: &str, listener: &ListenerRef<E, O>, options: &ListenerOptions) {
        let addr = listener_addr(listener);
        let found = self
            .registrations
            .borrow()
            .iter()
            .find(|registration| registration.matches(event_name, addr, options.capture))
            .cloned();
        if let Some(registration) = found {
            self.remove_registration(&registration);
        }
    }

    fn realm(&self) -> Option<Realm> {
        self.realm.clone()
    }
}

impl<E: ?Sized + 'static, O: 'static> fmt::Debug for EventTarget<E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("realm", &self.realm.as_ref().map(Realm::id))
            .field("registrations", &self.registrations.borrow().len())
            .finish()
    }
}

/// Removes a signal-bound registration when its signal fires.
struct TargetAbortHook<E: ?Sized + 'static, O: 'static> {
    target: Weak<EventTarget<E, O>>,
    registration: Weak<Registration<E, O>>,
}

impl<E: ?Sized + 'static, O: 'static> AbortListener for TargetAbortHook<E, O> {
    fn on_abort(&self) {
        if let (Some(target), Some(registration)) = (self.target.upgrade(), self.registration.upgrade()) {
            target.remove_registration(&registration);
        }
    }
}
