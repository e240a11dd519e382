//! Cancellation signals and the handler-side listener that tears a
//! registration down.
//!
//! Object graph for one implicit registration with a signal:
//!
//! ```text
//! signal ──► AbortHook ──► CancellationListener ─ ─► Interceptor (weak)
//!                 │                  │ ─ ─► Registry (weak)
//!                 ▼                  │ ─ ─► signal, hook (weak)
//!              Handler ──► Registry ─┘ (strong, owns the listener)
//! ```
//!
//! The handler stays alive exactly as long as a live signal holds its hook.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::handler::Handler;
use crate::interceptor::InterceptorLink;
use crate::realm::{ContextBuilder, Realm, RealmAllocation, WeakRealm};
use crate::registry::Registry;

/// Notified once when a signal fires.
pub trait AbortListener {
    fn on_abort(&self);
}

pub type AbortListenerRef = Rc<dyn AbortListener>;

/// A one-shot cancellation source.
///
/// Implementations must not hold a `RefCell` borrow while running abort
/// listeners; listeners remove themselves from the signal while it fires.
pub trait CancellationSignal {
    fn aborted(&self) -> bool;
    fn add_abort_listener(&self, listener: AbortListenerRef);
    fn remove_abort_listener(&self, listener: &AbortListenerRef);
}

pub type SignalRef = Rc<dyn CancellationSignal>;

pub fn same_signal(a: &SignalRef, b: &SignalRef) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

pub fn same_abort_listener(a: &AbortListenerRef, b: &AbortListenerRef) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// Tears down one implicit registration, from a signal or from `unlisten`.
pub struct CancellationListener {
    interceptor: Weak<dyn InterceptorLink>,
    registry: Weak<Registry>,
    signal: Option<Weak<dyn CancellationSignal>>,
    hook: RefCell<Option<Weak<dyn AbortListener>>>,
    allocation: RealmAllocation,
}

impl CancellationListener {
    pub fn realm(&self) -> &Realm {
        self.allocation.realm()
    }

    /// Remove this listener from its registry, detach it from its signal and
    /// unregister its interceptor. Safe to call more than once.
    pub fn invoke(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }

        let hook = self.hook.borrow_mut().take();
        let signal = self.signal.as_ref().and_then(Weak::upgrade);
        if let (Some(signal), Some(hook)) = (signal, hook.as_ref().and_then(Weak::upgrade)) {
            signal.remove_abort_listener(&hook);
        }

        if let Some(interceptor) = self.interceptor.upgrade() {
            interceptor.unregister();
        }
    }

    pub(crate) fn matches(&self, emitter: *const (), event_name: &str, capture: bool) -> bool {
        self.interceptor
            .upgrade()
            .is_some_and(|interceptor| interceptor.matches(emitter, event_name, capture))
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.interceptor
            .upgrade()
            .map_or(true, |interceptor| !interceptor.is_active())
    }
}

impl fmt::Debug for CancellationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationListener")
            .field("interceptor_alive", &(self.interceptor.strong_count() > 0))
            .field("has_signal", &self.signal.is_some())
            .field("realm", &self.allocation.realm().id())
            .finish()
    }
}

/// What a signal actually holds: the listener plus a strong handler edge.
struct AbortHook<E: ?Sized, O> {
    listener: Rc<CancellationListener>,
    _handler: Handler<E, O>,
}

impl<E: ?Sized, O> AbortListener for AbortHook<E, O> {
    fn on_abort(&self) {
        self.listener.invoke();
    }
}

/// Builds cancellation listeners inside a handler's realm.
pub struct CancellationListenerFactory {
    realm: WeakRealm,
}

impl ContextBuilder for CancellationListenerFactory {
    fn compile(realm: &Realm) -> Self {
        Self {
            realm: realm.downgrade(),
        }
    }
}

impl CancellationListenerFactory {
    /// Create a listener and, when a signal is given, hook it into the signal.
    ///
    /// `None` when the factory's realm no longer exists.
    pub(crate) fn create<E, O>(
        &self,
        handler: &Handler<E, O>,
        registry: &Rc<Registry>,
        interceptor: Weak<dyn InterceptorLink>,
        signal: Option<&SignalRef>,
    ) -> Option<Rc<CancellationListener>>
    where
        E: ?Sized + 'static,
        O: 'static,
    {
        let realm = self.realm.upgrade()?;
        let listener = Rc::new(CancellationListener {
            interceptor,
            registry: Rc::downgrade(registry),
            signal: signal.map(Rc::downgrade),
            hook: RefCell::new(None),
            allocation: RealmAllocation::new(realm),
        });

        if let Some(signal) = signal {
            let hook: AbortListenerRef = Rc::new(AbortHook {
                listener: Rc::clone(&listener),
                _handler: handler.clone(),
            });
            *listener.hook.borrow_mut() = Some(Rc::downgrade(&hook));
            signal.add_abort_listener(hook);
        }

        Some(listener)
    }
}
