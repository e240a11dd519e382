//! The object actually registered with an emitter.
//!
//! An [`Interceptor`] stands in for a [`Handler`] on the emitter's listener
//! list. It reaches the handler only through a [`WeakHandler`]: while the
//! handler is alive every event is forwarded unchanged, and the first event
//! after the handler has been dropped makes the interceptor remove itself.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::handler::{Handler, WeakHandler};
use crate::options::ListenerOptions;
use crate::realm::{ContextBuilder, Realm, RealmAllocation, WeakRealm};

/// Something an emitter can deliver events to.
pub trait EventListener<E: ?Sized, O = ()> {
    /// Deliver one event. `None` means nothing was forwarded.
    fn handle_event(&self, event: &E) -> Option<O>;
}

pub type ListenerRef<E, O = ()> = Rc<dyn EventListener<E, O>>;

/// The add/remove-listener capability of an event source.
///
/// Implementations identify listeners by `Rc` address together with the
/// event name and capture flag, and must not hold a `RefCell` borrow while
/// calling into a listener: interceptors remove themselves mid-dispatch.
pub trait EventEmitter: 'static {
    type Event: ?Sized + 'static;
    type Output: 'static;

    fn add_listener(
        &self,
        event_name: &str,
        listener: ListenerRef<Self::Event, Self::Output>,
        options: &ListenerOptions,
    );

    fn remove_listener(
        &self,
        event_name: &str,
        listener: &ListenerRef<Self::Event, Self::Output>,
        options: &ListenerOptions,
    );

    /// The realm this emitter was allocated in, if it can be determined.
    fn realm(&self) -> Option<Realm>;
}

/// Address of a listener, ignoring the vtable.
pub fn listener_addr<E: ?Sized, O>(listener: &ListenerRef<E, O>) -> *const () {
    Rc::as_ptr(listener) as *const ()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    Active,
    Unregistered,
}

pub struct Interceptor<T: EventEmitter> {
    this: Weak<Interceptor<T>>,
    handler: WeakHandler<T::Event, T::Output>,
    // Weak: the emitter already owns this interceptor.
    emitter: Weak<T>,
    event_name: String,
    capture: bool,
    once: bool,
    state: Cell<InterceptorState>,
    allocation: RealmAllocation,
}

impl<T: EventEmitter> Interceptor<T> {
    pub fn state(&self) -> InterceptorState {
        self.state.get()
    }

    pub fn realm(&self) -> &Realm {
        self.allocation.realm()
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn capture(&self) -> bool {
        self.capture
    }

    pub fn handler(&self) -> Option<Handler<T::Event, T::Output>> {
        self.handler.upgrade()
    }

    /// Remove this interceptor from its emitter. Later calls do nothing.
    pub fn unregister(&self) {
        if self.state.replace(InterceptorState::Unregistered) == InterceptorState::Unregistered {
            return;
        }
        let (Some(emitter), Some(this)) = (self.emitter.upgrade(), self.this.upgrade()) else {
            return;
        };
        let listener: ListenerRef<T::Event, T::Output> = this;
        emitter.remove_listener(
            &self.event_name,
            &listener,
            &ListenerOptions::new().with_capture(self.capture),
        );
    }
}

impl<T: EventEmitter> EventListener<T::Event, T::Output> for Interceptor<T> {
    fn handle_event(&self, event: &T::Event) -> Option<T::Output> {
        if self.state.get() == InterceptorState::Unregistered {
            return None;
        }
        let Some(handler) = self.handler.upgrade() else {
            debug!(
                target: "weak_listener",
                event_name = %self.event_name,
                capture = self.capture,
                "handler dropped; interceptor unregistering"
            );
            self.unregister();
            return None;
        };
        if self.once {
            self.unregister();
        }
        Some(handler.call(event))
    }
}

impl<T: EventEmitter> fmt::Debug for Interceptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("event_name", &self.event_name)
            .field("capture", &self.capture)
            .field("once", &self.once)
            .field("state", &self.state.get())
            .field("handler_alive", &self.handler.is_alive())
            .field("realm", &self.allocation.realm().id())
            .finish()
    }
}

/// Emitter-agnostic view of an interceptor, used by the handler-side registry.
pub(crate) trait InterceptorLink {
    fn matches(&self, emitter: *const (), event_name: &str, capture: bool) -> bool;
    fn is_active(&self) -> bool;
    fn unregister(&self);
}

impl<T: EventEmitter> InterceptorLink for Interceptor<T> {
    fn matches(&self, emitter: *const (), event_name: &str, capture: bool) -> bool {
        self.emitter.as_ptr() as *const () == emitter
            && self.event_name == event_name
            && self.capture == capture
    }

    fn is_active(&self) -> bool {
        self.state.get() == InterceptorState::Active
    }

    fn unregister(&self) {
        Interceptor::unregister(self);
    }
}

/// Builds interceptors for emitters of type `T` inside the emitter's realm.
pub struct InterceptorFactory<T> {
    realm: WeakRealm,
    _emitter: PhantomData<fn() -> T>,
}

impl<T: EventEmitter> ContextBuilder for InterceptorFactory<T> {
    fn compile(realm: &Realm) -> Self {
        Self {
            realm: realm.downgrade(),
            _emitter: PhantomData,
        }
    }
}

impl<T: EventEmitter> InterceptorFactory<T> {
    /// `None` when the factory's realm no longer exists.
    pub(crate) fn create(
        &self,
        emitter: &Rc<T>,
        handler: &Handler<T::Event, T::Output>,
        event_name: &str,
        options: &ListenerOptions,
    ) -> Option<Rc<Interceptor<T>>> {
        let realm = self.realm.upgrade()?;
        Some(Rc::new_cyclic(|this| Interceptor {
            this: Weak::clone(this),
            handler: handler.downgrade(),
            emitter: Rc::downgrade(emitter),
            event_name: event_name.to_string(),
            capture: options.capture,
            once: options.is_once(),
            state: Cell::new(InterceptorState::Active),
            allocation: RealmAllocation::new(realm),
        }))
    }
}
