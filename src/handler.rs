use std::cell::OnceCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{ContextRole, ListenError};
use crate::realm::{ContextFunctionCache, Realm};
use crate::registry::{Registry, RegistryFactory};

pub(crate) struct HandlerInner<E: ?Sized, O> {
    realm: Realm,
    callback: Box<dyn Fn(&E) -> O>,
    registry: OnceCell<Rc<Registry>>,
}

/// A caller-owned event callback living in a particular realm.
///
/// Registrations made through [`crate::listen`] never hold a `Handler`
/// strongly from the emitter side; once every clone is dropped the handler is
/// gone and its interceptors unregister themselves on their next event.
pub struct Handler<E: ?Sized, O = ()> {
    inner: Rc<HandlerInner<E, O>>,
}

impl<E: ?Sized, O> Handler<E, O> {
    pub fn new(realm: &Realm, callback: impl Fn(&E) -> O + 'static) -> Self {
        Self {
            inner: Rc::new(HandlerInner {
                realm: realm.clone(),
                callback: Box::new(callback),
                registry: OnceCell::new(),
            }),
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.inner.realm
    }

    pub fn call(&self, event: &E) -> O {
        (self.inner.callback)(event)
    }

    pub fn downgrade(&self) -> WeakHandler<E, O> {
        WeakHandler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registrations currently tracked for this handler by [`crate::listen`].
    pub fn active_registrations(&self) -> usize {
        self.inner.registry.get().map_or(0, |registry| registry.len())
    }

    pub(crate) fn registry(&self) -> Option<&Rc<Registry>> {
        self.inner.registry.get()
    }

    /// The handler's registry, built in the handler's realm on first use.
    pub(crate) fn registry_in(&self, cache: &ContextFunctionCache) -> Result<Rc<Registry>, ListenError> {
        if let Some(registry) = self.inner.registry.get() {
            return Ok(Rc::clone(registry));
        }
        let registry = cache
            .get_or_build::<RegistryFactory>(&self.inner.realm)
            .create()
            .ok_or(ListenError::ContextResolution(ContextRole::Handler))?;
        Ok(Rc::clone(self.inner.registry.get_or_init(|| registry)))
    }
}

impl<E: ?Sized, O> Clone for Handler<E, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: ?Sized, O> fmt::Debug for Handler<E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("realm", &self.inner.realm.id())
            .field("active_registrations", &self.active_registrations())
            .finish()
    }
}

/// Non-owning handler reference held by interceptors.
pub struct WeakHandler<E: ?Sized, O = ()> {
    inner: Weak<HandlerInner<E, O>>,
}

impl<E: ?Sized, O> WeakHandler<E, O> {
    pub fn upgrade(&self) -> Option<Handler<E, O>> {
        self.inner.upgrade().map(|inner| Handler { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<E: ?Sized, O> Clone for WeakHandler<E, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<E: ?Sized, O> fmt::Debug for WeakHandler<E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandler")
            .field("alive", &self.is_alive())
            .finish()
    }
}
