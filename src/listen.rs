//! Implicit registrations: `listen` / `unlisten` looked up by identity.
//!
//! Each registration is tracked in the handler's own [`Registry`], so
//! `unlisten` takes the same arguments as `listen`, an identical `listen`
//! is a no-op, and a cancellation signal in the options tears the
//! registration down when it fires.
//!
//! [`Registry`]: crate::registry::Registry

use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::cancellation::CancellationListenerFactory;
use crate::error::{ContextRole, ListenError};
use crate::handler::Handler;
use crate::interceptor::{EventEmitter, Interceptor, InterceptorFactory, InterceptorLink};
use crate::options::{normalize, ListenerOptions, OptionsArg};
use crate::realm::ContextFunctionCache;

/// The handler to register, or `None` when registration should be skipped.
pub(crate) fn admit<'h, E: ?Sized, O>(
    event_name: &str,
    handler: Option<&'h Handler<E, O>>,
    options: &ListenerOptions,
) -> Option<&'h Handler<E, O>> {
    let Some(handler) = handler else {
        trace!(target: "weak_listener", event_name, "no handler; nothing to register");
        return None;
    };
    if options.is_aborted() {
        debug!(target: "weak_listener", event_name, "signal already aborted; not registering");
        return None;
    }
    Some(handler)
}

/// Build an interceptor in the emitter's realm.
pub(crate) fn build_interceptor<T: EventEmitter>(
    cache: &ContextFunctionCache,
    emitter: &Rc<T>,
    handler: &Handler<T::Event, T::Output>,
    event_name: &str,
    options: &ListenerOptions,
) -> Result<Rc<Interceptor<T>>, ListenError> {
    let realm = emitter
        .realm()
        .ok_or(ListenError::ContextResolution(ContextRole::Emitter))?;
    cache
        .get_or_build::<InterceptorFactory<T>>(&realm)
        .create(emitter, handler, event_name, options)
        .ok_or(ListenError::ContextResolution(ContextRole::Emitter))
}

pub(crate) fn emitter_addr<T>(emitter: &Rc<T>) -> *const () {
    Rc::as_ptr(emitter) as *const ()
}

/// Register `handler` for `event_name` on `emitter` without letting the
/// emitter keep the handler alive.
///
/// Registering an identical (emitter, event name, handler, capture) tuple
/// again does nothing. An absent handler or an already aborted signal also
/// does nothing. Fails only when a realm cannot be resolved.
pub fn listen<'h, 'o, T: EventEmitter>(
    emitter: &Rc<T>,
    event_name: &str,
    handler: impl Into<Option<&'h Handler<T::Event, T::Output>>>,
    options: impl Into<OptionsArg<'o>>,
) -> Result<(), ListenError> {
    let options = normalize(options);
    let Some(handler) = admit(event_name, handler.into(), &options) else {
        return Ok(());
    };

    ContextFunctionCache::with_global(|cache| -> Result<(), ListenError> {
        let registry = handler.registry_in(cache)?;
        let stale = registry.take_stale();
        if !stale.is_empty() {
            trace!(target: "weak_listener", count = stale.len(), "releasing stale registrations");
        }
        for listener in stale {
            listener.invoke();
        }

        if registry
            .find(emitter_addr(emitter), event_name, options.capture)
            .is_some()
        {
            debug!(
                target: "weak_listener",
                event_name,
                capture = options.capture,
                "duplicate registration ignored"
            );
            return Ok(());
        }

        // `once` is not supported here; the emitter sees neither it nor the signal.
        let forwarded = options.for_interceptor();
        let interceptor = build_interceptor(cache, emitter, handler, event_name, &forwarded)?;
        let link = Rc::downgrade(&interceptor);
        let link: Weak<dyn InterceptorLink> = link;
        let listener = cache
            .get_or_build::<CancellationListenerFactory>(handler.realm())
            .create(handler, &registry, link, options.signal.as_ref())
            .ok_or(ListenError::ContextResolution(ContextRole::Handler))?;
        registry.insert(listener);

        debug!(
            target: "weak_listener",
            event_name,
            capture = options.capture,
            emitter_realm = %interceptor.realm().id(),
            handler_realm = %handler.realm().id(),
            "registered weak listener"
        );
        emitter.add_listener(event_name, interceptor, &forwarded);
        Ok(())
    })
}

/// Undo a registration made by [`listen`] with the same arguments.
///
/// Does nothing if no such registration is active.
pub fn unlisten<'h, 'o, T: EventEmitter>(
    emitter: &Rc<T>,
    event_name: &str,
    handler: impl Into<Option<&'h Handler<T::Event, T::Output>>>,
    options: impl Into<OptionsArg<'o>>,
) {
    let options = normalize(options);
    let Some(registry) = handler.into().and_then(Handler::registry) else {
        return;
    };
    let Some(listener) = registry.find(emitter_addr(emitter), event_name, options.capture) else {
        trace!(target: "weak_listener", event_name, "no matching registration");
        return;
    };
    listener.invoke();
}
