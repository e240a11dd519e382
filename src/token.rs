//! Explicit registrations: `listen` hands back a [`RegistrationToken`] and
//! `unlisten` takes it.
//!
//! No per-handler bookkeeping is kept. The token holds the interceptor and
//! the handler strongly, so a registration lives as long as its token; once
//! both the token and every other handler clone are dropped, the interceptor
//! unregisters itself on its next event.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::ListenError;
use crate::handler::Handler;
use crate::interceptor::{EventEmitter, Interceptor, InterceptorState};
use crate::listen::{admit, build_interceptor};
use crate::options::{normalize, OptionsArg};
use crate::realm::ContextFunctionCache;

/// Opaque handle to one explicit registration.
pub struct RegistrationToken<T: EventEmitter> {
    interceptor: Rc<Interceptor<T>>,
    handler: Handler<T::Event, T::Output>,
}

impl<T: EventEmitter> RegistrationToken<T> {
    pub fn handler(&self) -> &Handler<T::Event, T::Output> {
        &self.handler
    }

    pub fn event_name(&self) -> &str {
        self.interceptor.event_name()
    }

    pub fn capture(&self) -> bool {
        self.interceptor.capture()
    }

    /// False once [`unlisten`] has run or the interceptor removed itself
    /// (dropped handler or a `once` delivery). Removal done by the emitter
    /// on its own, such as through a forwarded signal, is not observed.
    pub fn is_active(&self) -> bool {
        self.interceptor.state() == InterceptorState::Active
    }
}

impl<T: EventEmitter> fmt::Debug for RegistrationToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationToken")
            .field("interceptor", &self.interceptor)
            .finish()
    }
}

/// Register `handler` for `event_name` on `emitter` and return a token for
/// [`unlisten`].
///
/// Options, including any signal, are forwarded to the emitter unchanged.
/// Returns `Ok(None)` when the handler is absent or the signal has already
/// fired.
pub fn listen<'h, 'o, T: EventEmitter>(
    emitter: &Rc<T>,
    event_name: &str,
    handler: impl Into<Option<&'h Handler<T::Event, T::Output>>>,
    options: impl Into<OptionsArg<'o>>,
) -> Result<Option<RegistrationToken<T>>, ListenError> {
    let options = normalize(options);
    let Some(handler) = admit(event_name, handler.into(), &options) else {
        return Ok(None);
    };

    let interceptor = ContextFunctionCache::with_global(|cache| {
        build_interceptor(cache, emitter, handler, event_name, &options)
    })?;
    debug!(
        target: "weak_listener",
        event_name,
        capture = options.capture,
        emitter_realm = %interceptor.realm().id(),
        "registered token listener"
    );
    emitter.add_listener(event_name, interceptor.clone(), &options);

    Ok(Some(RegistrationToken {
        interceptor,
        handler: handler.clone(),
    }))
}

/// Remove the registration behind `token`. Later calls do nothing.
pub fn unlisten<T: EventEmitter>(token: &RegistrationToken<T>) {
    token.interceptor.unregister();
}
