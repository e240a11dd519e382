//! Weakly held event listeners.
//!
//! [`listen`] registers a [`Handler`] with an [`EventEmitter`] through an
//! [`Interceptor`] that refers to the handler only weakly. A handler that is
//! dropped without being unregistered costs the emitter one small
//! interceptor, which removes itself on the next event it sees.
//!
//! Two registration styles share the same machinery:
//!
//! - [`listen`] / [`unlisten`]: lookup by (emitter, event name, handler,
//!   capture), duplicate suppression, and cancellation through a
//!   [`CancellationSignal`] in the options.
//! - [`token::listen`] / [`token::unlisten`]: an explicit
//!   [`RegistrationToken`] and no per-handler bookkeeping.
//!
//! Helper objects are always built in the [`Realm`] of the object they are
//! attached to: interceptors in the emitter's realm, cancellation
//! bookkeeping in the handler's realm.

pub mod cancellation;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod listen;
pub mod options;
pub mod realm;
pub mod registry;
pub mod signal;
pub mod target;
pub mod token;

pub use cancellation::{AbortListener, CancellationListener, CancellationSignal, SignalRef};
pub use error::{ContextRole, ListenError};
pub use handler::{Handler, WeakHandler};
pub use interceptor::{EventEmitter, EventListener, Interceptor, InterceptorState, ListenerRef};
pub use listen::{listen, unlisten};
pub use options::{normalize, ListenerOptions, OptionsArg};
pub use realm::{ContextBuilder, ContextFunctionCache, Realm, RealmId, WeakRealm};
pub use signal::{AbortController, AbortSignal};
pub use target::EventTarget;
pub use token::RegistrationToken;
