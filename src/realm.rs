//! Allocation contexts and the per-context builder cache.
//!
//! A [`Realm`] stands for an isolated allocation context: every helper object
//! the crate creates carries a [`RealmAllocation`] tag for the realm it was
//! built in. Builders are "compiled" inside a realm through [`ContextBuilder`]
//! and memoised per realm by [`ContextFunctionCache`], so a registration that
//! spans two realms always receives realm-local builders.
//!
//! Neither the cache nor the builders hold a realm strongly: entries are keyed
//! by [`WeakRealm`] and pruned once their realm is gone.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique realm identity. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealmId(u64);

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "realm#{}", self.0)
    }
}

struct RealmInner {
    id: RealmId,
    name: String,
    live_allocations: Cell<usize>,
}

/// Handle to an allocation context. Clones share identity.
#[derive(Clone)]
pub struct Realm {
    inner: Rc<RealmInner>,
}

impl Realm {
    pub fn new(name: impl Into<String>) -> Self {
        let id = RealmId(NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Rc::new(RealmInner {
                id,
                name: name.into(),
                live_allocations: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> RealmId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of helper objects currently alive that were built in this realm.
    pub fn live_allocations(&self) -> usize {
        self.inner.live_allocations.get()
    }

    pub fn downgrade(&self) -> WeakRealm {
        WeakRealm {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Realm) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Realm {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Realm {}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("live_allocations", &self.inner.live_allocations.get())
            .finish()
    }
}

/// Non-owning realm handle.
#[derive(Clone)]
pub struct WeakRealm {
    id: RealmId,
    inner: Weak<RealmInner>,
}

impl WeakRealm {
    pub fn id(&self) -> RealmId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Realm> {
        self.inner.upgrade().map(|inner| Realm { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRealm")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Tag carried by every helper object, counting it against its realm.
pub struct RealmAllocation {
    realm: Realm,
}

impl RealmAllocation {
    pub fn new(realm: Realm) -> Self {
        let live = &realm.inner.live_allocations;
        live.set(live.get() + 1);
        Self { realm }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }
}

impl Drop for RealmAllocation {
    fn drop(&mut self) {
        let live = &self.realm.inner.live_allocations;
        live.set(live.get().saturating_sub(1));
    }
}

impl fmt::Debug for RealmAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RealmAllocation")
            .field(&self.realm.id())
            .finish()
    }
}

/// A builder synthesised inside a specific realm.
///
/// Implementations must keep only a [`WeakRealm`]; holding the realm strongly
/// would let the cache pin it.
pub trait ContextBuilder: Any {
    fn compile(realm: &Realm) -> Self;
}

struct CacheEntry {
    realm: WeakRealm,
    builder: Rc<dyn Any>,
}

/// Memoised [`ContextBuilder`]s, one per (realm, builder type).
#[derive(Default)]
pub struct ContextFunctionCache {
    entries: RefCell<HashMap<(RealmId, TypeId), CacheEntry>>,
}

thread_local! {
    static GLOBAL_CACHE: ContextFunctionCache = ContextFunctionCache::new();
}

impl ContextFunctionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the thread's shared cache.
    pub fn with_global<R>(f: impl FnOnce(&ContextFunctionCache) -> R) -> R {
        GLOBAL_CACHE.with(f)
    }

    /// Return the builder `B` compiled in `realm`, compiling it on first use.
    pub fn get_or_build<B: ContextBuilder>(&self, realm: &Realm) -> Rc<B> {
        let key = (realm.id(), TypeId::of::<B>());
        let cached = self
            .entries
            .borrow()
            .get(&key)
            .map(|entry| Rc::clone(&entry.builder));
        if let Some(builder) = cached.and_then(|builder| builder.downcast::<B>().ok()) {
            return builder;
        }

        let builder = Rc::new(B::compile(realm));
        let erased: Rc<dyn Any> = builder.clone();

        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, entry| entry.realm.is_alive());
        entries.insert(
            key,
            CacheEntry {
                realm: realm.downgrade(),
                builder: erased,
            },
        );
        trace!(
            target: "weak_listener",
            realm = %realm.id(),
            builder = std::any::type_name::<B>(),
            "compiled context builder"
        );
        builder
    }

    /// Number of cached builders whose realm is still alive.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|entry| entry.realm.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
