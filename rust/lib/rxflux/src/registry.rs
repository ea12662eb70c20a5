//! Scoped store lookup.
//!
//! A scope is an explicit token standing in for a position in a component
//! tree. Exactly one store can be provided per scope; consumers look it up by
//! state and action type. Each scope also owns the derived-view cache for its
//! store, created on the first `derive_view` and dropped with the scope.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::action::Action;
use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::path::{DerivedView, PathResolver};
use crate::payload::Payload;
use crate::store::{State, Store};

/// Handle for an open scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Default)]
struct ScopeEntry {
    /// A `Store<S, A>`.
    store: Option<Payload>,
    /// An `Arc<PathResolver<A>>` over the scope's `Node` store.
    views: Option<Payload>,
}

/// Registry of scopes and the store provided in each.
pub struct StoreRegistry {
    scopes: RwLock<HashMap<ScopeId, ScopeEntry>>,
    next_id: AtomicU64,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a new, empty scope.
    pub fn open_scope(&self) -> ScopeId {
        let id = ScopeId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.scopes.write().insert(id, ScopeEntry::default());
        debug!(scope = %id, "scope opened");
        id
    }

    /// Drop the scope along with its store handle and view cache.
    /// Returns `false` if it was not open.
    pub fn close_scope(&self, scope: ScopeId) -> bool {
        let removed = self.scopes.write().remove(&scope).is_some();
        if removed {
            debug!(scope = %scope, "scope closed");
        }
        removed
    }

    /// Whether `scope` has been opened and not yet closed.
    pub fn is_open(&self, scope: ScopeId) -> bool {
        self.scopes.read().contains_key(&scope)
    }

    /// Associate `store` with `scope`, replacing (and clearing the views of)
    /// any store provided earlier.
    pub fn provide<S: State, A: Action>(&self, scope: ScopeId, store: Store<S, A>) -> Result<()> {
        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&scope).ok_or(StoreError::UnknownScope(scope))?;
        let replaced = entry.store.replace(Payload::new(store)).is_some();
        entry.views = None;
        debug!(scope = %scope, replaced, store = type_name::<S>(), "store provided");
        Ok(())
    }

    /// The store provided in `scope`.
    pub fn use_store<S: State, A: Action>(&self, scope: ScopeId) -> Result<Store<S, A>> {
        let scopes = self.scopes.read();
        let entry = scopes.get(&scope).ok_or(StoreError::UnknownScope(scope))?;
        let store = entry
            .store
            .as_ref()
            .ok_or(StoreError::MissingProvider { scope })?;
        store
            .downcast_ref::<Store<S, A>>()
            .cloned()
            .ok_or(StoreError::StoreTypeMismatch {
                scope,
                expected: type_name::<Store<S, A>>(),
            })
    }

    /// A view over one branch of the scope's `Node` store. Views are cached
    /// per scope by normalized path.
    pub fn derive_view<A: Action, P: AsRef<str>>(
        &self,
        scope: ScopeId,
        segments: &[P],
    ) -> Result<Arc<DerivedView<A>>> {
        self.resolver::<A>(scope)?.derive(segments)
    }

    fn resolver<A: Action>(&self, scope: ScopeId) -> Result<Arc<PathResolver<A>>> {
        if let Some(resolver) = self.cached_resolver::<A>(scope)? {
            return Ok(resolver);
        }

        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&scope).ok_or(StoreError::UnknownScope(scope))?;
        // Raced with another caller between the read and write locks.
        if let Some(resolver) = entry
            .views
            .as_ref()
            .and_then(|v| v.downcast_ref::<Arc<PathResolver<A>>>())
        {
            return Ok(Arc::clone(resolver));
        }

        let store = entry
            .store
            .as_ref()
            .ok_or(StoreError::MissingProvider { scope })?
            .downcast_ref::<Store<Node, A>>()
            .cloned()
            .ok_or(StoreError::StoreTypeMismatch {
                scope,
                expected: type_name::<Store<Node, A>>(),
            })?;
        let resolver = Arc::new(PathResolver::new(store));
        entry.views = Some(Payload::new(Arc::clone(&resolver)));
        debug!(scope = %scope, "view cache created");
        Ok(resolver)
    }

    fn cached_resolver<A: Action>(&self, scope: ScopeId) -> Result<Option<Arc<PathResolver<A>>>> {
        let scopes = self.scopes.read();
        let entry = scopes.get(&scope).ok_or(StoreError::UnknownScope(scope))?;
        Ok(entry
            .views
            .as_ref()
            .and_then(|v| v.downcast_ref::<Arc<PathResolver<A>>>())
            .cloned())
    }

    /// Number of open scopes.
    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.read().is_empty()
    }
}
