//! Derived views of a [`Node`] state tree.
//!
//! A view is addressed by a list of path segments. The segments are walked
//! from the root on every root emission and the node found there is
//! republished through the view's own deduplicating cell, so view
//! subscribers only hear about changes under their branch.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::action::Action;
use crate::broadcast::{Broadcast, StateStream, SubscriptionId};
use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::store::{Dispatch, Store};

pub const PATH_SEPARATOR: &str = "/";

/// Cache key for a path: whitespace stripped, lower-cased, `/`-joined.
///
/// A `/` inside a segment is escaped as `%2f` (and `%` as `%25`), so
/// `["a/b"]` and `["a", "b"]` get different keys.
pub fn path_key<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| {
            s.as_ref()
                .chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(char::to_lowercase)
                .collect::<String>()
                .replace('%', "%25")
                .replace(PATH_SEPARATOR, "%2f")
        })
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Walk `segments` down from `root`.
///
/// Every step must land on a composite that has the next segment as a
/// child. An empty path resolves to `root` itself.
pub fn resolve<'a, S: AsRef<str>>(root: &'a Node, segments: &[S]) -> Result<&'a Node> {
    segments.iter().try_fold(root, |node, segment| {
        node.child(segment.as_ref())
            .ok_or_else(|| StoreError::PathNotFound {
                node: node.clone(),
                segment: segment.as_ref().to_string(),
            })
    })
}

/// A read view over one branch of a store's state, plus the store's
/// dispatch.
pub struct DerivedView<A> {
    name: String,
    key: String,
    view: Broadcast<Node>,
    send: Dispatch<A>,
}

impl<A: Action> DerivedView<A> {
    /// Last path segment, or `""` for the root view.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized path this view is cached under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The current node at this view's path.
    pub fn get(&self) -> Arc<Node> {
        self.view.latest()
    }

    /// Register a listener. It receives the current node immediately, then
    /// each distinct node at this path.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<Node>) + Send + Sync + 'static,
    {
        self.view.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.view.unsubscribe(id)
    }

    pub fn states(&self) -> StateStream<Node> {
        self.view.watch()
    }

    /// Dispatch to the root store.
    pub fn send(&self, action: A) -> Result<()> {
        self.send.send(action)
    }

    pub fn dispatcher(&self) -> Dispatch<A> {
        self.send.clone()
    }
}

impl<A> std::fmt::Debug for DerivedView<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedView").field("key", &self.key).finish()
    }
}

/// Builds and caches derived views over one store.
pub struct PathResolver<A> {
    store: Store<Node, A>,
    cache: Mutex<HashMap<String, Arc<DerivedView<A>>>>,
}

impl<A: Action> PathResolver<A> {
    /// Create a resolver with an empty view cache.
    pub fn new(store: Store<Node, A>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The root store views are derived from.
    pub fn store(&self) -> &Store<Node, A> {
        &self.store
    }

    /// Return the view for `segments`, building it on first use.
    ///
    /// Paths that normalize to the same key share one view. Fails with
    /// `PathNotFound` if the path does not resolve against the current
    /// root state.
    pub fn derive<S: AsRef<str>>(&self, segments: &[S]) -> Result<Arc<DerivedView<A>>> {
        let key = path_key(segments);
        let mut cache = self.cache.lock();
        if let Some(view) = cache.get(&key) {
            return Ok(Arc::clone(view));
        }

        let root = self.store.get_state();
        let initial = resolve(&root, segments)?.clone();
        let segments: Vec<String> = segments.iter().map(|s| s.as_ref().to_string()).collect();
        let view = Arc::new(DerivedView {
            name: segments.last().cloned().unwrap_or_default(),
            key: key.clone(),
            view: Broadcast::new(initial),
            send: self.store.dispatcher(),
        });

        let weak: Weak<DerivedView<A>> = Arc::downgrade(&view);
        self.store.subscribe_while(move |root| {
            let Some(view) = weak.upgrade() else {
                return false;
            };
            match resolve(root, segments.as_slice()) {
                Ok(node) => {
                    view.view.publish(node.clone());
                }
                Err(err) => {
                    warn!(
                        path = %view.key,
                        error = %err,
                        "view path no longer resolves, keeping last value"
                    );
                }
            }
            true
        });

        debug!(path = %key, "derived view created");
        cache.insert(key, Arc::clone(&view));
        Ok(view)
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
