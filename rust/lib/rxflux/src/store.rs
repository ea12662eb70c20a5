use std::fmt;
use std::sync::Arc;

use futures::stream::Stream;

use crate::action::{Action, Message};
use crate::broadcast::{StateStream, SubscriptionId};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::middleware::ChainCell;
use crate::pipeline::{Pipeline, Reducer};

/// Marker for types a store can hold.
///
/// `PartialEq` is the store's equality rule: a fold that yields a state
/// equal to the current one notifies nobody.
pub trait State: PartialEq + Send + Sync + 'static {}

impl<T: PartialEq + Send + Sync + 'static> State for T {}

/// A cloneable dispatch function.
///
/// The store's own terminal dispatch never fails; middleware may.
pub struct Dispatch<A> {
    inner: Arc<dyn Fn(Message<A>) -> Result<()> + Send + Sync>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Action> Dispatch<A> {
    /// Wrap a closure as a dispatch.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Message<A>) -> Result<()> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Dispatch a plain action or a stream.
    pub fn call(&self, message: Message<A>) -> Result<()> {
        (self.inner)(message)
    }

    /// Dispatch one plain action.
    pub fn send(&self, action: A) -> Result<()> {
        self.call(Message::Action(action))
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch")
    }
}

/// Handle to a state container.
///
/// Cheap to clone; every clone drives the same state. `dispatch` runs the
/// middleware chain (if any) and folds the action before returning, so the
/// transition is visible to `get_state` right away. The exception is a
/// dispatch made while a fold is already in progress, from a listener or
/// from another thread: the action is queued and folded by the caller that
/// is already draining, possibly after this `dispatch` has returned.
pub struct Store<S, A> {
    pipeline: Arc<Pipeline<S, A>>,
    dispatch: Dispatch<A>,
    /// Keeps the middleware chain alive for the API handles that point at it.
    _chain: Option<Arc<ChainCell<A>>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            dispatch: self.dispatch.clone(),
            _chain: self._chain.clone(),
        }
    }
}

impl<S: State, A: Action> Store<S, A> {
    pub(crate) fn from_parts(
        pipeline: Arc<Pipeline<S, A>>,
        dispatch: Dispatch<A>,
        chain: Option<Arc<ChainCell<A>>>,
    ) -> Self {
        Self {
            pipeline,
            dispatch,
            _chain: chain,
        }
    }

    /// The pipeline's own dispatch, with no middleware in front of it.
    pub(crate) fn terminal(pipeline: &Arc<Pipeline<S, A>>) -> Dispatch<A> {
        let pipeline = Arc::clone(pipeline);
        Dispatch::new(move |message| {
            pipeline.accept(message);
            Ok(())
        })
    }

    /// The most recently produced state.
    pub fn get_state(&self) -> Arc<S> {
        self.pipeline.states.latest()
    }

    /// Dispatch a plain action or a [`Message`].
    pub fn dispatch(&self, message: impl Into<Message<A>>) -> Result<()> {
        self.dispatch.call(message.into())
    }

    /// Dispatch a stream of actions. It replaces any stream still running.
    pub fn dispatch_stream<St>(&self, stream: St) -> Result<()>
    where
        St: Stream<Item = A> + Send + 'static,
    {
        self.dispatch.call(Message::stream(stream))
    }

    /// A standalone handle to this store's (composed) dispatch.
    pub fn dispatcher(&self) -> Dispatch<A> {
        self.dispatch.clone()
    }

    /// Register a listener. It receives the latest state immediately, then
    /// each distinct state after that.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        self.pipeline.states.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.pipeline.states.unsubscribe(id)
    }

    pub(crate) fn subscribe_while<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<S>) -> bool + Send + Sync + 'static,
    {
        self.pipeline.states.subscribe_while(listener)
    }

    /// Async stream of states, starting with the latest.
    pub fn states(&self) -> StateStream<S> {
        self.pipeline.states.watch()
    }

    /// The `(states, dispatch)` pair.
    pub fn split(&self) -> (StateStream<S>, Dispatch<A>) {
        (self.states(), self.dispatcher())
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> &StoreConfig {
        self.pipeline.config()
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &std::any::type_name::<S>())
            .field("middleware", &self._chain.is_some())
            .finish()
    }
}

/// Create a store with the default configuration and no middleware.
pub fn create_store<S, A, R>(reducer: R, initial: S) -> Store<S, A>
where
    S: State,
    A: Action,
    R: Fn(&A, &S) -> S + Send + Sync + 'static,
{
    create_store_with_config(reducer, initial, StoreConfig::default())
}

pub fn create_store_with_config<S, A, R>(reducer: R, initial: S, config: StoreConfig) -> Store<S, A>
where
    S: State,
    A: Action,
    R: Fn(&A, &S) -> S + Send + Sync + 'static,
{
    let reducer: Reducer<S, A> = Arc::new(reducer);
    let pipeline = Pipeline::new(reducer, initial, config);
    let dispatch = Store::terminal(&pipeline);
    Store::from_parts(pipeline, dispatch, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Msg;
    use futures::StreamExt;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        count: i64,
    }

    fn reducer(action: &Msg, state: &Counter) -> Counter {
        match action.tag() {
            "increment" => Counter {
                count: state.count + 1,
            },
            _ => state.clone(),
        }
    }

    fn store() -> Store<Counter, Msg> {
        create_store(reducer, Counter { count: 0 })
    }

    // ========================================================================
    // Dispatch / get_state
    // ========================================================================

    #[test]
    fn dispatch_updates_state_synchronously() {
        let store = store();
        store.dispatch(Msg::tag_only("increment")).unwrap();
        assert_eq!(store.get_state().count, 1);
    }

    #[test]
    fn dispatch_without_subscribers_is_retained() {
        let store = store();
        store.dispatch(Msg::tag_only("increment")).unwrap();
        store.dispatch(Msg::tag_only("increment")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        store.subscribe(move |s| seen_c.lock().push(s.count));
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn clones_share_state() {
        let a = store();
        let b = a.clone();
        b.dispatch(Msg::tag_only("increment")).unwrap();
        assert_eq!(a.get_state().count, 1);
    }

    // ========================================================================
    // Subscribe
    // ========================================================================

    #[test]
    fn unchanged_state_is_not_notified() {
        let store = store();
        let calls = Arc::new(Mutex::new(0));
        let calls_c = calls.clone();
        store.subscribe(move |_| *calls_c.lock() += 1);

        store.dispatch(Msg::tag_only("touch")).unwrap();
        store.dispatch(Msg::tag_only("unknown")).unwrap();
        assert_eq!(*calls.lock(), 1);

        store.dispatch(Msg::tag_only("increment")).unwrap();
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn unsubscribe_detaches_listener() {
        let store = store();
        let calls = Arc::new(Mutex::new(0));
        let calls_c = calls.clone();
        let id = store.subscribe(move |_| *calls_c.lock() += 1);

        assert!(store.unsubscribe(id));
        store.dispatch(Msg::tag_only("increment")).unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn dispatch_during_foreign_fold_is_deferred() {
        let store = store();
        let observed = Arc::new(Mutex::new(None));

        let other = store.clone();
        let observed_c = observed.clone();
        store.subscribe(move |s| {
            if s.count == 1 {
                // This thread is mid-fold; a dispatch from another thread
                // only queues its action.
                let other = other.clone();
                let seen = std::thread::spawn(move || {
                    other.dispatch(Msg::tag_only("increment")).unwrap();
                    other.get_state().count
                })
                .join()
                .unwrap();
                *observed_c.lock() = Some(seen);
            }
        });

        store.dispatch(Msg::tag_only("increment")).unwrap();
        assert_eq!(*observed.lock(), Some(1));
        assert_eq!(store.get_state().count, 2);
    }

    #[tokio::test]
    async fn split_yields_states_and_dispatch() {
        let store = store();
        let (mut states, dispatch) = store.split();
        dispatch.send(Msg::tag_only("increment")).unwrap();
        dispatch.send(Msg::tag_only("increment")).unwrap();

        let got: Vec<i64> = states.by_ref().take(3).map(|s| s.count).collect().await;
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dispatch_stream_folds_items() {
        let store = store();
        let mut states = store.states();
        store
            .dispatch_stream(futures::stream::iter(vec![
                Msg::tag_only("increment"),
                Msg::tag_only("increment"),
            ]))
            .unwrap();

        let got: Vec<i64> = states.by_ref().take(3).map(|s| s.count).collect().await;
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn config_is_exposed() {
        let store: Store<Counter, Msg> =
            create_store_with_config(reducer, Counter { count: 0 }, StoreConfig::named("counter"));
        assert_eq!(store.config().name, "counter");
    }
}
