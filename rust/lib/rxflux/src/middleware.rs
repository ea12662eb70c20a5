//! Middleware composition around dispatch.
//!
//! A middleware is attached once, while the chain is being built, and hands
//! back a [`Layer`]: a function from the next dispatch in the chain to the
//! dispatch that wraps it. Layers are folded from the right over the
//! store's terminal dispatch, so the first middleware in the list sees every
//! message first and the last one sits closest to the reducer.
//!
//! Building is two-phase. Every middleware shares one [`MiddlewareApi`] whose
//! `dispatch` points at a shared chain cell. The cell stays `Building` until all
//! layers exist and only then becomes `Ready` with the composed dispatch.
//! Dispatching through the API while `Building` fails with
//! [`StoreError::InvalidUse`]; afterwards it re-enters the full chain from
//! the top.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::action::{Action, Message};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::pipeline::{Pipeline, Reducer};
use crate::store::{Dispatch, State, Store};

/// Wraps the next dispatch in the chain.
pub type Layer<A> = Box<dyn FnOnce(Dispatch<A>) -> Dispatch<A> + Send>;

/// Box a closure as a [`Layer`].
pub fn layer<A, F>(f: F) -> Layer<A>
where
    F: FnOnce(Dispatch<A>) -> Dispatch<A> + Send + 'static,
{
    Box::new(f)
}

/// Cross-cutting behavior around dispatch.
pub trait Middleware<S, A>: Send + Sync {
    /// Called once while the chain is built. Dispatching through `api` from
    /// here, or from the returned layer before it wraps `next`, fails with
    /// `InvalidUse`.
    fn attach(&self, api: &MiddlewareApi<S, A>) -> Result<Layer<A>>;
}

/// Middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

/// Turn a closure into a [`Middleware`].
///
/// ```ignore
/// let audit = from_fn(|api: &MiddlewareApi<Counter, Msg>| {
///     let api = api.clone();
///     Ok(layer(move |next: Dispatch<Msg>| {
///         Dispatch::new(move |message| {
///             tracing::info!(before = api.get_state().count, "audit");
///             next.call(message)
///         })
///     }))
/// });
/// ```
pub fn from_fn<S, A, F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&MiddlewareApi<S, A>) -> Result<Layer<A>> + Send + Sync,
{
    FnMiddleware { f }
}

impl<S, A, F> Middleware<S, A> for FnMiddleware<F>
where
    F: Fn(&MiddlewareApi<S, A>) -> Result<Layer<A>> + Send + Sync,
{
    fn attach(&self, api: &MiddlewareApi<S, A>) -> Result<Layer<A>> {
        (self.f)(api)
    }
}

enum ChainPhase<A> {
    Building,
    Ready(Dispatch<A>),
}

/// Forward reference to the composed dispatch.
pub(crate) struct ChainCell<A> {
    phase: RwLock<ChainPhase<A>>,
}

impl<A: Action> ChainCell<A> {
    fn new() -> Self {
        Self {
            phase: RwLock::new(ChainPhase::Building),
        }
    }

    fn finish(&self, composed: Dispatch<A>) {
        *self.phase.write() = ChainPhase::Ready(composed);
    }

    fn current(&self) -> Result<Dispatch<A>> {
        match &*self.phase.read() {
            ChainPhase::Building => Err(StoreError::InvalidUse),
            ChainPhase::Ready(dispatch) => Ok(dispatch.clone()),
        }
    }
}

/// What every middleware gets to see of the store.
///
/// `get_state` is live: it always returns the latest state at call time.
/// `dispatch` goes through the whole chain, starting at the first
/// middleware.
pub struct MiddlewareApi<S, A> {
    pipeline: Arc<Pipeline<S, A>>,
    chain: Weak<ChainCell<A>>,
}

impl<S, A> Clone for MiddlewareApi<S, A> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            chain: Weak::clone(&self.chain),
        }
    }
}

impl<S: State, A: Action> MiddlewareApi<S, A> {
    /// The store's latest state.
    pub fn get_state(&self) -> Arc<S> {
        self.pipeline.states.latest()
    }

    /// Dispatch through the whole chain, starting at the first middleware.
    pub fn dispatch(&self, message: impl Into<Message<A>>) -> Result<()> {
        let chain = self.chain.upgrade().ok_or(StoreError::Closed)?;
        let dispatch = chain.current()?;
        dispatch.call(message.into())
    }

    /// A [`Dispatch`] that forwards to [`MiddlewareApi::dispatch`].
    pub fn dispatcher(&self) -> Dispatch<A> {
        let api = self.clone();
        Dispatch::new(move |message| api.dispatch(message))
    }
}

/// Fluent construction of a store with configuration and middleware.
pub struct StoreBuilder<S, A> {
    reducer: Reducer<S, A>,
    initial: S,
    config: StoreConfig,
    middleware: Vec<Box<dyn Middleware<S, A>>>,
}

impl<S: State, A: Action> StoreBuilder<S, A> {
    /// Start a builder with the default config and no middleware.
    pub fn new<R>(reducer: R, initial: S) -> Self
    where
        R: Fn(&A, &S) -> S + Send + Sync + 'static,
    {
        Self {
            reducer: Arc::new(reducer),
            initial,
            config: StoreConfig::default(),
            middleware: Vec::new(),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a middleware. The first one added sees each message first.
    pub fn middleware(mut self, middleware: impl Middleware<S, A> + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    pub fn build(self) -> Result<Store<S, A>> {
        let pipeline = Pipeline::new(self.reducer, self.initial, self.config);
        let terminal = Store::terminal(&pipeline);
        if self.middleware.is_empty() {
            return Ok(Store::from_parts(pipeline, terminal, None));
        }

        let cell = Arc::new(ChainCell::new());
        let api = MiddlewareApi {
            pipeline: Arc::clone(&pipeline),
            chain: Arc::downgrade(&cell),
        };

        let layers = self
            .middleware
            .iter()
            .map(|m| m.attach(&api))
            .collect::<Result<Vec<_>>>()?;
        let composed = layers
            .into_iter()
            .rev()
            .fold(terminal, |next, wrap| wrap(next));
        cell.finish(composed.clone());

        debug!(
            store = %pipeline.config().name,
            middleware = self.middleware.len(),
            "middleware chain ready"
        );
        Ok(Store::from_parts(pipeline, composed, Some(cell)))
    }
}

/// Create a store whose dispatch runs through `middleware`, in order.
///
/// With an empty list this is [`create_store`](crate::create_store).
pub fn with_middleware<S, A, R>(
    reducer: R,
    initial: S,
    middleware: Vec<Box<dyn Middleware<S, A>>>,
) -> Result<Store<S, A>>
where
    S: State,
    A: Action,
    R: Fn(&A, &S) -> S + Send + Sync + 'static,
{
    let mut builder = StoreBuilder::new(reducer, initial);
    builder.middleware = middleware;
    builder.build()
}
