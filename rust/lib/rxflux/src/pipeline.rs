//! Reducer pipeline: turns dispatched messages into a deduplicated state
//! stream.
//!
//! Plain actions go through a FIFO inbox drained by whichever caller finds
//! it idle, so folds never interleave even when a listener dispatches while
//! being notified. Streamed messages occupy a single active-task slot on the
//! tokio runtime; installing a new one cancels the previous occupant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use scopeguard::ScopeGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::action::{Action, Message};
use crate::broadcast::Broadcast;
use crate::config::{StoreConfig, SwitchPolicy};
use crate::store::State;

/// Transition function: `(action, current) -> next`. Must be pure.
pub type Reducer<S, A> = Arc<dyn Fn(&A, &S) -> S + Send + Sync>;

pub(crate) struct Pipeline<S, A> {
    config: StoreConfig,
    reducer: Reducer<S, A>,
    pub(crate) states: Broadcast<S>,
    inbox: Mutex<Inbox<A>>,
    active: Mutex<Option<ActiveStream>>,
    generation: AtomicU64,
}

struct Inbox<A> {
    queue: VecDeque<A>,
    /// Set while some caller is folding the queue.
    draining: bool,
}

struct ActiveStream {
    generation: u64,
    cancel: CancellationToken,
}

impl<S: State, A: Action> Pipeline<S, A> {
    pub(crate) fn new(reducer: Reducer<S, A>, initial: S, config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            reducer,
            states: Broadcast::new(initial),
            inbox: Mutex::new(Inbox {
                queue: VecDeque::new(),
                draining: false,
            }),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Terminal dispatch: the innermost step of every middleware chain.
    pub(crate) fn accept(self: &Arc<Self>, message: Message<A>) {
        match message {
            Message::Action(action) => {
                if self.config.switch_policy == SwitchPolicy::AnyMessage {
                    self.cancel_active();
                }
                self.inject(action);
            }
            Message::Stream(stream) => self.switch_to(stream),
        }
    }

    /// Queue a resolved action and fold the queue unless another caller is
    /// already doing so.
    fn inject(&self, action: A) {
        {
            let mut inbox = self.inbox.lock();
            inbox.queue.push_back(action);
            if inbox.draining {
                trace!(store = %self.config.name, "fold in progress, action queued");
                return;
            }
            inbox.draining = true;
        }

        // A panic in the reducer or a listener unwinds through here. Actions
        // queued behind the failing one belong to the dispatch that panicked
        // and are dropped with it; the inbox is released for later callers.
        let guard = scopeguard::guard((), |_| {
            let mut inbox = self.inbox.lock();
            let dropped = inbox.queue.len();
            inbox.queue.clear();
            inbox.draining = false;
            if dropped > 0 {
                warn!(store = %self.config.name, dropped, "fold panicked, queued actions dropped");
            }
        });
        loop {
            let next = {
                let mut inbox = self.inbox.lock();
                match inbox.queue.pop_front() {
                    Some(action) => action,
                    None => {
                        inbox.draining = false;
                        break;
                    }
                }
            };
            self.fold(next);
        }
        ScopeGuard::into_inner(guard);
    }

    fn fold(&self, action: A) {
        let current = self.states.latest();
        let next = (self.reducer)(&action, &current);
        if self.states.publish(next) {
            debug!(store = %self.config.name, tag = action.tag(), "state changed");
        } else {
            trace!(store = %self.config.name, tag = action.tag(), "state unchanged, not published");
        }
    }

    fn switch_to(self: &Arc<Self>, stream: BoxStream<'static, A>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(
                store = %self.config.name,
                "action stream dispatched outside a tokio runtime, dropped"
            );
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let previous = self.active.lock().replace(ActiveStream {
            generation,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(
                store = %self.config.name,
                superseded = previous.generation,
                generation,
                "action stream superseded"
            );
        }

        let pipeline = Arc::downgrade(self);
        runtime.spawn(drive(pipeline, stream, cancel, generation));
    }

    fn cancel_active(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
            debug!(
                store = %self.config.name,
                superseded = active.generation,
                "action stream superseded by plain dispatch"
            );
        }
    }

    /// Free the slot, but only if `generation` still owns it.
    fn release(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.generation == generation) {
            *active = None;
        }
    }
}

/// Fold every item a stream yields until it ends, the store goes away, or
/// the slot is taken by someone else.
async fn drive<S: State, A: Action>(
    pipeline: Weak<Pipeline<S, A>>,
    mut stream: BoxStream<'static, A>,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(action) = item else { break };
        let Some(live) = pipeline.upgrade() else {
            return;
        };
        if cancel.is_cancelled() {
            break;
        }
        live.inject(action);
    }
    if let Some(pipeline) = pipeline.upgrade() {
        pipeline.release(generation);
    }
}
