use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::stream::Stream;
use parking_lot::{Mutex, RwLock};
use scopeguard::ScopeGuard;

/// Callback type for value notifications.
pub type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

/// Unique handle for a subscription, returned by every `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

enum Sink<T> {
    Callback(Listener<T>),
    /// Kept for as long as the callback returns `true`.
    While(Arc<dyn Fn(&Arc<T>) -> bool + Send + Sync>),
    Channel(mpsc::UnboundedSender<Arc<T>>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Callback(f) => Sink::Callback(Arc::clone(f)),
            Sink::While(f) => Sink::While(Arc::clone(f)),
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
        }
    }
}

impl<T> Sink<T> {
    /// Deliver a value. Returns `false` once the sink is gone for good.
    fn deliver(&self, value: &Arc<T>) -> bool {
        match self {
            Sink::Callback(f) => {
                f(value);
                true
            }
            Sink::While(f) => f(value),
            Sink::Channel(tx) => tx.unbounded_send(Arc::clone(value)).is_ok(),
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, Sink::Channel(tx) if tx.is_closed())
    }
}

struct Entry<T> {
    id: SubscriptionId,
    /// Sequence number of the value the sink was registered at; it only
    /// receives values published after that one.
    since: u64,
    sink: Sink<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            since: self.since,
            sink: self.sink.clone(),
        }
    }
}

/// Published values waiting to be delivered.
struct Outbox<T> {
    queue: VecDeque<(u64, Arc<T>)>,
    /// Set while some caller is delivering the queue.
    notifying: bool,
}

/// A latest-value cell with deduplicated fan-out.
///
/// - `publish(value)` replaces the latest value and notifies every listener,
///   unless the value equals the current one.
/// - `subscribe(f)` registers a listener and immediately hands it the latest
///   value (replay-latest, never history).
/// - `watch()` does the same through an async stream.
///
/// Listeners run on the publishing thread with no lock held, so they may
/// read the cell or publish again. A publish made while values are being
/// delivered is queued behind them: every listener sees values in publish
/// order and the last one it sees is the cell's latest.
pub struct Broadcast<T> {
    latest: RwLock<(u64, Arc<T>)>,
    sinks: Mutex<Vec<Entry<T>>>,
    outbox: Mutex<Outbox<T>>,
    next_id: AtomicU64,
}

impl<T: PartialEq + Send + Sync + 'static> Broadcast<T> {
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            latest: RwLock::new((0, Arc::new(initial))),
            sinks: Mutex::new(Vec::new()),
            outbox: Mutex::new(Outbox {
                queue: VecDeque::new(),
                notifying: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// The most recently published value.
    pub fn latest(&self) -> Arc<T> {
        Arc::clone(&self.latest.read().1)
    }

    /// Replace the latest value and notify listeners.
    ///
    /// Returns `false` (and notifies nobody) if `value` equals the current
    /// value. If another call is already delivering (a listener publishing,
    /// or another thread), the value is queued and that call delivers it
    /// once the earlier values have reached every listener.
    pub fn publish(&self, value: T) -> bool {
        {
            let mut latest = self.latest.write();
            if *latest.1 == value {
                return false;
            }
            let seq = latest.0 + 1;
            *latest = (seq, Arc::new(value));

            // Queued under the write lock so queue order is publish order.
            let mut outbox = self.outbox.lock();
            outbox.queue.push_back((seq, Arc::clone(&latest.1)));
            if outbox.notifying {
                return true;
            }
            outbox.notifying = true;
        }
        self.drain();
        true
    }

    fn drain(&self) {
        // A panicking listener unwinds through here. Undelivered values are
        // dropped; the latest value stays in place.
        let guard = scopeguard::guard((), |_| {
            let mut outbox = self.outbox.lock();
            outbox.queue.clear();
            outbox.notifying = false;
        });
        loop {
            let (seq, value) = {
                let mut outbox = self.outbox.lock();
                match outbox.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        outbox.notifying = false;
                        break;
                    }
                }
            };
            self.notify(seq, &value);
        }
        ScopeGuard::into_inner(guard);
    }

    fn notify(&self, seq: u64, value: &Arc<T>) {
        let entries: Vec<Entry<T>> = {
            let mut sinks = self.sinks.lock();
            sinks.retain(|entry| !entry.sink.is_closed());
            sinks.iter().filter(|entry| entry.since < seq).cloned().collect()
        };
        let mut dead = Vec::new();
        for entry in entries {
            if !entry.sink.deliver(value) {
                dead.push(entry.id);
            }
        }
        if !dead.is_empty() {
            self.sinks.lock().retain(|entry| !dead.contains(&entry.id));
        }
    }

    /// Register `sink` and return it the value to replay.
    fn register(&self, sink: Sink<T>) -> (SubscriptionId, Arc<T>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut sinks = self.sinks.lock();
        let (since, current) = {
            let latest = self.latest.read();
            (latest.0, Arc::clone(&latest.1))
        };
        sinks.push(Entry { id, since, sink });
        (id, current)
    }

    /// Register a listener. It is called right away with the latest value,
    /// then once per distinct published value.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);
        let (id, current) = self.register(Sink::Callback(Arc::clone(&listener)));
        listener(&current);
        id
    }

    /// Like `subscribe`, but the listener is dropped the first time it
    /// returns `false`.
    pub(crate) fn subscribe_while<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<T>) -> bool + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let (id, current) = self.register(Sink::While(listener.clone()));
        if !listener(&current) {
            self.unsubscribe(id);
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|entry| entry.id != id);
        sinks.len() < before
    }

    /// An async stream starting with the latest value and yielding every
    /// distinct value published afterwards. Dropping the stream detaches it.
    pub fn watch(&self) -> StateStream<T> {
        let (tx, rx) = mpsc::unbounded();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Replay under the sinks lock so no delivery can overtake it.
        let mut sinks = self.sinks.lock();
        let latest = self.latest.read();
        let _ = tx.unbounded_send(Arc::clone(&latest.1));
        sinks.push(Entry {
            id,
            since: latest.0,
            sink: Sink::Channel(tx),
        });
        StateStream { rx }
    }

    /// Number of live listeners and streams.
    pub fn listener_count(&self) -> usize {
        let mut sinks = self.sinks.lock();
        sinks.retain(|entry| !entry.sink.is_closed());
        sinks.len()
    }
}

/// Stream of states produced by [`Broadcast::watch`].
pub struct StateStream<T> {
    rx: mpsc::UnboundedReceiver<Arc<T>>,
}

impl<T> Stream for StateStream<T> {
    type Item = Arc<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
