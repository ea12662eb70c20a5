use std::any::Any;
use std::fmt;

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::payload::Payload;

/// A message describing an intended state transition.
///
/// The tag names the transition. Actions are treated as immutable values
/// and are never compared by the store.
pub trait Action: Send + 'static {
    fn tag(&self) -> &str;
}

/// Stock action: a tag plus an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Msg {
    tag: String,
    payload: Payload,
}

impl Msg {
    pub fn new<T: Any + Send + Sync>(tag: impl Into<String>, payload: T) -> Self {
        Self {
            tag: tag.into(),
            payload: Payload::new(payload),
        }
    }

    /// An action with an empty payload.
    pub fn tag_only(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: Payload::unit(),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Shorthand for `payload().downcast_ref::<T>()`.
    pub fn payload_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl Action for Msg {
    fn tag(&self) -> &str {
        &self.tag
    }
}

/// What a dispatch carries: one action, or a stream of actions produced
/// over time (an async operation).
pub enum Message<A> {
    Action(A),
    Stream(BoxStream<'static, A>),
}

impl<A: Action> Message<A> {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = A> + Send + 'static,
    {
        Message::Stream(stream.boxed())
    }

    /// Tag used in logs. Streams have no tag of their own.
    pub fn tag(&self) -> &str {
        match self {
            Message::Action(action) => action.tag(),
            Message::Stream(_) => "<stream>",
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Message::Stream(_))
    }
}

impl<A> From<A> for Message<A> {
    fn from(action: A) -> Self {
        Message::Action(action)
    }
}

impl<A: fmt::Debug> fmt::Debug for Message<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Message::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
