use std::fmt;

use chrono::{SecondsFormat, Utc};
use tracing::{info, info_span, warn};

use crate::action::{Action, Message};
use crate::error::Result;
use crate::middleware::{Layer, Middleware, MiddlewareApi, layer};
use crate::store::{Dispatch, State};

/// Traces every dispatch.
///
/// Each message opens an `action` span (tag plus RFC 3339 timestamp) holding
/// three events: `prev state`, `action`, `next state`. Anything the rest of
/// the chain logs while handling the message nests inside the span. The
/// message and result pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

impl<S, A> Middleware<S, A> for Logger
where
    S: State + fmt::Debug,
    A: Action,
{
    fn attach(&self, api: &MiddlewareApi<S, A>) -> Result<Layer<A>> {
        let api = api.clone();
        Ok(layer(move |next: Dispatch<A>| {
            Dispatch::new(move |message: Message<A>| {
                let tag = message.tag().to_string();
                let at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                let span = info_span!("action", tag = %tag, at = %at);
                let _entered = span.enter();

                let previous = api.get_state();
                let result = next.call(message);

                info!(state = ?previous, "prev state");
                info!(action = %tag, "action");
                info!(state = ?api.get_state(), "next state");
                if let Err(err) = &result {
                    warn!(error = %err, "dispatch failed");
                }
                result
            })
        }))
    }
}
