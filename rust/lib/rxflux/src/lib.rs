//! rxflux: unidirectional state container.
//!
//! State lives in a store and changes only by dispatching actions through a
//! pure reducer. Every distinct state is pushed to subscribers; a late
//! subscriber receives the latest state right away and never a history.
//!
//! # Pieces
//!
//! - `Store`: reducer pipeline with a replay-latest, deduplicated state cell.
//!   Plain actions fold synchronously and in order. An action stream runs on
//!   the tokio runtime, and a newer dispatch cancels it.
//! - `Middleware`: layers wrapped around dispatch, first in the list runs
//!   outermost. The API handed to middleware rejects dispatch until the chain
//!   is complete.
//! - `PathResolver`: views over one branch of a `Node` state tree, cached by
//!   normalized path.
//! - `StoreRegistry`: explicit scopes, one provided store per scope.
//! - `Logger`: traces prev state, action and next state for every dispatch.
//!
//! # Example
//!
//! ```ignore
//! use openerp_rxflux::{Logger, Msg, StoreBuilder};
//!
//! let store = StoreBuilder::new(
//!     |action: &Msg, count: &i64| match action.tag() {
//!         "increment" => count + 1,
//!         _ => *count,
//!     },
//!     0,
//! )
//! .middleware(Logger::new())
//! .build()?;
//!
//! store.subscribe(|count| println!("count = {count}"));
//! store.dispatch(Msg::tag_only("increment"))?;
//! assert_eq!(*store.get_state(), 1);
//! ```

pub mod action;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod node;
pub mod path;
pub mod payload;
mod pipeline;
pub mod registry;
pub mod store;

// Re-export primary types at crate root.
pub use action::{Action, Message, Msg};
pub use broadcast::{Broadcast, StateStream, SubscriptionId};
pub use config::{StoreConfig, SwitchPolicy};
pub use error::{Result, StoreError, error_code};
pub use logger::Logger;
pub use middleware::{FnMiddleware, Layer, Middleware, MiddlewareApi, StoreBuilder, from_fn, layer, with_middleware};
pub use node::Node;
pub use path::{DerivedView, PathResolver, path_key, resolve};
pub use payload::Payload;
pub use pipeline::Reducer;
pub use registry::{ScopeId, StoreRegistry};
pub use store::{Dispatch, State, Store, create_store, create_store_with_config};
