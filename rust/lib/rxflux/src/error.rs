use thiserror::Error;

use crate::node::Node;
use crate::registry::ScopeId;

/// Stable, machine-readable error codes. Match on these, not on messages.
pub mod error_code {
    pub const INVALID_USE: &str = "INVALID_USE";
    pub const MISSING_PROVIDER: &str = "MISSING_PROVIDER";
    pub const UNKNOWN_SCOPE: &str = "UNKNOWN_SCOPE";
    pub const STORE_TYPE_MISMATCH: &str = "STORE_TYPE_MISMATCH";
    pub const PATH_NOT_FOUND: &str = "PATH_NOT_FOUND";
    pub const CLOSED: &str = "CLOSED";
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// `dispatch` was called through the middleware API before the chain
    /// finished building.
    #[error(
        "dispatching while constructing middleware is not allowed; \
         other middleware would not be applied to this dispatch"
    )]
    InvalidUse,

    /// No store has been provided in the scope.
    #[error("no store provided in {scope}; call provide() first")]
    MissingProvider { scope: ScopeId },

    /// The scope was never opened or has been closed.
    #[error("{0} is not open")]
    UnknownScope(ScopeId),

    /// The scope holds a store with different state or action types.
    #[error("store in {scope} is not a {expected}")]
    StoreTypeMismatch {
        scope: ScopeId,
        expected: &'static str,
    },

    /// A path segment does not resolve against the state tree.
    #[error("path segment `{segment}` not found in {node:?}")]
    PathNotFound { node: Node, segment: String },

    /// The store behind a middleware API has been dropped.
    #[error("store has been dropped")]
    Closed,
}

impl StoreError {
    /// Stable code for this error, one of the [`error_code`] constants.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidUse => error_code::INVALID_USE,
            StoreError::MissingProvider { .. } => error_code::MISSING_PROVIDER,
            StoreError::UnknownScope(_) => error_code::UNKNOWN_SCOPE,
            StoreError::StoreTypeMismatch { .. } => error_code::STORE_TYPE_MISMATCH,
            StoreError::PathNotFound { .. } => error_code::PATH_NOT_FOUND,
            StoreError::Closed => error_code::CLOSED,
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
