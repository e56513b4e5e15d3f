//! Error types for the reactive runtime.
//!
//! Errors produced by a computed callback are cached exactly like values, so
//! every reader of a failed node receives a clone of the same error. That is
//! why [`ReactiveError`] is `Clone` and wraps foreign errors behind an `Arc`.

use std::sync::Arc;

/// The result of evaluating a reactive node.
pub type Outcome<T> = Result<T, ReactiveError>;

/// Errors surfaced by computed nodes and effects.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// The callback failed with a foreign error.
    #[error(transparent)]
    Callback(Arc<dyn std::error::Error + Send + Sync>),

    /// The callback failed with a plain message.
    #[error("{0}")]
    Message(String),

    /// A node was read while it was already being evaluated.
    #[error("cycle detected while evaluating {label}")]
    Cycle {
        /// Debug label of the node, or its id when unlabeled.
        label: String,
    },
}

impl ReactiveError {
    /// Wrap any error so it can be cached by a computed node.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(error))
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this error was raised by cycle detection.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

impl From<String> for ReactiveError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for ReactiveError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl From<std::convert::Infallible> for ReactiveError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
