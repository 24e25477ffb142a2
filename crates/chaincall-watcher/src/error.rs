//! Watcher errors.

use std::sync::Arc;

use chaincall_core::AggregateError;
use thiserror::Error;

use crate::events::EventKind;

/// Errors surfaced by a [`crate::Watcher`], either to error listeners or
/// through a fetch handle. Cheap to clone so every waiter gets a copy.
#[derive(Debug, Clone, Error)]
pub enum WatchError {
    /// The poll's aggregate call failed.
    #[error(transparent)]
    Aggregate(Arc<AggregateError>),

    /// A listener panicked while handling an event.
    #[error("{kind} listener panicked: {message}")]
    ListenerPanicked { kind: EventKind, message: String },

    /// The watcher was stopped before the operation completed.
    #[error("watcher stopped")]
    Stopped,

    /// `poll()` on a watcher that was never started.
    #[error("watcher is not running")]
    NotRunning,
}

impl WatchError {
    /// `true` when retrying the same call set cannot succeed.
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Aggregate(e) if e.is_construction())
    }
}

impl From<AggregateError> for WatchError {
    fn from(e: AggregateError) -> Self {
        Self::Aggregate(Arc::new(e))
    }
}
