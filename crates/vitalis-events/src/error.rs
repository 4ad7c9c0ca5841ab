//! Error types for event handlers and dispatch.
//!
//! Handlers report failures as [`HandlerError`]. The bus never propagates
//! them to the emitter: each failed delivery becomes a [`DispatchError`] that
//! is counted and logged, and dispatch moves on to the next subscriber.

use vitalis_types::EventType;

/// Failure reported by a subscriber while handling an event.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The event carried a payload the handler cannot interpret.
    #[error("unexpected payload for '{event_type}'")]
    UnexpectedPayload {
        /// The event type whose payload did not match.
        event_type: EventType,
    },

    /// The handler rejected the event for a domain reason.
    #[error("handler failed: {reason}")]
    Failed {
        /// Explanation of what went wrong.
        reason: String,
    },

    /// An error raised by a collaborator the handler called into.
    #[error("handler failed: {source}")]
    Source {
        /// The underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HandlerError {
    /// Wrap any error raised inside a handler.
    pub fn from_error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source {
            source: Box::new(err),
        }
    }
}

/// A single failed delivery, as recorded by the bus.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The handler returned an error.
    #[error("subscriber for '{event_type}' failed: {source}")]
    Handler {
        /// The event type being dispatched.
        event_type: EventType,
        /// The handler's error.
        source: HandlerError,
    },

    /// The handler is already executing further up the call stack (it
    /// emitted, directly or indirectly, an event it is itself subscribed to).
    #[error("subscriber for '{event_type}' is already running; re-entrant delivery skipped")]
    Reentrant {
        /// The event type being dispatched.
        event_type: EventType,
    },
}
