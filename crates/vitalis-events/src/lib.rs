//! Synchronous publish/subscribe for the Vitalis simulation.
//!
//! Processes communicate through the [`EventBus`]: a producer emits an
//! [`Event`](vitalis_types::Event) and every subscriber registered for its
//! type runs before `emit` returns. There is no queueing and no cross-tick
//! buffering. Subscriber failures are isolated, counted, and logged; they
//! never reach the emitter.

pub mod bus;
pub mod error;

pub use bus::{
    BusStats, DispatchReport, EventBus, EventEmitter, EventHandler, FnHandler, SharedHandler,
    handler_fn,
};
pub use error::{DispatchError, HandlerError};
