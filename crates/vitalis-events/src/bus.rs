//! The central synchronous event dispatcher.
//!
//! Producers emit [`Event`]s; every subscriber registered for the event's type
//! is called before [`EventBus::emit`] returns. The simulation is
//! single-threaded, so the bus is shared through `Rc` and uses interior
//! mutability for its subscriber table and counters.
//!
//! Dispatch iterates over a snapshot of the subscriber list, taken before any
//! handler runs and released before the first call. Handlers may therefore
//! subscribe, unsubscribe, or emit further events while being dispatched to.
//! Nested emission resolves depth-first: an event emitted from a handler is
//! fully delivered before the outer dispatch continues with its next
//! subscriber.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};
use vitalis_types::{Event, EventPayload, EventType};

use crate::error::{DispatchError, HandlerError};

/// A subscriber callback.
pub trait EventHandler {
    /// Handle one event. Errors are isolated by the bus.
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError>;
}

/// Shared, registrable handle to a subscriber.
///
/// Two handles refer to the same subscriber when they point at the same
/// allocation; registration identity is decided that way.
pub type SharedHandler = Rc<RefCell<dyn EventHandler>>;

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(&Event) -> Result<(), HandlerError>,
{
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

/// Wrap a closure as a [`SharedHandler`].
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: FnMut(&Event) -> Result<(), HandlerError> + 'static,
{
    Rc::new(RefCell::new(FnHandler(f)))
}

fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Outcome of a single [`EventBus::emit`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that handled the event successfully.
    pub delivered: usize,
    /// Subscribers whose delivery failed.
    pub failed: usize,
}

/// Usage statistics of the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Number of `emit` calls, with or without subscribers.
    pub events_emitted: u64,
    /// Number of successful registrations since creation (or the last
    /// [`EventBus::clear_subscriptions`]).
    pub subscriptions: u64,
    /// Subscribers currently registered, across all types.
    pub total_subscribers: usize,
    /// Failed deliveries.
    pub dispatch_errors: u64,
    /// Event types with at least one subscriber, sorted by name.
    pub active_event_types: Vec<EventType>,
    /// Subscriber count per active type, in the same order.
    pub subscribers_by_type: Vec<(EventType, usize)>,
}

/// Synchronous publish/subscribe dispatcher.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<HashMap<EventType, Vec<SharedHandler>>>,
    events_emitted: Cell<u64>,
    subscriptions: Cell<u64>,
    dispatch_errors: Cell<u64>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("events_emitted", &self.events_emitted.get())
            .field("subscriptions", &self.subscriptions.get())
            .field("dispatch_errors", &self.dispatch_errors.get())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bus behind a shared handle.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Register `handler` for `event_type`.
    ///
    /// Registration is idempotent: returns `false` and changes nothing when
    /// the same handler is already registered for that type.
    pub fn subscribe(&self, event_type: EventType, handler: SharedHandler) -> bool {
        let mut table = self.subscribers.borrow_mut();
        let list = table.entry(event_type).or_default();
        if list.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        list.push(handler);
        self.subscriptions
            .set(self.subscriptions.get().saturating_add(1));
        true
    }

    /// Register a closure for `event_type`. Returns the handle needed to
    /// unsubscribe it later.
    pub fn subscribe_fn<F>(&self, event_type: EventType, f: F) -> SharedHandler
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + 'static,
    {
        let handler = handler_fn(f);
        self.subscribe(event_type, Rc::clone(&handler));
        handler
    }

    /// Remove `handler` from `event_type`. Returns whether it was registered.
    ///
    /// The type entry is dropped once its last subscriber leaves, so
    /// [`EventBus::has_subscribers`] turns false again.
    pub fn unsubscribe(&self, event_type: &EventType, handler: &SharedHandler) -> bool {
        let mut table = self.subscribers.borrow_mut();
        let Some(list) = table.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !same_handler(h, handler));
        let removed = list.len() != before;
        if list.is_empty() {
            table.remove(event_type);
        }
        removed
    }

    /// Remove `handler` from every type it is registered for. Returns the
    /// number of registrations removed.
    pub fn unsubscribe_all(&self, handler: &SharedHandler) -> usize {
        let mut table = self.subscribers.borrow_mut();
        let mut removed: usize = 0;
        for list in table.values_mut() {
            let before = list.len();
            list.retain(|h| !same_handler(h, handler));
            removed = removed.saturating_add(before.saturating_sub(list.len()));
        }
        table.retain(|_, list| !list.is_empty());
        removed
    }

    /// Drop every subscription and reset the registration counter.
    pub fn clear_subscriptions(&self) {
        self.subscribers.borrow_mut().clear();
        self.subscriptions.set(0);
    }

    /// Whether anyone listens to `event_type`. Producers use this to skip
    /// building payloads nobody will read.
    pub fn has_subscribers(&self, event_type: &EventType) -> bool {
        self.subscribers.borrow().contains_key(event_type)
    }

    /// Number of subscribers registered for `event_type`.
    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.subscribers
            .borrow()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every current subscriber of its type, in
    /// registration order.
    ///
    /// The emitted-event counter is incremented exactly once per call, even
    /// when nobody is subscribed. A failing or re-entrantly busy subscriber
    /// is counted in `dispatch_errors`, logged, and skipped; the remaining
    /// subscribers still receive the event.
    pub fn emit(&self, event: &Event) -> DispatchReport {
        self.events_emitted
            .set(self.events_emitted.get().saturating_add(1));

        let snapshot: Vec<SharedHandler> = self
            .subscribers
            .borrow()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        trace!(
            event_type = %event.event_type,
            tick = event.tick,
            source = event.source,
            subscribers = snapshot.len(),
            "Dispatching event"
        );

        let mut report = DispatchReport::default();
        for handler in &snapshot {
            let outcome = match handler.try_borrow_mut() {
                Ok(mut h) => h.handle(event).map_err(|source| DispatchError::Handler {
                    event_type: event.event_type.clone(),
                    source,
                }),
                Err(_busy) => Err(DispatchError::Reentrant {
                    event_type: event.event_type.clone(),
                }),
            };

            match outcome {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(err) => {
                    report.failed = report.failed.saturating_add(1);
                    self.dispatch_errors
                        .set(self.dispatch_errors.get().saturating_add(1));
                    warn!(
                        event_type = %event.event_type,
                        tick = event.tick,
                        error = %err,
                        "Event subscriber failed"
                    );
                }
            }
        }
        report
    }

    /// Build an event and emit it.
    pub fn publish(
        &self,
        event_type: EventType,
        source: &str,
        tick: u64,
        payload: EventPayload,
    ) -> DispatchReport {
        self.emit(&Event::new(event_type, source, tick, payload))
    }

    /// Number of `emit` calls so far.
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.get()
    }

    /// Number of failed deliveries so far.
    pub fn dispatch_errors(&self) -> u64 {
        self.dispatch_errors.get()
    }

    /// Snapshot of the bus statistics.
    pub fn stats(&self) -> BusStats {
        let table = self.subscribers.borrow();
        let mut subscribers_by_type: Vec<(EventType, usize)> = table
            .iter()
            .map(|(event_type, list)| (event_type.clone(), list.len()))
            .collect();
        subscribers_by_type.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        BusStats {
            events_emitted: self.events_emitted.get(),
            subscriptions: self.subscriptions.get(),
            total_subscribers: subscribers_by_type.iter().map(|(_, n)| *n).sum(),
            dispatch_errors: self.dispatch_errors.get(),
            active_event_types: subscribers_by_type.iter().map(|(t, _)| t.clone()).collect(),
            subscribers_by_type,
        }
    }
}

/// A bus handle bound to a source name.
///
/// Components hold one of these instead of the raw bus, so every event they
/// publish is stamped with their name.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    bus: Rc<EventBus>,
    source: String,
}

impl EventEmitter {
    /// Bind `bus` to the component called `source`.
    pub fn new(bus: Rc<EventBus>, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }

    /// The underlying bus.
    pub const fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// The name stamped on emitted events.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// See [`EventBus::has_subscribers`].
    pub fn has_subscribers(&self, event_type: &EventType) -> bool {
        self.bus.has_subscribers(event_type)
    }

    /// Emit an event of `event_type` for `tick` carrying `payload`.
    pub fn emit(&self, event_type: EventType, tick: u64, payload: EventPayload) -> DispatchReport {
        self.bus.publish(event_type, &self.source, tick, payload)
    }

    /// Register `handler` for `event_type` on the underlying bus.
    pub fn subscribe(&self, event_type: EventType, handler: SharedHandler) -> bool {
        self.bus.subscribe(event_type, handler)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::rc::Weak;

    use super::*;

    fn noop() -> SharedHandler {
        handler_fn(|_event| Ok(()))
    }

    fn event(event_type: EventType, tick: u64) -> Event {
        Event::new(event_type, "test", tick, EventPayload::Empty)
    }

    /// A shared log that handlers append to.
    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn has_subscribers_tracks_registration() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers(&EventType::Deaths));

        let h = noop();
        assert!(bus.subscribe(EventType::Deaths, Rc::clone(&h)));
        assert!(bus.has_subscribers(&EventType::Deaths));
        assert!(!bus.has_subscribers(&EventType::Births));

        assert!(bus.unsubscribe(&EventType::Deaths, &h));
        assert!(!bus.has_subscribers(&EventType::Deaths));
    }

    #[test]
    fn emit_counts_every_call_even_without_subscribers() {
        let bus = EventBus::new();
        let report = bus.emit(&event(EventType::Births, 0));
        assert_eq!(report, DispatchReport::default());
        assert_eq!(bus.events_emitted(), 1);

        bus.subscribe(EventType::Births, noop());
        bus.subscribe(EventType::Births, noop());
        let report = bus.emit(&event(EventType::Births, 1));
        assert_eq!(report.delivered, 2);
        assert_eq!(bus.events_emitted(), 2);
    }

    #[test]
    fn subscribe_is_idempotent() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0_u32));
        let c = Rc::clone(&calls);
        let h = handler_fn(move |_e| {
            c.set(c.get().saturating_add(1));
            Ok(())
        });

        assert!(bus.subscribe(EventType::Births, Rc::clone(&h)));
        assert!(!bus.subscribe(EventType::Births, Rc::clone(&h)));
        assert_eq!(bus.subscriber_count(&EventType::Births), 1);
        assert_eq!(bus.stats().subscriptions, 1);

        bus.emit(&event(EventType::Births, 0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failing_subscriber_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let seen = log();

        bus.subscribe_fn(EventType::Deaths, |_e| {
            Err(HandlerError::Failed {
                reason: "boom".to_owned(),
            })
        });
        let s = Rc::clone(&seen);
        bus.subscribe_fn(EventType::Deaths, move |e| {
            s.borrow_mut().push(format!("second@{}", e.tick));
            Ok(())
        });

        let report = bus.emit(&event(EventType::Deaths, 3));
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(bus.dispatch_errors(), 1);
        assert_eq!(*seen.borrow(), vec!["second@3".to_owned()]);
    }

    #[test]
    fn nested_emission_is_depth_first() {
        let bus = EventBus::shared();
        let seen = log();

        let weak: Weak<EventBus> = Rc::downgrade(&bus);
        let s = Rc::clone(&seen);
        bus.subscribe_fn(EventType::Births, move |e| {
            s.borrow_mut().push("births:first:start".to_owned());
            if let Some(bus) = weak.upgrade() {
                bus.publish(EventType::ProtectionStart, "nested", e.tick, EventPayload::Empty);
            }
            s.borrow_mut().push("births:first:end".to_owned());
            Ok(())
        });
        let s = Rc::clone(&seen);
        bus.subscribe_fn(EventType::Births, move |_e| {
            s.borrow_mut().push("births:second".to_owned());
            Ok(())
        });
        let s = Rc::clone(&seen);
        bus.subscribe_fn(EventType::ProtectionStart, move |_e| {
            s.borrow_mut().push("protection_start".to_owned());
            Ok(())
        });

        bus.emit(&event(EventType::Births, 1));
        assert_eq!(
            *seen.borrow(),
            vec![
                "births:first:start".to_owned(),
                "protection_start".to_owned(),
                "births:first:end".to_owned(),
                "births:second".to_owned(),
            ]
        );
        assert_eq!(bus.events_emitted(), 2);
        assert_eq!(bus.dispatch_errors(), 0);
    }

    #[test]
    fn self_reentrant_delivery_is_isolated() {
        let bus = EventBus::shared();
        let weak = Rc::downgrade(&bus);
        let depth = Rc::new(Cell::new(0_u32));
        let d = Rc::clone(&depth);
        bus.subscribe_fn(EventType::StateChange, move |e| {
            d.set(d.get().saturating_add(1));
            if let Some(bus) = weak.upgrade() {
                bus.publish(EventType::StateChange, "loop", e.tick, EventPayload::Empty);
            }
            Ok(())
        });

        bus.emit(&event(EventType::StateChange, 0));
        // The inner delivery hits the busy handler and is skipped.
        assert_eq!(depth.get(), 1);
        assert_eq!(bus.events_emitted(), 2);
        assert_eq!(bus.dispatch_errors(), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_uses_snapshot() {
        let bus = EventBus::shared();
        let seen = log();

        let s = Rc::clone(&seen);
        let second = handler_fn(move |_e| {
            s.borrow_mut().push("second".to_owned());
            Ok(())
        });

        let weak = Rc::downgrade(&bus);
        let target = Rc::clone(&second);
        bus.subscribe_fn(EventType::Births, move |_e| {
            if let Some(bus) = weak.upgrade() {
                bus.unsubscribe(&EventType::Births, &target);
            }
            Ok(())
        });
        bus.subscribe(EventType::Births, Rc::clone(&second));

        // The snapshot still includes `second` for this dispatch.
        bus.emit(&event(EventType::Births, 0));
        assert_eq!(seen.borrow().len(), 1);

        // But not for the next one.
        bus.emit(&event(EventType::Births, 1));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bus.subscriber_count(&EventType::Births), 1);
    }

    #[test]
    fn subscribe_during_dispatch_applies_to_next_event() {
        let bus = EventBus::shared();
        let calls = Rc::new(Cell::new(0_u32));

        let weak = Rc::downgrade(&bus);
        let c = Rc::clone(&calls);
        let late = handler_fn(move |_e| {
            c.set(c.get().saturating_add(1));
            Ok(())
        });
        bus.subscribe_fn(EventType::Births, move |_e| {
            if let Some(bus) = weak.upgrade() {
                bus.subscribe(EventType::Births, Rc::clone(&late));
            }
            Ok(())
        });

        bus.emit(&event(EventType::Births, 0));
        assert_eq!(calls.get(), 0);
        bus.emit(&event(EventType::Births, 1));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unsubscribe_all_removes_every_registration() {
        let bus = EventBus::new();
        let h = noop();
        bus.subscribe(EventType::Births, Rc::clone(&h));
        bus.subscribe(EventType::Deaths, Rc::clone(&h));
        bus.subscribe(EventType::Deaths, noop());

        assert_eq!(bus.unsubscribe_all(&h), 2);
        assert!(!bus.has_subscribers(&EventType::Births));
        assert_eq!(bus.subscriber_count(&EventType::Deaths), 1);
    }

    #[test]
    fn stats_report_active_types() {
        let bus = EventBus::new();
        bus.subscribe(EventType::Deaths, noop());
        bus.subscribe(EventType::Births, noop());
        bus.subscribe(EventType::Births, noop());
        bus.emit(&event(EventType::Vaccination, 0));

        let stats = bus.stats();
        assert_eq!(stats.events_emitted, 1);
        assert_eq!(stats.subscriptions, 3);
        assert_eq!(stats.total_subscribers, 3);
        assert_eq!(
            stats.active_event_types,
            vec![EventType::Births, EventType::Deaths]
        );
        assert_eq!(
            stats.subscribers_by_type,
            vec![(EventType::Births, 2), (EventType::Deaths, 1)]
        );

        bus.clear_subscriptions();
        let stats = bus.stats();
        assert_eq!(stats.subscriptions, 0);
        assert!(stats.active_event_types.is_empty());
    }

    #[test]
    fn emitter_stamps_source() {
        let bus = EventBus::shared();
        let sources = log();
        let s = Rc::clone(&sources);
        bus.subscribe_fn(EventType::Births, move |e| {
            s.borrow_mut().push(e.source.clone());
            Ok(())
        });

        let emitter = EventEmitter::new(Rc::clone(&bus), "vital_dynamics");
        assert!(emitter.has_subscribers(&EventType::Births));
        emitter.emit(EventType::Births, 2, EventPayload::Empty);
        assert_eq!(*sources.borrow(), vec!["vital_dynamics".to_owned()]);
    }
}
