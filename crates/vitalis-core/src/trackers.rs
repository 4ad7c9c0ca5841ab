//! Passive trackers: subscribers that aggregate statistics and never touch
//! the population.
//!
//! [`BirthMonitor`] and [`DeathMonitor`] keep per-tick, per-region, and
//! per-compartment tallies plus the index sets they have seen.
//! [`ReactionCounter`] counts deliveries of any single event type.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use tracing::warn;
use vitalis_events::{EventBus, EventHandler, HandlerError, SharedHandler};
use vitalis_types::{AgentIndex, Compartment, Event, EventType, RegionId};

use crate::config::TrackersConfig;

/// Which breakdowns a monitor keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorParams {
    /// Keep counts per region.
    pub track_regions: bool,
    /// Keep counts per compartment (deaths only).
    pub track_compartments: bool,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            track_regions: true,
            track_compartments: true,
        }
    }
}

impl From<&TrackersConfig> for MonitorParams {
    fn from(config: &TrackersConfig) -> Self {
        Self {
            track_regions: config.track_regions,
            track_compartments: config.track_compartments,
        }
    }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn bump<K: Ord>(map: &mut BTreeMap<K, u64>, key: K, amount: u64) {
    let slot = map.entry(key).or_insert(0);
    *slot = slot.saturating_add(amount);
}

#[derive(Debug, Default)]
struct IndexLedger {
    total: u64,
    events: u64,
    by_tick: BTreeMap<u64, u64>,
    by_region: BTreeMap<RegionId, u64>,
    by_compartment: BTreeMap<Compartment, u64>,
    recent: Vec<AgentIndex>,
    all: HashSet<AgentIndex>,
    duplicate_indices: u64,
}

impl IndexLedger {
    fn record(&mut self, kind: &'static str, tick: u64, indices: &[AgentIndex]) {
        self.recent.clear();
        self.recent.extend_from_slice(indices);

        let n = as_count(indices.len());
        self.total = self.total.saturating_add(n);
        self.events = self.events.saturating_add(1);
        bump(&mut self.by_tick, tick, n);

        for &agent in indices {
            if !self.all.insert(agent) {
                self.duplicate_indices = self.duplicate_indices.saturating_add(1);
                warn!(tick, agent = %agent, kind, "Agent index reported twice");
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of a [`BirthMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BirthSummary {
    /// Newborns seen across all events.
    pub total_births: u64,
    /// Newborns per tick.
    pub births_by_tick: BTreeMap<u64, u64>,
    /// Newborns per region; empty unless regions are tracked.
    pub births_by_region: BTreeMap<RegionId, u64>,
    /// Non-empty `births` events received.
    pub num_birth_events: u64,
    /// Size of the most recent batch.
    pub recent_birth_count: u64,
    /// Indices reported more than once.
    pub duplicate_indices: u64,
}

#[derive(Debug)]
struct BirthRecorder {
    params: MonitorParams,
    ledger: IndexLedger,
}

impl EventHandler for BirthRecorder {
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError> {
        let births = event.births().ok_or_else(|| HandlerError::UnexpectedPayload {
            event_type: event.event_type.clone(),
        })?;
        if births.agent_indices.is_empty() {
            return Ok(());
        }
        self.ledger.record("births", event.tick, &births.agent_indices);
        if self.params.track_regions {
            for (region, &count) in births.per_region_counts.iter().enumerate() {
                if count > 0 {
                    bump(&mut self.ledger.by_region, RegionId(region), count);
                }
            }
        }
        Ok(())
    }
}

/// Listens to `births` and tallies newborns.
#[derive(Debug)]
pub struct BirthMonitor {
    recorder: Rc<RefCell<BirthRecorder>>,
    bus: Rc<EventBus>,
}

impl BirthMonitor {
    /// Build the monitor and subscribe it to `births`.
    pub fn attach(bus: &Rc<EventBus>, params: MonitorParams) -> Self {
        let recorder = Rc::new(RefCell::new(BirthRecorder {
            params,
            ledger: IndexLedger::default(),
        }));
        let handler: SharedHandler = recorder.clone();
        bus.subscribe(EventType::Births, handler);
        Self {
            recorder,
            bus: Rc::clone(bus),
        }
    }

    /// Stop listening. Tallies collected so far are kept.
    pub fn detach(&self) -> bool {
        let handler: SharedHandler = self.recorder.clone();
        self.bus.unsubscribe(&EventType::Births, &handler)
    }

    /// Clear every tally. The subscription is kept.
    pub fn reset(&self) {
        self.recorder.borrow_mut().ledger.reset();
    }

    /// Indices from the most recent non-empty batch.
    pub fn recent_births(&self) -> Vec<AgentIndex> {
        self.recorder.borrow().ledger.recent.clone()
    }

    /// Every newborn index seen so far.
    pub fn all_births(&self) -> HashSet<AgentIndex> {
        self.recorder.borrow().ledger.all.clone()
    }

    /// Current tallies.
    pub fn summary(&self) -> BirthSummary {
        let recorder = self.recorder.borrow();
        let ledger = &recorder.ledger;
        BirthSummary {
            total_births: ledger.total,
            births_by_tick: ledger.by_tick.clone(),
            births_by_region: ledger.by_region.clone(),
            num_birth_events: ledger.events,
            recent_birth_count: as_count(ledger.recent.len()),
            duplicate_indices: ledger.duplicate_indices,
        }
    }
}

/// Snapshot of a [`DeathMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeathSummary {
    /// Deaths seen across all events.
    pub total_deaths: u64,
    /// Deaths per tick.
    pub deaths_by_tick: BTreeMap<u64, u64>,
    /// Deaths per region; empty unless regions are tracked.
    pub deaths_by_region: BTreeMap<RegionId, u64>,
    /// Deaths per compartment at time of death; empty unless compartments
    /// are tracked.
    pub deaths_by_compartment: BTreeMap<Compartment, u64>,
    /// Non-empty `deaths` events received.
    pub num_death_events: u64,
    /// Size of the most recent batch.
    pub recent_death_count: u64,
    /// Indices reported more than once.
    pub duplicate_indices: u64,
}

#[derive(Debug)]
struct DeathRecorder {
    params: MonitorParams,
    ledger: IndexLedger,
}

impl EventHandler for DeathRecorder {
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError> {
        let deaths = event.deaths().ok_or_else(|| HandlerError::UnexpectedPayload {
            event_type: event.event_type.clone(),
        })?;
        if deaths.agent_indices.is_empty() {
            return Ok(());
        }
        self.ledger.record("deaths", event.tick, &deaths.agent_indices);
        if self.params.track_regions {
            for &region in &deaths.region_ids {
                bump(&mut self.ledger.by_region, region, 1);
            }
        }
        if self.params.track_compartments {
            for &compartment in &deaths.compartments {
                bump(&mut self.ledger.by_compartment, compartment, 1);
            }
        }
        Ok(())
    }
}

/// Listens to `deaths` and tallies the removed agents.
#[derive(Debug)]
pub struct DeathMonitor {
    recorder: Rc<RefCell<DeathRecorder>>,
    bus: Rc<EventBus>,
}

impl DeathMonitor {
    /// Build the monitor and subscribe it to `deaths`.
    pub fn attach(bus: &Rc<EventBus>, params: MonitorParams) -> Self {
        let recorder = Rc::new(RefCell::new(DeathRecorder {
            params,
            ledger: IndexLedger::default(),
        }));
        let handler: SharedHandler = recorder.clone();
        bus.subscribe(EventType::Deaths, handler);
        Self {
            recorder,
            bus: Rc::clone(bus),
        }
    }

    /// Stop listening. Tallies collected so far are kept.
    pub fn detach(&self) -> bool {
        let handler: SharedHandler = self.recorder.clone();
        self.bus.unsubscribe(&EventType::Deaths, &handler)
    }

    /// Clear every tally. The subscription is kept.
    pub fn reset(&self) {
        self.recorder.borrow_mut().ledger.reset();
    }

    /// Indices from the most recent non-empty batch.
    pub fn recent_deaths(&self) -> Vec<AgentIndex> {
        self.recorder.borrow().ledger.recent.clone()
    }

    /// Every index reported dead so far.
    pub fn all_deaths(&self) -> HashSet<AgentIndex> {
        self.recorder.borrow().ledger.all.clone()
    }

    /// Current tallies.
    pub fn summary(&self) -> DeathSummary {
        let recorder = self.recorder.borrow();
        let ledger = &recorder.ledger;
        DeathSummary {
            total_deaths: ledger.total,
            deaths_by_tick: ledger.by_tick.clone(),
            deaths_by_region: ledger.by_region.clone(),
            deaths_by_compartment: ledger.by_compartment.clone(),
            num_death_events: ledger.events,
            recent_death_count: as_count(ledger.recent.len()),
            duplicate_indices: ledger.duplicate_indices,
        }
    }
}

#[derive(Debug, Default)]
struct Reactions {
    count: u64,
    last_tick: Option<u64>,
}

impl EventHandler for Reactions {
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError> {
        self.count = self.count.saturating_add(1);
        self.last_tick = Some(event.tick);
        Ok(())
    }
}

/// Counts deliveries of one event type.
#[derive(Debug)]
pub struct ReactionCounter {
    reactions: Rc<RefCell<Reactions>>,
    bus: Rc<EventBus>,
    event_type: EventType,
}

impl ReactionCounter {
    /// Subscribe a fresh counter to `event_type`.
    pub fn attach(bus: &Rc<EventBus>, event_type: EventType) -> Self {
        let reactions = Rc::new(RefCell::new(Reactions::default()));
        let handler: SharedHandler = reactions.clone();
        bus.subscribe(event_type.clone(), handler);
        Self {
            reactions,
            bus: Rc::clone(bus),
            event_type,
        }
    }

    /// The event type being counted.
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Deliveries so far.
    pub fn count(&self) -> u64 {
        self.reactions.borrow().count
    }

    /// Tick of the latest delivery.
    pub fn last_tick(&self) -> Option<u64> {
        self.reactions.borrow().last_tick
    }

    /// Stop counting.
    pub fn detach(&self) -> bool {
        let handler: SharedHandler = self.reactions.clone();
        self.bus.unsubscribe(&self.event_type, &handler)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitalis_types::{BirthsDetails, DeathsDetails, EventPayload};

    use super::*;

    fn births(bus: &EventBus, tick: u64, range: std::ops::Range<usize>, per_region: &[u64]) {
        let agent_indices: Vec<AgentIndex> = range.map(AgentIndex).collect();
        let total = as_count(agent_indices.len());
        bus.publish(
            EventType::Births,
            "test",
            tick,
            EventPayload::Births(BirthsDetails {
                agent_indices,
                per_region_counts: per_region.to_vec(),
                total,
                rate: 0.01,
                vaccination_delay: None,
            }),
        );
    }

    fn deaths(bus: &EventBus, tick: u64, agents: &[(usize, usize, Compartment)]) {
        bus.publish(
            EventType::Deaths,
            "test",
            tick,
            EventPayload::Deaths(DeathsDetails {
                agent_indices: agents.iter().map(|a| AgentIndex(a.0)).collect(),
                region_ids: agents.iter().map(|a| RegionId(a.1)).collect(),
                compartments: agents.iter().map(|a| a.2).collect(),
                count: as_count(agents.len()),
                rate: 0.01,
            }),
        );
    }

    #[test]
    fn birth_monitor_tallies_by_tick_and_region() {
        let bus = EventBus::shared();
        let monitor = BirthMonitor::attach(&bus, MonitorParams::default());

        births(&bus, 1, 800..803, &[2, 1]);
        births(&bus, 2, 803..803, &[0, 0]);
        births(&bus, 3, 803..805, &[0, 2]);

        let summary = monitor.summary();
        assert_eq!(summary.total_births, 5);
        assert_eq!(summary.num_birth_events, 2);
        assert_eq!(summary.births_by_tick.get(&1), Some(&3));
        assert_eq!(summary.births_by_tick.get(&2), None);
        assert_eq!(summary.births_by_region.get(&RegionId(0)), Some(&2));
        assert_eq!(summary.births_by_region.get(&RegionId(1)), Some(&3));
        assert_eq!(summary.recent_birth_count, 2);
        assert_eq!(summary.duplicate_indices, 0);
        assert_eq!(monitor.recent_births(), vec![AgentIndex(803), AgentIndex(804)]);
        assert_eq!(monitor.all_births().len(), 5);
    }

    #[test]
    fn birth_monitor_without_regions() {
        let bus = EventBus::shared();
        let monitor = BirthMonitor::attach(
            &bus,
            MonitorParams {
                track_regions: false,
                track_compartments: false,
            },
        );
        births(&bus, 1, 0..4, &[4]);
        let summary = monitor.summary();
        assert_eq!(summary.total_births, 4);
        assert!(summary.births_by_region.is_empty());
    }

    #[test]
    fn repeated_index_is_counted() {
        let bus = EventBus::shared();
        let monitor = BirthMonitor::attach(&bus, MonitorParams::default());
        births(&bus, 1, 10..12, &[2]);
        births(&bus, 2, 11..13, &[2]);
        let summary = monitor.summary();
        assert_eq!(summary.duplicate_indices, 1);
        assert_eq!(monitor.all_births().len(), 3);
    }

    #[test]
    fn death_monitor_tallies_compartments() {
        let bus = EventBus::shared();
        let monitor = DeathMonitor::attach(&bus, MonitorParams::default());

        deaths(
            &bus,
            4,
            &[
                (1, 0, Compartment::Susceptible),
                (7, 1, Compartment::Recovered),
                (9, 1, Compartment::Susceptible),
            ],
        );

        let summary = monitor.summary();
        assert_eq!(summary.total_deaths, 3);
        assert_eq!(summary.deaths_by_region.get(&RegionId(1)), Some(&2));
        assert_eq!(
            summary.deaths_by_compartment.get(&Compartment::Susceptible),
            Some(&2)
        );
        assert_eq!(
            summary.deaths_by_compartment.get(&Compartment::Recovered),
            Some(&1)
        );
        assert_eq!(summary.num_death_events, 1);
        assert!(monitor.all_deaths().contains(&AgentIndex(7)));
    }

    #[test]
    fn detached_monitor_stops_counting() {
        let bus = EventBus::shared();
        let monitor = DeathMonitor::attach(&bus, MonitorParams::default());
        deaths(&bus, 1, &[(0, 0, Compartment::Susceptible)]);
        assert!(monitor.detach());
        assert!(!bus.has_subscribers(&EventType::Deaths));
        deaths(&bus, 2, &[(1, 0, Compartment::Susceptible)]);
        assert_eq!(monitor.summary().total_deaths, 1);
    }

    #[test]
    fn reset_clears_tallies_but_keeps_listening() {
        let bus = EventBus::shared();
        let births_seen = BirthMonitor::attach(&bus, MonitorParams::default());
        let deaths_seen = DeathMonitor::attach(&bus, MonitorParams::default());
        births(&bus, 0, 10..13, &[3]);
        deaths(&bus, 0, &[(4, 0, Compartment::Recovered)]);

        births_seen.reset();
        deaths_seen.reset();
        assert_eq!(births_seen.summary(), BirthSummary::default());
        assert_eq!(deaths_seen.summary(), DeathSummary::default());
        assert!(births_seen.all_births().is_empty());
        assert!(deaths_seen.recent_deaths().is_empty());

        // Indices seen before the reset are not duplicates afterwards.
        births(&bus, 1, 10..12, &[2]);
        deaths(&bus, 1, &[(4, 0, Compartment::Recovered)]);
        let summary = births_seen.summary();
        assert_eq!(summary.total_births, 2);
        assert_eq!(summary.duplicate_indices, 0);
        assert_eq!(summary.births_by_tick.get(&1), Some(&2));
        assert_eq!(deaths_seen.summary().total_deaths, 1);
        assert_eq!(deaths_seen.summary().duplicate_indices, 0);
    }

    #[test]
    fn wrong_payload_is_a_handler_error() {
        let bus = EventBus::shared();
        let _monitor = BirthMonitor::attach(&bus, MonitorParams::default());
        let report = bus.publish(EventType::Births, "test", 0, EventPayload::Empty);
        assert_eq!(report.failed, 1);
        assert_eq!(bus.dispatch_errors(), 1);
    }

    #[test]
    fn reaction_counter_counts_only_its_type() {
        let bus = EventBus::shared();
        let counter = ReactionCounter::attach(&bus, EventType::Births);
        births(&bus, 3, 0..1, &[1]);
        births(&bus, 5, 1..1, &[0]);
        deaths(&bus, 5, &[(0, 0, Compartment::Susceptible)]);

        assert_eq!(counter.count(), 2);
        assert_eq!(counter.last_tick(), Some(5));
        assert_eq!(counter.event_type(), &EventType::Births);
        assert!(counter.detach());
    }

    #[test]
    fn summary_serializes_region_keys() {
        let bus = EventBus::shared();
        let monitor = BirthMonitor::attach(&bus, MonitorParams::default());
        births(&bus, 1, 0..2, &[0, 2]);
        let value = serde_json::to_value(monitor.summary()).unwrap();
        assert_eq!(value["births_by_region"]["1"], 2);
        assert_eq!(value["total_births"], 2);
    }
}
