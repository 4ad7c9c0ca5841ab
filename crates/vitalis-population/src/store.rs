//! Fixed-capacity columnar agent store.
//!
//! Agents are addressed by a dense [`AgentIndex`]. Slots are allocated by
//! [`PopulationStore::append`] as a contiguous range and are never removed or
//! reused: a dead agent is only marked inactive. Capacity is fixed when the
//! store is created; an append past it fails with
//! [`PopulationError::CapacityExceeded`] and leaves the store untouched.
//!
//! The optional `scheduled_vaccination_tick` column is enabled once at setup
//! with [`PopulationStore::with_vaccination_schedule`]; callers ask
//! [`PopulationStore::has_vaccination_schedule`] instead of probing the
//! column on every access.

use std::ops::Range;

use tracing::{debug, warn};
use vitalis_types::{AgentIndex, Compartment, RegionId};

use crate::error::PopulationError;

/// Sentinel stored in tick columns for "not set". Every real tick must be
/// strictly below it.
pub const TICK_UNSET: i32 = i32::MAX;

/// Columnar storage for every agent ever allocated.
#[derive(Debug, Clone)]
pub struct PopulationStore {
    capacity: usize,
    active: Vec<bool>,
    compartment: Vec<Compartment>,
    susceptibility: Vec<f64>,
    region_id: Vec<RegionId>,
    birth_tick: Vec<i32>,
    scheduled_vaccination_tick: Option<Vec<i32>>,
    live: usize,
}

impl PopulationStore {
    /// Create an empty store able to hold `capacity` agents over its
    /// lifetime.
    ///
    /// Columns grow as slots are appended; `capacity` is the hard ceiling.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            active: Vec::new(),
            compartment: Vec::new(),
            susceptibility: Vec::new(),
            region_id: Vec::new(),
            birth_tick: Vec::new(),
            scheduled_vaccination_tick: None,
            live: 0,
        }
    }

    /// Enable the `scheduled_vaccination_tick` column.
    ///
    /// Existing slots are filled with [`TICK_UNSET`].
    #[must_use]
    pub fn with_vaccination_schedule(mut self) -> Self {
        if self.scheduled_vaccination_tick.is_none() {
            self.scheduled_vaccination_tick = Some(vec![TICK_UNSET; self.active.len()]);
        }
        self
    }

    /// Whether the `scheduled_vaccination_tick` column exists.
    pub const fn has_vaccination_schedule(&self) -> bool {
        self.scheduled_vaccination_tick.is_some()
    }

    /// Maximum number of agents this store can ever hold.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots allocated so far (live and dead).
    pub const fn count(&self) -> usize {
        self.active.len()
    }

    /// Number of active agents.
    pub const fn live_count(&self) -> usize {
        self.live
    }

    /// Allocate `n` new slots and return their contiguous index range.
    ///
    /// New agents are active, susceptible, fully susceptible (1.0), in
    /// region 0 and have no birth tick; the caller assigns the real values.
    pub fn append(&mut self, n: usize) -> Result<Range<usize>, PopulationError> {
        let start = self.count();
        let Some(end) = start.checked_add(n).filter(|end| *end <= self.capacity) else {
            warn!(requested = n, count = start, capacity = self.capacity, "Store capacity exceeded");
            return Err(PopulationError::CapacityExceeded {
                requested: n,
                count: start,
                capacity: self.capacity,
            });
        };

        self.active.resize(end, true);
        self.compartment.resize(end, Compartment::Susceptible);
        self.susceptibility.resize(end, 1.0);
        self.region_id.resize(end, RegionId(0));
        self.birth_tick.resize(end, TICK_UNSET);
        if let Some(column) = self.scheduled_vaccination_tick.as_mut() {
            column.resize(end, TICK_UNSET);
        }
        self.live = self.live.saturating_add(n);
        Ok(start..end)
    }

    /// Allocate the initial population, region by region.
    ///
    /// `populations[r]` agents are placed in region `r`, all susceptible
    /// with birth tick 0. Returns the full allocated range.
    pub fn seed_regions(&mut self, populations: &[u64]) -> Result<Range<usize>, PopulationError> {
        let first = self.count();
        for (region, &size) in populations.iter().enumerate() {
            let n = usize::try_from(size)
                .ok()
                .ok_or(PopulationError::CapacityExceeded {
                    requested: usize::MAX,
                    count: self.count(),
                    capacity: self.capacity,
                })?;
            let range = self.append(n)?;
            for i in range {
                self.set_region(AgentIndex(i), RegionId(region))?;
                self.set_birth_tick(AgentIndex(i), 0)?;
            }
        }
        debug!(
            regions = populations.len(),
            agents = self.count().saturating_sub(first),
            capacity = self.capacity,
            "Initial population seeded"
        );
        Ok(first..self.count())
    }

    fn check(&self, index: AgentIndex) -> Result<usize, PopulationError> {
        let i = index.get();
        if i < self.count() {
            Ok(i)
        } else {
            Err(PopulationError::IndexOutOfRange {
                index: i,
                count: self.count(),
            })
        }
    }

    /// `index < count && active[index]`: the precondition every deferred
    /// action checks before touching an agent.
    pub fn is_live(&self, index: AgentIndex) -> bool {
        self.active.get(index.get()).copied().unwrap_or(false)
    }

    /// Whether the agent is active; `None` when out of range.
    pub fn is_active(&self, index: AgentIndex) -> Option<bool> {
        self.active.get(index.get()).copied()
    }

    /// Disease compartment of the agent.
    pub fn compartment(&self, index: AgentIndex) -> Option<Compartment> {
        self.compartment.get(index.get()).copied()
    }

    /// Susceptibility of the agent, in `[0, 1]`.
    pub fn susceptibility(&self, index: AgentIndex) -> Option<f64> {
        self.susceptibility.get(index.get()).copied()
    }

    /// Region the agent lives in.
    pub fn region(&self, index: AgentIndex) -> Option<RegionId> {
        self.region_id.get(index.get()).copied()
    }

    /// Birth tick of the agent ([`TICK_UNSET`] when never set).
    pub fn birth_tick(&self, index: AgentIndex) -> Option<i32> {
        self.birth_tick.get(index.get()).copied()
    }

    /// Scheduled routine vaccination tick, when the column is enabled.
    pub fn scheduled_vaccination_tick(&self, index: AgentIndex) -> Option<i32> {
        self.scheduled_vaccination_tick
            .as_ref()
            .and_then(|column| column.get(index.get()).copied())
    }

    /// Mark the agent inactive. Returns whether it was active before.
    pub fn mark_inactive(&mut self, index: AgentIndex) -> Result<bool, PopulationError> {
        let count = self.count();
        let Some(slot) = self.active.get_mut(index.get()) else {
            return Err(PopulationError::IndexOutOfRange {
                index: index.get(),
                count,
            });
        };
        let was_active = *slot;
        *slot = false;
        if was_active {
            self.live = self.live.saturating_sub(1);
        }
        Ok(was_active)
    }

    /// Set the agent's compartment. Region aggregates are the caller's
    /// responsibility.
    pub fn set_compartment(
        &mut self,
        index: AgentIndex,
        compartment: Compartment,
    ) -> Result<(), PopulationError> {
        let i = self.check(index)?;
        if let Some(slot) = self.compartment.get_mut(i) {
            *slot = compartment;
        }
        Ok(())
    }

    /// Set the agent's susceptibility, clamped to `[0, 1]`.
    pub fn set_susceptibility(&mut self, index: AgentIndex, value: f64) -> Result<(), PopulationError> {
        let i = self.check(index)?;
        if let Some(slot) = self.susceptibility.get_mut(i) {
            *slot = value.clamp(0.0, 1.0);
        }
        Ok(())
    }

    /// Move the agent to `region`. Region aggregates are the caller's
    /// responsibility.
    pub fn set_region(&mut self, index: AgentIndex, region: RegionId) -> Result<(), PopulationError> {
        let i = self.check(index)?;
        if let Some(slot) = self.region_id.get_mut(i) {
            *slot = region;
        }
        Ok(())
    }

    /// Set the agent's birth tick. Negative ticks (born before the run)
    /// are allowed; the sentinel is not.
    pub fn set_birth_tick(&mut self, index: AgentIndex, tick: i64) -> Result<(), PopulationError> {
        let i = self.check(index)?;
        let value = encode_tick(tick, BIRTH_TICK_COLUMN)?;
        if let Some(slot) = self.birth_tick.get_mut(i) {
            *slot = value;
        }
        Ok(())
    }

    /// Record the tick of the agent's routine vaccination.
    pub fn set_scheduled_vaccination_tick(
        &mut self,
        index: AgentIndex,
        tick: i64,
    ) -> Result<(), PopulationError> {
        let i = self.check(index)?;
        let value = encode_tick(tick, SCHEDULED_VACCINATION_COLUMN)?;
        let column = self
            .scheduled_vaccination_tick
            .as_mut()
            .ok_or(PopulationError::VaccinationColumnDisabled)?;
        if let Some(slot) = column.get_mut(i) {
            *slot = value;
        }
        Ok(())
    }

    /// Indices of every active agent, ascending.
    pub fn active_indices(&self) -> Vec<AgentIndex> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(AgentIndex(i)))
            .collect()
    }

    /// Iterate `(index, region, compartment)` over active agents.
    pub fn iter_active(&self) -> impl Iterator<Item = (AgentIndex, RegionId, Compartment)> + '_ {
        self.active
            .iter()
            .zip(self.region_id.iter())
            .zip(self.compartment.iter())
            .enumerate()
            .filter_map(|(i, ((&active, &region), &compartment))| {
                active.then_some((AgentIndex(i), region, compartment))
            })
    }
}

/// Column label of the birth tick.
pub const BIRTH_TICK_COLUMN: &str = "birth tick";

/// Column label of the scheduled routine vaccination tick.
pub const SCHEDULED_VACCINATION_COLUMN: &str = "scheduled vaccination tick";

/// Encode `tick` for a tick column. The sentinel and anything outside
/// `i32` are rejected.
pub fn encode_tick(tick: i64, column: &'static str) -> Result<i32, PopulationError> {
    i32::try_from(tick)
        .ok()
        .filter(|v| *v != TICK_UNSET)
        .ok_or(PopulationError::TickNotRepresentable { column, tick })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_contiguous_ranges() {
        let mut store = PopulationStore::new(10);
        assert_eq!(store.append(3).unwrap(), 0..3);
        assert_eq!(store.append(4).unwrap(), 3..7);
        assert_eq!(store.count(), 7);
        assert_eq!(store.live_count(), 7);
        assert_eq!(store.compartment(AgentIndex(5)), Some(Compartment::Susceptible));
        assert_eq!(store.birth_tick(AgentIndex(5)), Some(TICK_UNSET));
    }

    #[test]
    fn append_past_capacity_fails_without_writing() {
        let mut store = PopulationStore::new(5);
        store.append(4).unwrap();
        let err = store.append(2).unwrap_err();
        assert_eq!(
            err,
            PopulationError::CapacityExceeded {
                requested: 2,
                count: 4,
                capacity: 5,
            }
        );
        assert_eq!(store.count(), 4);
        assert_eq!(store.append(1).unwrap(), 4..5);
    }

    #[test]
    fn dead_agents_are_not_live_and_not_reused() {
        let mut store = PopulationStore::new(4);
        store.append(2).unwrap();
        assert!(store.mark_inactive(AgentIndex(0)).unwrap());
        assert!(!store.mark_inactive(AgentIndex(0)).unwrap());
        assert!(!store.is_live(AgentIndex(0)));
        assert!(store.is_live(AgentIndex(1)));
        assert!(!store.is_live(AgentIndex(2)));
        assert_eq!(store.live_count(), 1);

        assert_eq!(store.append(1).unwrap(), 2..3);
        assert_eq!(store.active_indices(), vec![AgentIndex(1), AgentIndex(2)]);
    }

    #[test]
    fn seed_regions_assigns_regions_in_order() {
        let mut store = PopulationStore::new(10);
        let range = store.seed_regions(&[2, 0, 3]).unwrap();
        assert_eq!(range, 0..5);
        assert_eq!(store.region(AgentIndex(1)), Some(RegionId(0)));
        assert_eq!(store.region(AgentIndex(2)), Some(RegionId(2)));
        assert_eq!(store.birth_tick(AgentIndex(4)), Some(0));
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut store = PopulationStore::new(3);
        store.append(1).unwrap();
        assert_eq!(store.compartment(AgentIndex(1)), None);
        assert!(matches!(
            store.set_compartment(AgentIndex(1), Compartment::Recovered),
            Err(PopulationError::IndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn birth_tick_rejects_sentinel_and_overflow() {
        let mut store = PopulationStore::new(1);
        store.append(1).unwrap();
        store.set_birth_tick(AgentIndex(0), -250).unwrap();
        assert_eq!(store.birth_tick(AgentIndex(0)), Some(-250));
        assert!(store.set_birth_tick(AgentIndex(0), i64::from(TICK_UNSET)).is_err());
        assert!(store.set_birth_tick(AgentIndex(0), i64::MAX).is_err());
    }

    #[test]
    fn tick_errors_name_the_column() {
        let mut store = PopulationStore::new(1).with_vaccination_schedule();
        store.append(1).unwrap();
        let too_late = i64::from(TICK_UNSET);
        assert_eq!(
            store.set_scheduled_vaccination_tick(AgentIndex(0), too_late),
            Err(PopulationError::TickNotRepresentable {
                column: SCHEDULED_VACCINATION_COLUMN,
                tick: too_late,
            })
        );
        assert_eq!(
            store.set_birth_tick(AgentIndex(0), too_late),
            Err(PopulationError::TickNotRepresentable {
                column: BIRTH_TICK_COLUMN,
                tick: too_late,
            })
        );
        assert_eq!(store.scheduled_vaccination_tick(AgentIndex(0)), Some(TICK_UNSET));
        assert_eq!(encode_tick(-3, BIRTH_TICK_COLUMN), Ok(-3));
    }

    #[test]
    fn vaccination_column_is_opt_in() {
        let mut store = PopulationStore::new(4);
        store.append(1).unwrap();
        assert!(!store.has_vaccination_schedule());
        assert_eq!(
            store.set_scheduled_vaccination_tick(AgentIndex(0), 9),
            Err(PopulationError::VaccinationColumnDisabled)
        );

        let mut store = store.with_vaccination_schedule();
        assert_eq!(store.scheduled_vaccination_tick(AgentIndex(0)), Some(TICK_UNSET));
        store.append(1).unwrap();
        store.set_scheduled_vaccination_tick(AgentIndex(1), 9).unwrap();
        assert_eq!(store.scheduled_vaccination_tick(AgentIndex(1)), Some(9));
    }

    #[test]
    fn susceptibility_is_clamped() {
        let mut store = PopulationStore::new(1);
        store.append(1).unwrap();
        store.set_susceptibility(AgentIndex(0), 1.5).unwrap();
        assert!((store.susceptibility(AgentIndex(0)).unwrap() - 1.0).abs() < f64::EPSILON);
        store.set_susceptibility(AgentIndex(0), 0.0).unwrap();
        assert!(store.susceptibility(AgentIndex(0)).unwrap().abs() < f64::EPSILON);
    }
}
