//! Per-region compartment aggregates.
//!
//! The table is the second view of population state, next to the per-agent
//! columns of [`PopulationStore`](crate::PopulationStore). Every mutation
//! that changes an active agent's compartment membership must be mirrored
//! here in the same step; [`verify_consistency`](crate::verify_consistency)
//! checks that the two views agree.

use serde::{Deserialize, Serialize};
use vitalis_types::{Compartment, RegionId};

use crate::error::PopulationError;

/// Compartment counts for one region, indexed by [`Compartment::index`].
pub type CompartmentCounts = [u64; Compartment::COUNT];

/// Aggregate compartment counts for every region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTable {
    counts: Vec<CompartmentCounts>,
}

impl RegionTable {
    /// A table of `regions` empty regions.
    pub fn new(regions: usize) -> Self {
        Self {
            counts: vec![[0; Compartment::COUNT]; regions],
        }
    }

    /// A table where region `r` holds `populations[r]` susceptible agents.
    pub fn with_populations(populations: &[u64]) -> Self {
        Self {
            counts: populations
                .iter()
                .map(|&n| {
                    let mut row = [0; Compartment::COUNT];
                    if let Some(s) = row.get_mut(Compartment::Susceptible.index()) {
                        *s = n;
                    }
                    row
                })
                .collect(),
        }
    }

    /// Number of regions.
    pub const fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the table has no regions.
    pub const fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over every region id.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> {
        (0..self.counts.len()).map(RegionId)
    }

    /// All counts of one region.
    pub fn counts(&self, region: RegionId) -> Option<&CompartmentCounts> {
        self.counts.get(region.get())
    }

    /// Count of one compartment in one region.
    pub fn get(&self, region: RegionId, compartment: Compartment) -> Option<u64> {
        self.counts(region)
            .and_then(|row| row.get(compartment.index()).copied())
    }

    fn cell_mut(
        &mut self,
        region: RegionId,
        compartment: Compartment,
    ) -> Result<&mut u64, PopulationError> {
        let regions = self.counts.len();
        self.counts
            .get_mut(region.get())
            .and_then(|row| row.get_mut(compartment.index()))
            .ok_or(PopulationError::UnknownRegion { region, regions })
    }

    /// Add `amount` to one count.
    pub fn increment(
        &mut self,
        region: RegionId,
        compartment: Compartment,
        amount: u64,
    ) -> Result<(), PopulationError> {
        let cell = self.cell_mut(region, compartment)?;
        *cell = cell
            .checked_add(amount)
            .ok_or(PopulationError::AggregateOverflow {
                region,
                compartment,
            })?;
        Ok(())
    }

    /// Subtract `amount` from one count. Fails without writing when the
    /// count would go negative.
    pub fn decrement(
        &mut self,
        region: RegionId,
        compartment: Compartment,
        amount: u64,
    ) -> Result<(), PopulationError> {
        let cell = self.cell_mut(region, compartment)?;
        let current = *cell;
        *cell = current
            .checked_sub(amount)
            .ok_or(PopulationError::AggregateUnderflow {
                region,
                compartment,
                current,
                amount,
            })?;
        Ok(())
    }

    /// Move `amount` agents of `region` from one compartment to another.
    pub fn transfer(
        &mut self,
        region: RegionId,
        from: Compartment,
        to: Compartment,
        amount: u64,
    ) -> Result<(), PopulationError> {
        // Check the destination first so a failure leaves both counts intact.
        let dest = self.get(region, to).ok_or(PopulationError::UnknownRegion {
            region,
            regions: self.counts.len(),
        })?;
        if dest.checked_add(amount).is_none() {
            return Err(PopulationError::AggregateOverflow {
                region,
                compartment: to,
            });
        }
        self.decrement(region, from, amount)?;
        self.increment(region, to, amount)
    }

    /// Total population of one region (sum over compartments).
    pub fn population(&self, region: RegionId) -> Option<u64> {
        self.counts(region).map(|row| row.iter().sum())
    }

    /// Total population of every region, indexed by region.
    pub fn populations(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Count of one compartment across all regions.
    pub fn total(&self, compartment: Compartment) -> u64 {
        self.counts
            .iter()
            .filter_map(|row| row.get(compartment.index()))
            .sum()
    }

    /// Per-compartment totals across all regions.
    pub fn totals(&self) -> CompartmentCounts {
        Compartment::ALL.map(|c| self.total(c))
    }

    /// Total population across all regions.
    pub fn total_population(&self) -> u64 {
        self.counts.iter().flat_map(|row| row.iter()).sum()
    }
}
