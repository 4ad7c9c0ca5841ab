//! Aggregate/per-agent consistency verification.
//!
//! The population is held twice: per agent in the [`PopulationStore`] and
//! per region in the [`RegionTable`]. For every region `r` and compartment
//! `c` the check is:
//!
//! ```text
//! regions[r][c] == |{ i : active[i] && region_id[i] == r && compartment[i] == c }|
//! ```
//!
//! Every mutator keeps the two views in step, so the check passes by
//! construction; a failure is an [`ConsistencyAnomaly`] naming every cell
//! that disagrees.

use std::collections::BTreeMap;

use vitalis_types::{Compartment, RegionId};

use crate::regions::{CompartmentCounts, RegionTable};
use crate::store::PopulationStore;

/// The result of a consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyResult {
    /// Both views agree.
    Consistent,
    /// One or more aggregate cells disagree with the recount.
    Anomaly(ConsistencyAnomaly),
}

impl ConsistencyResult {
    /// Whether the check passed.
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// The anomaly, when the check failed.
    pub const fn anomaly(&self) -> Option<&ConsistencyAnomaly> {
        match self {
            Self::Consistent => None,
            Self::Anomaly(anomaly) => Some(anomaly),
        }
    }
}

/// Details of a failed consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyAnomaly {
    /// `(aggregate, recount)` for every disagreeing `(region, compartment)`.
    pub mismatches: BTreeMap<(RegionId, Compartment), (u64, u64)>,
    /// Active agents whose region is not in the table.
    pub orphaned_agents: u64,
    /// Human-readable summary.
    pub message: String,
}

/// Recount active agents per region and compartment.
///
/// Agents in regions beyond `regions` are returned separately as the
/// second element.
pub fn recount(store: &PopulationStore, regions: usize) -> (Vec<CompartmentCounts>, u64) {
    let mut counts = vec![[0_u64; Compartment::COUNT]; regions];
    let mut orphaned: u64 = 0;
    for (_, region, compartment) in store.iter_active() {
        match counts
            .get_mut(region.get())
            .and_then(|row| row.get_mut(compartment.index()))
        {
            Some(cell) => *cell = cell.saturating_add(1),
            None => orphaned = orphaned.saturating_add(1),
        }
    }
    (counts, orphaned)
}

/// Verify that the region table matches the per-agent records.
pub fn verify_consistency(store: &PopulationStore, regions: &RegionTable) -> ConsistencyResult {
    let (recounted, orphaned_agents) = recount(store, regions.len());

    let mut mismatches = BTreeMap::new();
    for (region, row) in regions.region_ids().zip(recounted.iter()) {
        for compartment in Compartment::ALL {
            let aggregate = regions.get(region, compartment).unwrap_or(0);
            let actual = row.get(compartment.index()).copied().unwrap_or(0);
            if aggregate != actual {
                mismatches.insert((region, compartment), (aggregate, actual));
            }
        }
    }

    if mismatches.is_empty() && orphaned_agents == 0 {
        return ConsistencyResult::Consistent;
    }

    let details: Vec<String> = mismatches
        .iter()
        .map(|((region, compartment), (aggregate, actual))| {
            format!("region {region} {compartment}: aggregate={aggregate}, agents={actual}")
        })
        .collect();
    let message = format!(
        "{} aggregate cell(s) disagree, {orphaned_agents} agent(s) outside known regions: {}",
        mismatches.len(),
        details.join("; ")
    );

    ConsistencyResult::Anomaly(ConsistencyAnomaly {
        mismatches,
        orphaned_agents,
        message,
    })
}
