//! Error types for the vitalis-population crate.
//!
//! Store, aggregate, and sampling operations return typed errors rather than
//! panicking. A capacity or index violation is a fatal precondition failure
//! for the caller; nothing is written when one is returned.

use vitalis_types::{Compartment, RegionId};

/// Errors raised by the agent store and the region aggregate table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PopulationError {
    /// An append would grow the store past its pre-sized capacity.
    #[error("capacity exceeded: {requested} new agents requested with {count} of {capacity} slots used")]
    CapacityExceeded {
        /// Number of slots the caller asked for.
        requested: usize,
        /// Slots already allocated.
        count: usize,
        /// Fixed capacity of the store.
        capacity: usize,
    },

    /// An agent index at or beyond the live count.
    #[error("agent index {index} out of range (count {count})")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Slots allocated so far.
        count: usize,
    },

    /// A region id not present in the aggregate table.
    #[error("unknown region {region} ({regions} regions configured)")]
    UnknownRegion {
        /// The offending region.
        region: RegionId,
        /// Number of configured regions.
        regions: usize,
    },

    /// A decrement would take an aggregate count below zero.
    #[error("aggregate underflow in region {region}, compartment {compartment}: {current} - {amount}")]
    AggregateUnderflow {
        /// Region of the count.
        region: RegionId,
        /// Compartment of the count.
        compartment: Compartment,
        /// Current value.
        current: u64,
        /// Amount the caller tried to subtract.
        amount: u64,
    },

    /// An increment would overflow an aggregate count.
    #[error("aggregate overflow in region {region}, compartment {compartment}")]
    AggregateOverflow {
        /// Region of the count.
        region: RegionId,
        /// Compartment of the count.
        compartment: Compartment,
    },

    /// A tick that does not fit in a tick column.
    #[error("tick {tick} is not representable in the {column} column")]
    TickNotRepresentable {
        /// The column being written.
        column: &'static str,
        /// The offending tick.
        tick: i64,
    },

    /// The scheduled-vaccination column was used without being enabled.
    #[error("the scheduled vaccination column is not enabled on this store")]
    VaccinationColumnDisabled,
}

/// Invalid parameters passed to a sampling routine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplingError {
    /// A distribution was given a parameter it cannot accept.
    #[error("invalid {distribution} parameter: {reason}")]
    InvalidParameter {
        /// Name of the distribution.
        distribution: &'static str,
        /// What was wrong with the parameter.
        reason: String,
    },

    /// More distinct elements requested than are available.
    #[error("cannot choose {amount} distinct elements from {len}")]
    NotEnoughElements {
        /// Elements requested.
        amount: usize,
        /// Elements available.
        len: usize,
    },
}
