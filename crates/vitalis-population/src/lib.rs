//! Population state for the Vitalis simulation.
//!
//! This crate owns the in-memory state every process reads and writes:
//!
//! - [`store`] -- fixed-capacity columnar agent records ([`PopulationStore`])
//! - [`regions`] -- per-region compartment aggregates ([`RegionTable`])
//! - [`rng`] -- the shared seeded random source ([`SimRng`])
//! - [`consistency`] -- the aggregate/per-agent invariant check
//! - [`error`] -- error types ([`PopulationError`], [`SamplingError`])
//!
//! It performs no I/O and knows nothing about events or scheduling.

pub mod consistency;
pub mod error;
pub mod regions;
pub mod rng;
pub mod store;

pub use consistency::{ConsistencyAnomaly, ConsistencyResult, recount, verify_consistency};
pub use error::{PopulationError, SamplingError};
pub use regions::{CompartmentCounts, RegionTable};
pub use rng::SimRng;
pub use store::{
    BIRTH_TICK_COLUMN, PopulationStore, SCHEDULED_VACCINATION_COLUMN, TICK_UNSET, encode_tick,
};
