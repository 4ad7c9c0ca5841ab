//! Shared type definitions for the Vitalis population simulation.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! event records used across the workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Positional agent/region indices and UUID event identifiers
//! - [`enums`] -- Compartments, event types and categories, delay distributions
//! - [`events`] -- The immutable [`Event`] record and its typed payloads

pub mod enums;
pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use enums::{Compartment, DelayDistribution, EventCategory, EventType, UnknownDistribution};
pub use events::{
    BirthsDetails, DeathsDetails, Event, EventPayload, ProtectionDetails, VaccinationDetails,
};
pub use ids::{AgentIndex, EventId, RegionId};
