//! Event records and their typed payloads.
//!
//! An [`Event`] is built once by its producer and then only ever handed to
//! subscribers by shared reference, so it is immutable once emitted. The
//! payload schema is fixed per event type ([`EventPayload`]); events published
//! under custom names carry an arbitrary JSON value instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{Compartment, EventCategory, EventType};
use crate::ids::{AgentIndex, EventId, RegionId};

/// An immutable record of something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// The name the event is published under.
    pub event_type: EventType,
    /// Name of the process or component that emitted the event.
    pub source: String,
    /// The tick during which the event occurred.
    pub tick: u64,
    /// Wall-clock time the record was created.
    pub created_at: DateTime<Utc>,
    /// Type-specific data.
    pub payload: EventPayload,
}

impl Event {
    /// Build a new event stamped with a fresh id and the current time.
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        tick: u64,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            source: source.into(),
            tick,
            created_at: Utc::now(),
            payload,
        }
    }

    /// Informal category of this event.
    pub const fn category(&self) -> EventCategory {
        self.event_type.category()
    }

    /// The births payload, if this event carries one.
    pub const fn births(&self) -> Option<&BirthsDetails> {
        match &self.payload {
            EventPayload::Births(details) => Some(details),
            _ => None,
        }
    }

    /// The deaths payload, if this event carries one.
    pub const fn deaths(&self) -> Option<&DeathsDetails> {
        match &self.payload {
            EventPayload::Deaths(details) => Some(details),
            _ => None,
        }
    }

    /// The protection payload (start or end), if this event carries one.
    pub const fn protection(&self) -> Option<&ProtectionDetails> {
        match &self.payload {
            EventPayload::ProtectionStart(details) | EventPayload::ProtectionEnd(details) => {
                Some(details)
            }
            _ => None,
        }
    }

    /// The vaccination payload, if this event carries one.
    pub const fn vaccination(&self) -> Option<&VaccinationDetails> {
        match &self.payload {
            EventPayload::Vaccination(details) => Some(details),
            _ => None,
        }
    }
}

/// Type-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// Payload of a `births` event.
    Births(BirthsDetails),
    /// Payload of a `deaths` event.
    Deaths(DeathsDetails),
    /// Payload of a `protection_start` event.
    ProtectionStart(ProtectionDetails),
    /// Payload of a `protection_end` event.
    ProtectionEnd(ProtectionDetails),
    /// Payload of a `vaccination` event.
    Vaccination(VaccinationDetails),
    /// Free-form payload for custom event types.
    Custom(serde_json::Value),
    /// No payload.
    Empty,
}

/// Newborns added during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthsDetails {
    /// Indices of the new agents; always the contiguous range allocated this
    /// tick, in allocation order.
    pub agent_indices: Vec<AgentIndex>,
    /// Births drawn for each region, indexed by region.
    pub per_region_counts: Vec<u64>,
    /// Total number of births (`agent_indices.len()`).
    pub total: u64,
    /// Per-capita birth rate used for the draw.
    pub rate: f64,
    /// Routine immunization delay in ticks, when that path is enabled.
    pub vaccination_delay: Option<u64>,
}

/// Agents removed during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathsDetails {
    /// Indices of the agents that died.
    pub agent_indices: Vec<AgentIndex>,
    /// Region of each removed agent, aligned with `agent_indices`.
    pub region_ids: Vec<RegionId>,
    /// Compartment of each removed agent at death, aligned with
    /// `agent_indices`.
    pub compartments: Vec<Compartment>,
    /// Number of deaths.
    pub count: u64,
    /// Per-capita death rate used for the draw.
    pub rate: f64,
}

/// Agents whose passive protection started or ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionDetails {
    /// Agents affected in this batch.
    pub agent_indices: Vec<AgentIndex>,
    /// Size of the batch.
    pub count: u64,
    /// Agents still holding protection after this batch.
    pub still_protected: u64,
}

/// Outcome of one batch of scheduled vaccinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationDetails {
    /// Every agent that received a dose in this batch.
    pub agent_indices: Vec<AgentIndex>,
    /// Agents whose dose took (moved to recovered).
    pub protected_indices: Vec<AgentIndex>,
    /// Agents whose dose failed (still susceptible).
    pub unprotected_indices: Vec<AgentIndex>,
    /// `protected / administered` for this batch.
    pub realized_efficacy: f64,
    /// Label of the vaccination programme.
    pub kind: String,
}
