//! Enumeration types shared across the workspace.
//!
//! - [`Compartment`] -- disease state of an agent, with a dense index used by
//!   the region aggregate table.
//! - [`EventType`] / [`EventCategory`] -- the names events are published
//!   under and their informal grouping.
//! - [`DelayDistribution`] -- the distribution a deferred-effect process
//!   draws its per-agent delay from.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Compartment
// ---------------------------------------------------------------------------

/// Disease compartment of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Compartment {
    /// Susceptible to infection.
    #[serde(rename = "S")]
    Susceptible,
    /// Exposed (infected, not yet infectious).
    #[serde(rename = "E")]
    Exposed,
    /// Infectious.
    #[serde(rename = "I")]
    Infectious,
    /// Recovered or otherwise immune.
    #[serde(rename = "R")]
    Recovered,
}

impl Compartment {
    /// Number of compartments.
    pub const COUNT: usize = 4;

    /// Every compartment, ordered by [`Compartment::index`].
    pub const ALL: [Self; Self::COUNT] = [
        Self::Susceptible,
        Self::Exposed,
        Self::Infectious,
        Self::Recovered,
    ];

    /// Dense index of this compartment (`0..COUNT`).
    pub const fn index(self) -> usize {
        match self {
            Self::Susceptible => 0,
            Self::Exposed => 1,
            Self::Infectious => 2,
            Self::Recovered => 3,
        }
    }

    /// Inverse of [`Compartment::index`].
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Susceptible),
            1 => Some(Self::Exposed),
            2 => Some(Self::Infectious),
            3 => Some(Self::Recovered),
            _ => None,
        }
    }

    /// Single-letter label (`S`, `E`, `I`, `R`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Susceptible => "S",
            Self::Exposed => "E",
            Self::Infectious => "I",
            Self::Recovered => "R",
        }
    }
}

impl core::fmt::Display for Compartment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Coarse grouping of event types. Informational only; dispatch is keyed by
/// [`EventType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Births, deaths, aging.
    Demographic,
    /// Infection, recovery, immunity and vaccination changes.
    Epidemiological,
    /// Model and tick lifecycle markers.
    Lifecycle,
    /// Anything published under a custom name.
    Other,
}

/// The name an event is published under.
///
/// Well-known names have dedicated variants; any other name is carried by
/// [`EventType::Custom`]. The string form is what appears in logs and
/// serialized records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Newborn agents were added to the store.
    Births,
    /// Agents were marked inactive.
    Deaths,
    /// Agents aged or crossed an age milestone.
    Aging,
    /// Agents became infected.
    Infection,
    /// A transmission between agents occurred.
    Transmission,
    /// Agents recovered.
    Recovery,
    /// Generic compartment transition.
    StateChange,
    /// Passive immunity was applied to newborns.
    ProtectionStart,
    /// Passive immunity waned.
    ProtectionEnd,
    /// A batch of scheduled vaccinations was administered.
    Vaccination,
    /// Start of a tick.
    TickStart,
    /// End of a tick.
    TickEnd,
    /// Model initialization finished.
    ModelInit,
    /// Model run completed.
    ModelComplete,
    /// Any other event name.
    Custom(String),
}

impl EventType {
    /// The published name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Births => "births",
            Self::Deaths => "deaths",
            Self::Aging => "aging",
            Self::Infection => "infection",
            Self::Transmission => "transmission",
            Self::Recovery => "recovery",
            Self::StateChange => "state_change",
            Self::ProtectionStart => "protection_start",
            Self::ProtectionEnd => "protection_end",
            Self::Vaccination => "vaccination",
            Self::TickStart => "tick_start",
            Self::TickEnd => "tick_end",
            Self::ModelInit => "model_init",
            Self::ModelComplete => "model_complete",
            Self::Custom(name) => name,
        }
    }

    /// Informal category of this event type.
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::Births | Self::Deaths | Self::Aging => EventCategory::Demographic,
            Self::Infection
            | Self::Transmission
            | Self::Recovery
            | Self::StateChange
            | Self::ProtectionStart
            | Self::ProtectionEnd
            | Self::Vaccination => EventCategory::Epidemiological,
            Self::TickStart | Self::TickEnd | Self::ModelInit | Self::ModelComplete => {
                EventCategory::Lifecycle
            }
            Self::Custom(_) => EventCategory::Other,
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "births" => Self::Births,
            "deaths" => Self::Deaths,
            "aging" => Self::Aging,
            "infection" => Self::Infection,
            "transmission" => Self::Transmission,
            "recovery" => Self::Recovery,
            "state_change" => Self::StateChange,
            "protection_start" => Self::ProtectionStart,
            "protection_end" => Self::ProtectionEnd,
            "vaccination" => Self::Vaccination,
            "tick_start" => Self::TickStart,
            "tick_end" => Self::TickEnd,
            "model_init" => Self::ModelInit,
            "model_complete" => Self::ModelComplete,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Delay distributions
// ---------------------------------------------------------------------------

/// Distribution used to draw per-agent delays and durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DelayDistribution {
    /// Gamma with shape 4 and scale `mean / 4` (coefficient of variation 0.5).
    #[default]
    Gamma,
    /// Exponential with the configured mean.
    Exponential,
}

/// An unrecognised distribution name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown distribution '{name}': expected 'gamma' or 'exponential'")]
pub struct UnknownDistribution {
    /// The name that failed to parse.
    pub name: String,
}

impl core::str::FromStr for DelayDistribution {
    type Err = UnknownDistribution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gamma" => Ok(Self::Gamma),
            "exponential" | "exp" => Ok(Self::Exponential),
            _ => Err(UnknownDistribution { name: s.to_owned() }),
        }
    }
}

impl TryFrom<String> for DelayDistribution {
    type Error = UnknownDistribution;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl core::fmt::Display for DelayDistribution {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Gamma => f.write_str("gamma"),
            Self::Exponential => f.write_str("exponential"),
        }
    }
}
