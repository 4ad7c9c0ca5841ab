//! The process abstraction and the shared simulation context.
//!
//! Every timed behaviour is a [`Process`]. The runner calls each process
//! twice per tick, in registration order: first [`Process::apply`] on all
//! of them, then [`Process::finalize`] on all of them. Producers write
//! during `apply`; a consumer whose effect must land after a producer's
//! write in the same tick acts during `finalize`.
//!
//! Population state is never ambient. It lives in the [`SimContext`] that
//! the runner passes to every call, and processes must not hold on to
//! references into it between calls.

use vitalis_population::{PopulationError, PopulationStore, RegionTable, SamplingError, SimRng};

use crate::passive_immunity::PassiveImmunityStats;
use crate::vaccination::VaccinationStats;
use crate::vital_dynamics::VitalDynamicsStats;

/// Errors a process can raise while running a tick.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A store or aggregate operation failed.
    #[error("population error: {source}")]
    Population {
        /// The underlying error.
        #[from]
        source: PopulationError,
    },

    /// A random draw was given invalid parameters.
    #[error("sampling error: {source}")]
    Sampling {
        /// The underlying error.
        #[from]
        source: SamplingError,
    },

    /// A computed tick does not fit the tick fields.
    #[error("tick {tick} is out of range")]
    TickOutOfRange {
        /// The offending tick.
        tick: u64,
    },
}

/// Shared mutable state handed to every process call.
#[derive(Debug)]
pub struct SimContext {
    /// Per-agent records.
    pub store: PopulationStore,
    /// Per-region compartment aggregates.
    pub regions: RegionTable,
    /// The run's random source.
    pub rng: SimRng,
    /// Days per tick.
    pub time_step_days: u32,
}

impl SimContext {
    /// Bundle the run state.
    pub const fn new(
        store: PopulationStore,
        regions: RegionTable,
        rng: SimRng,
        time_step_days: u32,
    ) -> Self {
        Self {
            store,
            regions,
            rng,
            time_step_days,
        }
    }
}

/// Statistics a process reports at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessReport {
    /// Births, deaths and routine immunization.
    VitalDynamics(VitalDynamicsStats),
    /// Waning passive immunity.
    PassiveImmunity(PassiveImmunityStats),
    /// Scheduled vaccination.
    Vaccination(VaccinationStats),
}

/// A behaviour invoked once per tick per phase.
pub trait Process: core::fmt::Debug {
    /// Name used in logs and as the source of emitted events.
    fn name(&self) -> &str;

    /// Main phase of the tick.
    fn apply(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError>;

    /// Second phase of the tick, after every process has applied.
    fn finalize(&mut self, _ctx: &mut SimContext, _tick: u64) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Run statistics, when the process keeps any.
    fn report(&self) -> Option<ProcessReport> {
        None
    }
}

/// Convert a tick to the signed value the store columns take.
pub(crate) fn signed_tick(tick: u64) -> Result<i64, ProcessError> {
    i64::try_from(tick).ok().ok_or(ProcessError::TickOutOfRange { tick })
}

/// Why a deferred action no longer applies to its agent.
///
/// Returns `None` when the agent is live and the action may proceed to its
/// own precondition check.
pub(crate) fn liveness_skip(store: &PopulationStore, agent: vitalis_types::AgentIndex) -> Option<&'static str> {
    match store.is_active(agent) {
        None => Some("index beyond allocated agents"),
        Some(false) => Some("agent inactive"),
        Some(true) => None,
    }
}
