//! Tick cycle: the two-phase loop body that drives the Vitalis simulation.
//!
//! Each tick runs in two passes over the registered processes:
//!
//! 1. **Apply** -- every process, in registration order. Producers (vital
//!    dynamics) write here and emit their events; subscribers schedule.
//!
//! 2. **Finalize** -- every process again, in the same order. Consumers
//!    whose write must land after a producer's same-tick write act here.
//!
//! When verification is enabled the aggregate/per-agent invariant is
//! checked after every single process call, so a violation names the
//! process and phase that caused it.

use std::rc::Rc;

use tracing::{debug, error};
use vitalis_events::EventBus;
use vitalis_population::{CompartmentCounts, verify_consistency};

use crate::clock::{ClockError, TickClock};
use crate::process::{Process, ProcessError, ProcessReport, SimContext};
use crate::trackers::{BirthMonitor, DeathMonitor};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A process failed.
    #[error("process '{process}' failed during {phase} of tick {tick}: {source}")]
    Process {
        /// The tick being run.
        tick: u64,
        /// Name of the failing process.
        process: String,
        /// Phase the failure happened in.
        phase: TickPhase,
        /// The underlying error.
        source: ProcessError,
    },

    /// Region aggregates disagree with the per-agent records.
    #[error("consistency violation after '{process}' {phase} at tick {tick}: {message}")]
    ConsistencyViolation {
        /// The tick being run.
        tick: u64,
        /// The process that ran last.
        process: String,
        /// The phase that ran last.
        phase: TickPhase,
        /// Description of the disagreeing cells.
        message: String,
    },

    /// Every configured tick has already run.
    #[error("run complete: all {num_ticks} ticks executed")]
    RunComplete {
        /// Configured run length.
        num_ticks: u64,
    },
}

/// The two passes of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// First pass.
    Apply,
    /// Second pass.
    Finalize,
}

impl core::fmt::Display for TickPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Live agents at end of tick.
    pub population: u64,
    /// Live agents per compartment at end of tick, by [`Compartment::index`].
    ///
    /// [`Compartment::index`]: vitalis_types::Compartment::index
    pub compartment_totals: CompartmentCounts,
    /// Births during this tick.
    pub births: u64,
    /// Deaths during this tick.
    pub deaths: u64,
}

/// A fully assembled simulation: state, bus, clock, and ordered processes.
#[derive(Debug)]
pub struct Simulation {
    ctx: SimContext,
    bus: Rc<EventBus>,
    clock: TickClock,
    processes: Vec<Box<dyn Process>>,
    verify: bool,
    birth_monitor: Option<BirthMonitor>,
    death_monitor: Option<DeathMonitor>,
}

impl Simulation {
    /// Bundle run state with no processes registered yet.
    pub const fn new(ctx: SimContext, bus: Rc<EventBus>, clock: TickClock) -> Self {
        Self {
            ctx,
            bus,
            clock,
            processes: Vec::new(),
            verify: true,
            birth_monitor: None,
            death_monitor: None,
        }
    }

    /// Enable or disable the per-call consistency check.
    #[must_use]
    pub const fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Register a process. Processes run in registration order.
    pub fn add_process(&mut self, process: Box<dyn Process>) {
        debug!(process = process.name(), "Process registered");
        self.processes.push(process);
    }

    /// Keep a birth monitor whose summary is reported with the result.
    pub fn set_birth_monitor(&mut self, monitor: BirthMonitor) {
        self.birth_monitor = Some(monitor);
    }

    /// Keep a death monitor whose summary is reported with the result.
    pub fn set_death_monitor(&mut self, monitor: DeathMonitor) {
        self.death_monitor = Some(monitor);
    }

    /// Shared state.
    pub const fn ctx(&self) -> &SimContext {
        &self.ctx
    }

    /// Mutable shared state, for setup and inspection between ticks.
    pub const fn ctx_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    /// The event bus.
    pub const fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// The clock.
    pub const fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Registered process names, in run order.
    pub fn process_names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name()).collect()
    }

    /// Current statistics of every process that keeps any.
    pub fn reports(&self) -> Vec<ProcessReport> {
        self.processes.iter().filter_map(|p| p.report()).collect()
    }

    /// The birth monitor, if attached.
    pub const fn birth_monitor(&self) -> Option<&BirthMonitor> {
        self.birth_monitor.as_ref()
    }

    /// The death monitor, if attached.
    pub const fn death_monitor(&self) -> Option<&DeathMonitor> {
        self.death_monitor.as_ref()
    }

    /// Cumulative `(births, deaths)` as reported by vital dynamics.
    pub fn vital_totals(&self) -> (u64, u64) {
        self.processes
            .iter()
            .filter_map(|p| match p.report() {
                Some(ProcessReport::VitalDynamics(stats)) => {
                    Some((stats.total_births, stats.total_deaths))
                }
                _ => None,
            })
            .fold((0, 0), |(b, d), (nb, nd)| {
                (b.saturating_add(nb), d.saturating_add(nd))
            })
    }

    /// Execute the current tick and advance the clock.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::RunComplete`] when the run has already finished,
    /// [`TickError::Process`] when a process fails, and
    /// [`TickError::ConsistencyViolation`] when verification is enabled and
    /// the aggregates drift from the per-agent records. A failed tick leaves
    /// the clock where it was.
    pub fn run_tick(&mut self) -> Result<TickSummary, TickError> {
        if self.clock.is_finished() {
            return Err(TickError::RunComplete {
                num_ticks: self.clock.num_ticks(),
            });
        }
        let tick = self.clock.tick();
        let (births_before, deaths_before) = self.vital_totals();

        for phase in [TickPhase::Apply, TickPhase::Finalize] {
            for process in &mut self.processes {
                let outcome = match phase {
                    TickPhase::Apply => process.apply(&mut self.ctx, tick),
                    TickPhase::Finalize => process.finalize(&mut self.ctx, tick),
                };
                outcome.map_err(|source| TickError::Process {
                    tick,
                    process: process.name().to_owned(),
                    phase,
                    source,
                })?;
                if self.verify {
                    check_consistency(&self.ctx, tick, process.name(), phase)?;
                }
            }
        }

        self.clock.advance()?;

        let (births_after, deaths_after) = self.vital_totals();
        let summary = TickSummary {
            tick,
            population: self.ctx.regions.total_population(),
            compartment_totals: self.ctx.regions.totals(),
            births: births_after.saturating_sub(births_before),
            deaths: deaths_after.saturating_sub(deaths_before),
        };
        debug!(
            tick,
            population = summary.population,
            births = summary.births,
            deaths = summary.deaths,
            "Tick complete"
        );
        Ok(summary)
    }
}

fn check_consistency(
    ctx: &SimContext,
    tick: u64,
    process: &str,
    phase: TickPhase,
) -> Result<(), TickError> {
    let Some(anomaly) = verify_consistency(&ctx.store, &ctx.regions).anomaly().cloned() else {
        return Ok(());
    };
    error!(
        tick,
        process,
        %phase,
        cells = anomaly.mismatches.len(),
        orphaned = anomaly.orphaned_agents,
        "Consistency violation"
    );
    Err(TickError::ConsistencyViolation {
        tick,
        process: process.to_owned(),
        phase,
        message: anomaly.message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use vitalis_population::{PopulationStore, RegionTable, SimRng};
    use vitalis_types::{Compartment, RegionId};

    use super::*;

    #[derive(Debug)]
    struct Recording {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Process for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn apply(&mut self, _ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
            self.log.borrow_mut().push(format!("{tick}:{}:apply", self.name));
            Ok(())
        }

        fn finalize(&mut self, _ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
            self.log.borrow_mut().push(format!("{tick}:{}:finalize", self.name));
            Ok(())
        }
    }

    /// Bumps an aggregate without touching any agent.
    #[derive(Debug)]
    struct Drift;

    impl Process for Drift {
        fn name(&self) -> &str {
            "drift"
        }

        fn apply(&mut self, ctx: &mut SimContext, _tick: u64) -> Result<(), ProcessError> {
            ctx.regions.increment(RegionId(0), Compartment::Recovered, 1)?;
            Ok(())
        }
    }

    fn simulation(num_ticks: u64) -> Simulation {
        let populations = [10, 5];
        let mut store = PopulationStore::new(100);
        store.seed_regions(&populations).unwrap();
        let ctx = SimContext::new(
            store,
            RegionTable::with_populations(&populations),
            SimRng::seeded(1),
            1,
        );
        Simulation::new(ctx, EventBus::shared(), TickClock::new(num_ticks).unwrap())
    }

    #[test]
    fn all_applies_run_before_any_finalize() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sim = simulation(2);
        sim.add_process(Box::new(Recording {
            name: "a",
            log: Rc::clone(&log),
        }));
        sim.add_process(Box::new(Recording {
            name: "b",
            log: Rc::clone(&log),
        }));

        sim.run_tick().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["0:a:apply", "0:b:apply", "0:a:finalize", "0:b:finalize"]
        );
        assert_eq!(sim.clock().tick(), 1);
        assert_eq!(sim.process_names(), vec!["a", "b"]);
    }

    #[test]
    fn summary_reports_population() {
        let mut sim = simulation(1);
        let summary = sim.run_tick().unwrap();
        assert_eq!(summary.tick, 0);
        assert_eq!(summary.population, 15);
        assert_eq!(summary.compartment_totals[Compartment::Susceptible.index()], 15);
        assert_eq!(summary.births, 0);
        assert_eq!(summary.deaths, 0);
    }

    #[test]
    fn run_tick_past_end_is_an_error() {
        let mut sim = simulation(1);
        sim.run_tick().unwrap();
        let err = sim.run_tick().unwrap_err();
        assert!(matches!(err, TickError::RunComplete { num_ticks: 1 }));
    }

    #[test]
    fn drift_is_caught_and_named() {
        let mut sim = simulation(3);
        sim.add_process(Box::new(Drift));
        let err = sim.run_tick().unwrap_err();
        assert!(matches!(
            &err,
            TickError::ConsistencyViolation {
                tick: 0,
                process,
                phase: TickPhase::Apply,
                ..
            } if process == "drift"
        ));
        assert_eq!(sim.clock().tick(), 0);
    }

    #[test]
    fn drift_passes_when_verification_is_off() {
        let mut sim = simulation(1).with_verification(false);
        sim.add_process(Box::new(Drift));
        let summary = sim.run_tick().unwrap();
        assert_eq!(summary.population, 16);
    }
}
