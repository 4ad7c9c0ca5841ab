//! Simulation assembly and the bounded run loop.
//!
//! [`SimulationBuilder`] turns a [`SimulationConfig`] into a ready
//! [`Simulation`]: it sizes and seeds the store, assigns initial ages, and
//! registers the processes in their fixed order (vital dynamics, passive
//! immunity, vaccination) before attaching any trackers.
//!
//! [`Simulation::run`] then drives [`Simulation::run_tick`] until the
//! configured run length is reached or the population dies out.

use std::rc::Rc;

use tracing::{info, warn};
use vitalis_events::{BusStats, EventBus, EventEmitter};
use vitalis_population::{PopulationError, PopulationStore, RegionTable, SamplingError, SimRng};

use crate::clock::{ClockError, TickClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::passive_immunity::{PASSIVE_IMMUNITY_SOURCE, PassiveImmunityProcess};
use crate::process::{ProcessError, ProcessReport, SimContext};
use crate::tick::{Simulation, TickError, TickSummary};
use crate::trackers::{BirthMonitor, BirthSummary, DeathMonitor, DeathSummary, MonitorParams};
use crate::vaccination::{VACCINATION_SOURCE, VaccinationProcess};
use crate::vital_dynamics::{VITAL_DYNAMICS_SOURCE, VitalDynamicsProcess, estimate_capacity};

/// Errors that can occur while assembling or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configuration is invalid.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The clock could not be built.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The initial population could not be created.
    #[error("population error: {source}")]
    Population {
        /// The underlying population error.
        #[from]
        source: PopulationError,
    },

    /// A process could not be configured.
    #[error("sampling error: {source}")]
    Sampling {
        /// The underlying sampling error.
        #[from]
        source: SamplingError,
    },

    /// Initial ages could not be assigned.
    #[error("setup error: {source}")]
    Setup {
        /// The underlying process error.
        #[from]
        source: ProcessError,
    },

    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// Total number of ticks executed.
    pub ticks_run: u64,
    /// Live agents when the run ended.
    pub final_population: u64,
    /// Births over the whole run.
    pub total_births: u64,
    /// Deaths over the whole run.
    pub total_deaths: u64,
    /// Whether the run stopped early because no agent was left.
    pub extinct: bool,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Final statistics of every process, in registration order.
    pub reports: Vec<ProcessReport>,
    /// Event bus statistics.
    pub bus_stats: BusStats,
    /// Birth monitor summary, when one was attached.
    pub births: Option<BirthSummary>,
    /// Death monitor summary, when one was attached.
    pub deaths: Option<DeathSummary>,
}

impl Simulation {
    /// Run every remaining tick, stopping early on extinction.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Tick`] if a tick fails; the simulation stays at
    /// the failed tick.
    pub fn run(&mut self) -> Result<SimulationResult, RunnerError> {
        let start_tick = self.clock().tick();
        info!(
            start_tick,
            num_ticks = self.clock().num_ticks(),
            population = self.ctx().regions.total_population(),
            processes = ?self.process_names(),
            "Simulation starting"
        );

        let mut final_summary = None;
        let mut extinct = false;
        while !self.clock().is_finished() {
            let summary = self.run_tick()?;
            let population = summary.population;
            let tick = summary.tick;
            final_summary = Some(summary);
            if population == 0 {
                info!(tick, "No live agents left -- extinction");
                extinct = true;
                break;
            }
        }

        let ticks_run = self.clock().tick().saturating_sub(start_tick);
        if ticks_run == 0 {
            warn!("Simulation ended with no ticks executed");
        }

        let (total_births, total_deaths) = self.vital_totals();
        let result = SimulationResult {
            ticks_run,
            final_population: self.ctx().regions.total_population(),
            total_births,
            total_deaths,
            extinct,
            final_summary,
            reports: self.reports(),
            bus_stats: self.bus().stats(),
            births: self.birth_monitor().map(BirthMonitor::summary),
            deaths: self.death_monitor().map(DeathMonitor::summary),
        };
        info!(
            ticks_run,
            final_population = result.final_population,
            total_births,
            total_deaths,
            extinct,
            events = result.bus_stats.events_emitted,
            dispatch_errors = result.bus_stats.dispatch_errors,
            "Simulation ended"
        );
        Ok(result)
    }
}

/// Assembles a [`Simulation`] from configuration.
#[derive(Debug)]
pub struct SimulationBuilder<'a> {
    config: &'a SimulationConfig,
    capacity: Option<usize>,
}

impl<'a> SimulationBuilder<'a> {
    /// Start from a configuration.
    pub const fn from_config(config: &'a SimulationConfig) -> Self {
        Self {
            config,
            capacity: None,
        }
    }

    /// Override the projected store capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Validate the configuration and assemble the simulation.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] for invalid values,
    /// [`RunnerError::Clock`] for an over-long run,
    /// [`RunnerError::Population`] when the initial population does not fit
    /// the capacity, and [`RunnerError::Sampling`] for unusable delay means.
    pub fn build(self) -> Result<Simulation, RunnerError> {
        let config = self.config;
        config.validate()?;

        let run = &config.run;
        let populations = &config.population.regions;
        let vital = &config.vital_dynamics;

        let clock = TickClock::new(run.num_ticks)?;
        let capacity = self.capacity.unwrap_or_else(|| {
            estimate_capacity(populations, vital.birth_rate, run.num_ticks, run.time_step_days)
        });

        let mut store = PopulationStore::new(capacity);
        if vital.routine_immunization_delay.is_some() {
            store = store.with_vaccination_schedule();
        }
        store.seed_regions(populations)?;
        let regions = RegionTable::with_populations(populations);
        let rng = SimRng::seeded(run.seed);
        let bus = EventBus::shared();
        let mut ctx = SimContext::new(store, regions, rng.clone(), run.time_step_days);

        let vital_dynamics = VitalDynamicsProcess::new(
            vital,
            run.time_step_days,
            EventEmitter::new(Rc::clone(&bus), VITAL_DYNAMICS_SOURCE),
        );
        vital_dynamics.initialize(&mut ctx)?;

        let mut sim = Simulation::new(ctx, Rc::clone(&bus), clock)
            .with_verification(run.verify_consistency);
        sim.add_process(Box::new(vital_dynamics));

        if let Some(passive) = &config.passive_immunity {
            let process = PassiveImmunityProcess::new(
                passive,
                rng.clone(),
                EventEmitter::new(Rc::clone(&bus), PASSIVE_IMMUNITY_SOURCE),
            )?;
            sim.add_process(Box::new(process));
        }
        if let Some(vaccination) = &config.vaccination {
            let process = VaccinationProcess::new(
                vaccination,
                rng,
                EventEmitter::new(Rc::clone(&bus), VACCINATION_SOURCE),
            )?;
            sim.add_process(Box::new(process));
        }

        let params = MonitorParams::from(&config.trackers);
        if config.trackers.births {
            sim.set_birth_monitor(BirthMonitor::attach(&bus, params));
        }
        if config.trackers.deaths {
            sim.set_death_monitor(DeathMonitor::attach(&bus, params));
        }

        info!(
            regions = populations.len(),
            population = sim.ctx().regions.total_population(),
            capacity,
            seed = run.seed,
            subscribers = bus.stats().total_subscribers,
            "Simulation assembled"
        );
        Ok(sim)
    }
}
