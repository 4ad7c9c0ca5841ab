//! Engine binary for the Vitalis simulation.
//!
//! This is the main entry point that wires configuration, logging, and the
//! simulation together and runs it to completion.
//!
//! # Startup Sequence
//!
//! 1. Resolve the configuration path (first CLI argument, then
//!    `VITALIS_CONFIG`, then `vitalis-config.yaml`)
//! 2. Load configuration, falling back to defaults when the default file is
//!    absent
//! 3. Initialize structured logging (tracing)
//! 4. Assemble the simulation (store, regions, processes, trackers)
//! 5. Run the tick loop
//! 6. Log the result

mod error;

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;
use vitalis_core::config::{LoggingConfig, SimulationConfig};
use vitalis_core::{ProcessReport, SimulationBuilder, SimulationResult};
use vitalis_types::Compartment;

use crate::error::EngineError;

/// Config file read when no path is given.
const DEFAULT_CONFIG_PATH: &str = "vitalis-config.yaml";

/// Environment variable that overrides the config path.
const CONFIG_ENV_VAR: &str = "VITALIS_CONFIG";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration loading, assembly, or the run fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    run()?;
    Ok(())
}

fn run() -> Result<(), EngineError> {
    // 1-2. Load configuration before logging so its level applies.
    let (config, origin) = load_config()?;

    // 3. Initialize structured logging.
    init_tracing(&config.logging);
    info!("vitalis-engine starting");
    info!(
        origin = %origin,
        seed = config.run.seed,
        num_ticks = config.run.num_ticks,
        time_step_days = config.run.time_step_days,
        regions = config.population.regions.len(),
        birth_rate = config.vital_dynamics.birth_rate,
        death_rate = config.vital_dynamics.death_rate,
        passive_immunity = config.passive_immunity.is_some(),
        vaccination = config.vaccination.is_some(),
        "Configuration loaded"
    );

    // 4. Assemble.
    let mut simulation = SimulationBuilder::from_config(&config).build()?;

    // 5. Run.
    let result = simulation.run()?;

    // 6. Report.
    log_result(&result)?;
    info!("vitalis-engine shutdown complete");
    Ok(())
}

/// Where the configuration came from.
enum ConfigOrigin {
    File(PathBuf),
    Defaults,
}

impl core::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Load simulation configuration.
///
/// An explicitly named file must exist. The default file is optional; when
/// it is missing the built-in defaults are used.
fn load_config() -> Result<(SimulationConfig, ConfigOrigin), EngineError> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .map(PathBuf::from);

    let path = match explicit {
        Some(path) => path,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !path.exists() {
                return Ok((SimulationConfig::default(), ConfigOrigin::Defaults));
            }
            path
        }
    };
    let config = SimulationConfig::from_file(&path)?;
    Ok((config, ConfigOrigin::File(path)))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn log_result(result: &SimulationResult) -> Result<(), EngineError> {
    info!(
        ticks_run = result.ticks_run,
        final_population = result.final_population,
        total_births = result.total_births,
        total_deaths = result.total_deaths,
        extinct = result.extinct,
        "Simulation result"
    );

    if let Some(summary) = &result.final_summary {
        for compartment in Compartment::ALL {
            let count = summary
                .compartment_totals
                .get(compartment.index())
                .copied()
                .unwrap_or(0);
            info!(compartment = compartment.label(), count, "Final compartment total");
        }
    }

    for report in &result.reports {
        match report {
            ProcessReport::VitalDynamics(stats) => info!(
                births = stats.total_births,
                deaths = stats.total_deaths,
                routine_immunized = stats.routine_immunized,
                routine_skipped = stats.routine_skipped,
                "Vital dynamics report"
            ),
            ProcessReport::PassiveImmunity(stats) => info!(
                births_protected = stats.births_protected,
                protection_applied = stats.protection_applied,
                immunity_expired = stats.immunity_expired,
                currently_protected = stats.agents_currently_protected,
                pending_expirations = stats.pending_expirations,
                stale_skipped = stats.stale_skipped,
                "Passive immunity report"
            ),
            ProcessReport::Vaccination(stats) => info!(
                births_scheduled = stats.births_scheduled,
                completed = stats.vaccinations_completed,
                protected = stats.agents_protected,
                not_protected = stats.agents_not_protected,
                protection_rate = stats.overall_protection_rate,
                pending = stats.pending_vaccinations,
                stale_skipped = stats.stale_skipped,
                "Vaccination report"
            ),
        }
    }

    info!(
        events_emitted = result.bus_stats.events_emitted,
        subscribers = result.bus_stats.total_subscribers,
        dispatch_errors = result.bus_stats.dispatch_errors,
        "Event bus report"
    );

    if let Some(births) = &result.births {
        info!(summary = %serde_json::to_string(births)?, "Birth monitor summary");
    }
    if let Some(deaths) = &result.deaths {
        info!(summary = %serde_json::to_string(deaths)?, "Death monitor summary");
    }
    Ok(())
}
