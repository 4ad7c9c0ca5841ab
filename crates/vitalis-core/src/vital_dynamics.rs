//! Births and deaths at constant per-capita rates.
//!
//! Each tick, in this order:
//!
//! 1. **Deaths** -- `Poisson(population × death_rate)` agents are drawn
//!    uniformly without replacement from the active agents, marked inactive,
//!    and removed from their region's count for their current compartment.
//! 2. **Births** -- each region draws `Poisson(population_r × birth_rate)`
//!    newborns from its population at the start of the tick. The newborns
//!    occupy one contiguous range of fresh slots, ordered by region.
//! 3. **Routine immunization** (optional) -- every queued agent due at or
//!    before this tick is made immune (susceptibility 0, compartment R).
//!
//! Deaths run first so a newborn can never be drawn in the same tick's death
//! sample. Mortality is uniform: it ignores compartment and age.

use std::collections::BTreeMap;

use tracing::{debug, info};
use vitalis_events::EventEmitter;
use vitalis_population::{
    BIRTH_TICK_COLUMN, PopulationError, PopulationStore, SCHEDULED_VACCINATION_COLUMN, encode_tick,
};
use vitalis_types::{
    AgentIndex, BirthsDetails, Compartment, DeathsDetails, EventPayload, EventType, RegionId,
};

use crate::config::VitalDynamicsConfig;
use crate::process::{Process, ProcessError, ProcessReport, SimContext, signed_tick};
use crate::schedule::DueQueue;

/// Name the process publishes under.
pub const VITAL_DYNAMICS_SOURCE: &str = "vital_dynamics";

/// Running totals kept by [`VitalDynamicsProcess`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VitalDynamicsStats {
    /// Agents born since the run started.
    pub total_births: u64,
    /// Agents that died since the run started.
    pub total_deaths: u64,
    /// Agents made immune by the routine path.
    pub routine_immunized: u64,
    /// Routine entries skipped because the agent had died.
    pub routine_skipped: u64,
}

/// Estimate the store capacity a run needs.
///
/// Projects every region forward with exponential growth at `birth_rate`
/// over the run length rounded up to whole years:
///
/// ```text
/// buffered_ticks = (num_ticks * time_step_days / 365 + 1) * 365 / time_step_days
/// capacity       = Σ_r population_r * e^(birth_rate * buffered_ticks)
/// ```
///
/// Never returns less than the initial population.
pub fn estimate_capacity(
    populations: &[u64],
    birth_rate: f64,
    num_ticks: u64,
    time_step_days: u32,
) -> usize {
    let step = u64::from(time_step_days.max(1));
    let years = num_ticks
        .saturating_mul(step)
        .checked_div(365)
        .unwrap_or(0)
        .saturating_add(1);
    #[allow(clippy::cast_precision_loss)]
    let buffered_ticks = years.saturating_mul(365) as f64 / f64::from(time_step_days.max(1));
    let growth = (birth_rate * buffered_ticks).exp();

    let initial: u64 = populations.iter().fold(0, |acc, &n| acc.saturating_add(n));
    #[allow(clippy::cast_precision_loss)]
    let projected: f64 = populations.iter().map(|&n| n as f64 * growth).sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let projected = if projected.is_finite() {
        projected as u64
    } else {
        u64::MAX
    };
    usize::try_from(projected.max(initial)).unwrap_or(usize::MAX)
}

/// Births, deaths, and the optional routine immunization path.
#[derive(Debug)]
pub struct VitalDynamicsProcess {
    birth_rate: f64,
    death_rate: f64,
    /// Routine immunization delay in ticks, already scaled by the time step.
    routine_delay: Option<u64>,
    routine_queue: DueQueue,
    emitter: EventEmitter,
    stats: VitalDynamicsStats,
}

impl VitalDynamicsProcess {
    /// Build the process from its configuration.
    ///
    /// The routine delay is `routine_immunization_delay × time_step_days`.
    pub fn new(config: &VitalDynamicsConfig, time_step_days: u32, emitter: EventEmitter) -> Self {
        Self {
            birth_rate: config.birth_rate,
            death_rate: config.death_rate,
            routine_delay: config
                .routine_immunization_delay
                .map(|delay| delay.saturating_mul(u64::from(time_step_days))),
            routine_queue: DueQueue::new(),
            emitter,
            stats: VitalDynamicsStats::default(),
        }
    }

    /// Per-capita birth rate per tick.
    pub const fn birth_rate(&self) -> f64 {
        self.birth_rate
    }

    /// Per-capita death rate per tick.
    pub const fn death_rate(&self) -> f64 {
        self.death_rate
    }

    /// Routine immunization delay in ticks, when enabled.
    pub const fn routine_delay(&self) -> Option<u64> {
        self.routine_delay
    }

    /// Routine immunizations still queued.
    pub fn routine_pending(&self) -> usize {
        self.routine_queue.len()
    }

    /// Running totals.
    pub const fn stats(&self) -> VitalDynamicsStats {
        self.stats
    }

    /// Give the initial population plausible ages.
    ///
    /// With a positive death rate each active agent gets
    /// `birth_tick = -floor(Exponential(mean 1 / death_rate))`, the
    /// stationary age distribution under constant mortality. Otherwise every
    /// agent is born at tick 0.
    pub fn initialize(&self, ctx: &mut SimContext) -> Result<(), ProcessError> {
        let active = ctx.store.active_indices();
        if self.death_rate <= 0.0 {
            for i in active {
                ctx.store.set_birth_tick(i, 0)?;
            }
            return Ok(());
        }

        let mean_age = self.death_rate.recip();
        for i in active {
            let age = ctx.rng.exponential(mean_age)?;
            #[allow(clippy::cast_possible_truncation)]
            let age_ticks = age.floor().min(f64::from(i32::MAX)) as i64;
            ctx.store.set_birth_tick(i, age_ticks.saturating_neg())?;
        }
        debug!(
            agents = ctx.store.live_count(),
            mean_age, "Initial ages assigned"
        );
        Ok(())
    }

    fn sample_deaths(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        let population = ctx.regions.total_population();
        #[allow(clippy::cast_precision_loss)]
        let expected = population as f64 * self.death_rate;
        let drawn = ctx.rng.poisson(expected)?;
        if drawn == 0 {
            return Ok(());
        }

        let active = ctx.store.active_indices();
        let amount = usize::try_from(drawn).unwrap_or(usize::MAX).min(active.len());
        let victims = ctx.rng.choose_without_replacement(&active, amount)?;

        let (region_ids, compartments) = remove_agents(&mut ctx.store, &victims)?;

        let mut removed: BTreeMap<(RegionId, Compartment), u64> = BTreeMap::new();
        for (&region, &compartment) in region_ids.iter().zip(compartments.iter()) {
            let n = removed.entry((region, compartment)).or_insert(0);
            *n = n.saturating_add(1);
        }
        for ((region, compartment), n) in removed {
            ctx.regions.decrement(region, compartment, n)?;
        }

        let count = u64::try_from(victims.len()).unwrap_or(u64::MAX);
        self.stats.total_deaths = self.stats.total_deaths.saturating_add(count);
        debug!(tick, deaths = count, "Deaths sampled");

        self.emitter.emit(
            EventType::Deaths,
            tick,
            EventPayload::Deaths(DeathsDetails {
                agent_indices: victims,
                region_ids,
                compartments,
                count,
                rate: self.death_rate,
            }),
        );
        Ok(())
    }

    fn sample_births(
        &mut self,
        ctx: &mut SimContext,
        tick: u64,
        populations: &[u64],
    ) -> Result<(), ProcessError> {
        if self.birth_rate <= 0.0 {
            return Ok(());
        }

        let mut per_region_counts = Vec::with_capacity(populations.len());
        for &population in populations {
            #[allow(clippy::cast_precision_loss)]
            let expected = population as f64 * self.birth_rate;
            per_region_counts.push(ctx.rng.poisson(expected)?);
        }
        let total = per_region_counts
            .iter()
            .fold(0_u64, |acc, &n| acc.saturating_add(n));
        if total == 0 {
            return Ok(());
        }

        // Every tick written below is checked before any slot is allocated.
        let birth_tick = signed_tick(tick)?;
        encode_tick(birth_tick, BIRTH_TICK_COLUMN)?;
        let routine_tick = self
            .routine_delay
            .map(|delay| {
                let due = tick
                    .checked_add(delay)
                    .ok_or(ProcessError::TickOutOfRange { tick })?;
                encode_tick(signed_tick(due)?, SCHEDULED_VACCINATION_COLUMN)?;
                Ok::<u64, ProcessError>(due)
            })
            .transpose()?;

        let n = usize::try_from(total).unwrap_or(usize::MAX);
        let range = ctx.store.append(n)?;

        let mut next = range.start;
        for (region, &count) in per_region_counts.iter().enumerate() {
            let region = RegionId(region);
            let count_usize = usize::try_from(count).unwrap_or(usize::MAX);
            let end = next.saturating_add(count_usize).min(range.end);
            for i in next..end {
                let agent = AgentIndex(i);
                ctx.store.set_region(agent, region)?;
                ctx.store.set_birth_tick(agent, birth_tick)?;
                if let Some(due) = routine_tick {
                    ctx.store
                        .set_scheduled_vaccination_tick(agent, signed_tick(due)?)?;
                    self.routine_queue.push(due, agent);
                }
            }
            ctx.regions.increment(region, Compartment::Susceptible, count)?;
            next = end;
        }

        self.stats.total_births = self.stats.total_births.saturating_add(total);
        debug!(tick, births = total, "Births sampled");

        self.emitter.emit(
            EventType::Births,
            tick,
            EventPayload::Births(BirthsDetails {
                agent_indices: range.map(AgentIndex).collect(),
                per_region_counts,
                total,
                rate: self.birth_rate,
                vaccination_delay: self.routine_delay,
            }),
        );
        Ok(())
    }

    fn routine_immunization(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        let mut immunized: u64 = 0;
        while let Some((_, agent)) = self.routine_queue.pop_due(tick) {
            if !ctx.store.is_live(agent) {
                self.stats.routine_skipped = self.stats.routine_skipped.saturating_add(1);
                debug!(tick, agent = %agent, "Routine immunization skipped: agent inactive");
                continue;
            }
            let (Some(region), Some(current)) =
                (ctx.store.region(agent), ctx.store.compartment(agent))
            else {
                continue;
            };
            ctx.store.set_susceptibility(agent, 0.0)?;
            if current != Compartment::Recovered {
                ctx.regions
                    .transfer(region, current, Compartment::Recovered, 1)?;
                ctx.store.set_compartment(agent, Compartment::Recovered)?;
            }
            immunized = immunized.saturating_add(1);
        }
        if immunized > 0 {
            self.stats.routine_immunized = self.stats.routine_immunized.saturating_add(immunized);
            debug!(tick, immunized, "Routine immunization applied");
        }
        Ok(())
    }
}

/// Mark `victims` inactive, returning each one's region and compartment.
fn remove_agents(
    store: &mut PopulationStore,
    victims: &[AgentIndex],
) -> Result<(Vec<RegionId>, Vec<Compartment>), PopulationError> {
    let mut regions = Vec::with_capacity(victims.len());
    let mut compartments = Vec::with_capacity(victims.len());
    for &agent in victims {
        let count = store.count();
        let (Some(region), Some(compartment)) = (store.region(agent), store.compartment(agent))
        else {
            return Err(PopulationError::IndexOutOfRange {
                index: agent.get(),
                count,
            });
        };
        store.mark_inactive(agent)?;
        regions.push(region);
        compartments.push(compartment);
    }
    Ok((regions, compartments))
}

impl Process for VitalDynamicsProcess {
    fn name(&self) -> &str {
        VITAL_DYNAMICS_SOURCE
    }

    fn apply(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        // Births are drawn from the populations as they stood before deaths.
        let populations = ctx.regions.populations();

        self.sample_deaths(ctx, tick)?;
        self.sample_births(ctx, tick, &populations)?;
        if self.routine_delay.is_some() {
            self.routine_immunization(ctx, tick)?;
        }
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        if tick > 0 && tick.checked_rem(365) == Some(0) {
            info!(
                tick,
                births = self.stats.total_births,
                deaths = self.stats.total_deaths,
                "Vital dynamics yearly checkpoint"
            );
        }
        Ok(())
    }

    fn report(&self) -> Option<ProcessReport> {
        Some(ProcessReport::VitalDynamics(self.stats))
    }
}
