//! Scheduled vaccination of newborns.
//!
//! On every `births` event a coverage-gated subset of the newborns is
//! scheduled for a dose at `birth_tick + floor(delay)`. When the tick comes,
//! each scheduled agent that is still live and still susceptible receives an
//! independent trial with probability `efficacy`. Successes move S to R for
//! good, in both the agent record and the region aggregate. Failures stay
//! susceptible but count as administered.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};
use vitalis_events::{EventEmitter, EventHandler, HandlerError, SharedHandler};
use vitalis_population::{SamplingError, SimRng};
use vitalis_types::{
    AgentIndex, Compartment, Event, EventPayload, EventType, VaccinationDetails,
};

use crate::config::VaccinationConfig;
use crate::delay::{DelaySampler, select_covered};
use crate::process::{Process, ProcessError, ProcessReport, SimContext, liveness_skip};
use crate::schedule::TickSchedule;

/// Name the process publishes under.
pub const VACCINATION_SOURCE: &str = "vaccination";

/// Statistics of [`VaccinationProcess`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VaccinationStats {
    /// Newborns scheduled for a dose.
    pub births_scheduled: u64,
    /// Doses administered.
    pub vaccinations_completed: u64,
    /// Doses that protected.
    pub agents_protected: u64,
    /// Doses that did not protect.
    pub agents_not_protected: u64,
    /// `agents_protected / vaccinations_completed`, 0 before any dose.
    pub overall_protection_rate: f64,
    /// Doses still scheduled.
    pub pending_vaccinations: u64,
    /// Scheduled doses skipped on revalidation.
    pub stale_skipped: u64,
}

/// The births subscriber: selects newborns and schedules their dose.
#[derive(Debug)]
pub struct VaccinationScheduler {
    sampler: DelaySampler,
    coverage: f64,
    rng: SimRng,
    schedule: TickSchedule,
    births_scheduled: u64,
}

impl VaccinationScheduler {
    fn schedule_births(&mut self, tick: u64, newborns: &[AgentIndex]) -> Result<usize, SamplingError> {
        let eligible = select_covered(newborns, self.coverage, &self.rng)?;
        for &agent in &eligible {
            let delay = self.sampler.offset_ticks(&self.rng)?;
            self.schedule.schedule(tick.saturating_add(delay), agent);
        }
        let n = eligible.len();
        self.births_scheduled = self
            .births_scheduled
            .saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }

    /// Doses still scheduled.
    pub const fn pending(&self) -> usize {
        self.schedule.pending()
    }

    /// Agents scheduled for `tick`.
    pub fn scheduled_at(&self, tick: u64) -> &[AgentIndex] {
        self.schedule.peek(tick)
    }
}

impl EventHandler for VaccinationScheduler {
    fn handle(&mut self, event: &Event) -> Result<(), HandlerError> {
        let births = event.births().ok_or_else(|| HandlerError::UnexpectedPayload {
            event_type: event.event_type.clone(),
        })?;
        if births.agent_indices.is_empty() {
            return Ok(());
        }
        let scheduled = self
            .schedule_births(event.tick, &births.agent_indices)
            .map_err(HandlerError::from_error)?;
        if scheduled > 0 {
            debug!(tick = event.tick, scheduled, "Vaccinations scheduled");
        }
        Ok(())
    }
}

/// Scheduled vaccination process.
#[derive(Debug)]
pub struct VaccinationProcess {
    scheduler: Rc<RefCell<VaccinationScheduler>>,
    emitter: EventEmitter,
    efficacy: f64,
    kind: String,
    vaccinations_completed: u64,
    agents_protected: u64,
    agents_not_protected: u64,
    stale_skipped: u64,
}

impl VaccinationProcess {
    /// Build the process and subscribe it to `births`.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError`] if the delay mean is not positive.
    pub fn new(
        config: &VaccinationConfig,
        rng: SimRng,
        emitter: EventEmitter,
    ) -> Result<Self, SamplingError> {
        let scheduler = Rc::new(RefCell::new(VaccinationScheduler {
            sampler: DelaySampler::new(config.delay_distribution, config.delay_mean)?,
            coverage: config.coverage,
            rng,
            schedule: TickSchedule::new(),
            births_scheduled: 0,
        }));
        let handler: SharedHandler = scheduler.clone();
        emitter.subscribe(EventType::Births, handler);
        Ok(Self {
            scheduler,
            emitter,
            efficacy: config.efficacy.clamp(0.0, 1.0),
            kind: config.kind.clone(),
            vaccinations_completed: 0,
            agents_protected: 0,
            agents_not_protected: 0,
            stale_skipped: 0,
        })
    }

    /// Stop listening to `births`. Already scheduled doses still fire.
    pub fn detach(&self) -> bool {
        let handler: SharedHandler = self.scheduler.clone();
        self.emitter.bus().unsubscribe(&EventType::Births, &handler)
    }

    /// Read access to the schedule.
    pub fn scheduler(&self) -> std::cell::Ref<'_, VaccinationScheduler> {
        self.scheduler.borrow()
    }

    /// Current statistics.
    pub fn stats(&self) -> VaccinationStats {
        let scheduler = self.scheduler.borrow();
        #[allow(clippy::cast_precision_loss)]
        let overall_protection_rate = if self.vaccinations_completed == 0 {
            0.0
        } else {
            self.agents_protected as f64 / self.vaccinations_completed as f64
        };
        VaccinationStats {
            births_scheduled: scheduler.births_scheduled,
            vaccinations_completed: self.vaccinations_completed,
            agents_protected: self.agents_protected,
            agents_not_protected: self.agents_not_protected,
            overall_protection_rate,
            pending_vaccinations: u64::try_from(scheduler.schedule.pending()).unwrap_or(u64::MAX),
            stale_skipped: self.stale_skipped,
        }
    }

    /// Administer the doses due at `tick`.
    fn vaccinate(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        let due = self.scheduler.borrow_mut().schedule.take_due(tick);
        if due.is_empty() {
            return Ok(());
        }

        let mut administered = Vec::with_capacity(due.len());
        let mut protected = Vec::new();
        let mut unprotected = Vec::new();
        for agent in due {
            if let Some(reason) = liveness_skip(&ctx.store, agent) {
                self.skip(tick, agent, reason);
                continue;
            }
            let (Some(region), Some(Compartment::Susceptible)) =
                (ctx.store.region(agent), ctx.store.compartment(agent))
            else {
                self.skip(tick, agent, "not susceptible");
                continue;
            };

            administered.push(agent);
            if ctx.rng.bernoulli(self.efficacy) {
                ctx.regions
                    .transfer(region, Compartment::Susceptible, Compartment::Recovered, 1)?;
                ctx.store.set_compartment(agent, Compartment::Recovered)?;
                protected.push(agent);
            } else {
                unprotected.push(agent);
            }
        }
        if administered.is_empty() {
            return Ok(());
        }

        let n = u64::try_from(administered.len()).unwrap_or(u64::MAX);
        let n_protected = u64::try_from(protected.len()).unwrap_or(u64::MAX);
        let n_unprotected = u64::try_from(unprotected.len()).unwrap_or(u64::MAX);
        self.vaccinations_completed = self.vaccinations_completed.saturating_add(n);
        self.agents_protected = self.agents_protected.saturating_add(n_protected);
        self.agents_not_protected = self.agents_not_protected.saturating_add(n_unprotected);

        #[allow(clippy::cast_precision_loss)]
        let realized_efficacy = n_protected as f64 / n as f64;
        debug!(
            tick,
            administered = n,
            protected = n_protected,
            realized_efficacy,
            "Vaccinations administered"
        );

        if self.emitter.has_subscribers(&EventType::Vaccination) {
            self.emitter.emit(
                EventType::Vaccination,
                tick,
                EventPayload::Vaccination(VaccinationDetails {
                    agent_indices: administered,
                    protected_indices: protected,
                    unprotected_indices: unprotected,
                    realized_efficacy,
                    kind: self.kind.clone(),
                }),
            );
        }
        Ok(())
    }

    fn skip(&mut self, tick: u64, agent: AgentIndex, reason: &'static str) {
        self.stale_skipped = self.stale_skipped.saturating_add(1);
        debug!(tick, agent = %agent, reason, "Stale vaccination entry skipped");
    }
}

impl Process for VaccinationProcess {
    fn name(&self) -> &str {
        VACCINATION_SOURCE
    }

    fn apply(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        self.vaccinate(ctx, tick)?;
        if tick > 0 && tick.checked_rem(365) == Some(0) {
            let stats = self.stats();
            info!(
                tick,
                completed = stats.vaccinations_completed,
                protection_rate = stats.overall_protection_rate,
                pending = stats.pending_vaccinations,
                "Vaccination yearly checkpoint"
            );
        }
        Ok(())
    }

    fn report(&self) -> Option<ProcessReport> {
        Some(ProcessReport::Vaccination(self.stats()))
    }
}
