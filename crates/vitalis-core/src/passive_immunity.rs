//! Waning passive (maternal) immunity for newborns.
//!
//! On every `births` event a coverage-gated subset of the newborns is queued
//! twice: for protection in the birth tick, and for expiration at
//! `birth_tick + floor(duration)`, with the duration drawn per agent.
//!
//! Protection is applied in the **finalize** phase of the birth tick. Vital
//! dynamics writes `susceptibility = 1.0` for newborns during its apply
//! phase; acting afterwards means the protection write always lands last.
//! Expirations are drained in the apply phase of their tick; since every
//! duration is at least one tick they always follow the protection.
//!
//! Both actions revalidate their agent when they fire. Protection needs a
//! live agent with positive susceptibility; expiration needs a live agent
//! with susceptibility 0. Anything else is a stale entry and is skipped.
//! Protection changes susceptibility only, never the compartment, so region
//! aggregates are untouched.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};
use vitalis_events::{EventEmitter, EventHandler, HandlerError, SharedHandler};
use vitalis_population::{SamplingError, SimRng};
use vitalis_types::{AgentIndex, Event, EventPayload, EventType, ProtectionDetails};

use crate::config::PassiveImmunityConfig;
use crate::delay::{DelaySampler, select_covered};
use crate::process::{Process, ProcessError, ProcessReport, SimContext, liveness_skip};
use crate::schedule::TickSchedule;

/// Name the process publishes under.
pub const PASSIVE_IMMUNITY_SOURCE: &str = "passive_immunity";

/// Statistics of [`PassiveImmunityProcess`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassiveImmunityStats {
    /// Newborns selected for protection.
    pub births_protected: u64,
    /// Protections actually applied.
    pub protection_applied: u64,
    /// Protections that waned.
    pub immunity_expired: u64,
    /// `protection_applied - immunity_expired`.
    pub agents_currently_protected: u64,
    /// Expirations still scheduled.
    pub pending_expirations: u64,
    /// Deferred entries skipped on revalidation.
    pub stale_skipped: u64,
}

/// The births subscriber: selects newborns and fills both schedules.
#[derive(Debug)]
pub struct ImmunityScheduler {
    sampler: DelaySampler,
    coverage: f64,
    rng: SimRng,
    pending_protection: TickSchedule,
    expirations: TickSchedule,
    births_protected: u64,
}

impl ImmunityScheduler {
    fn schedule_births(&mut self, tick: u64, newborns: &[AgentIndex]) -> Result<usize, SamplingError> {
        let protected = select_covered(newborns, self.coverage, &self.rng)?;
        if protected.is_empty() {
            return Ok(0);
        }

        for &agent in &protected {
            let duration = self.sampler.offset_ticks(&self.rng)?;
            self.expirations.schedule(tick.saturating_add(duration), agent);
        }
        self.pending_protection.schedule_many(tick, &protected);

        let n = protected.len();
        self.births_protected = self
            .births_protected
            .saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }

    /// Expiration tick entries still pending.
    pub const fn pending_expirations(&self) -> usize {
        self.expirations.pending()
    }

    /// Protection entries still pending.
    pub const fn pending_protection(&self) -> usize {
        self.pending_protection.pending()
    }

    /// Agents due to expire at `tick`.
    pub fn expirations_at(&self, tick: u64) -> &[AgentIndex] {
        self.expirations.peek(tick)
    }

    /// Earliest scheduled expiration.
    pub fn next_expiration(&self) -> Option<u64> {
        self.expirations.next_due()
    }
}

impl EventHandler for ImmunityScheduler {
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
            debug!(tick = event.tick, scheduled, "Passive immunity scheduled");
        }
        Ok(())
    }
}

/// Waning passive immunity process.
#[derive(Debug)]
pub struct PassiveImmunityProcess {
    scheduler: Rc<RefCell<ImmunityScheduler>>,
    emitter: EventEmitter,
    protection_applied: u64,
    immunity_expired: u64,
    stale_skipped: u64,
}

impl PassiveImmunityProcess {
    /// Build the process and subscribe it to `births`.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError`] if the duration mean is not positive.
    pub fn new(
        config: &PassiveImmunityConfig,
        rng: SimRng,
        emitter: EventEmitter,
    ) -> Result<Self, SamplingError> {
        let scheduler = Rc::new(RefCell::new(ImmunityScheduler {
            sampler: DelaySampler::new(config.distribution, config.duration_mean)?,
            coverage: config.coverage,
            rng,
            pending_protection: TickSchedule::new(),
            expirations: TickSchedule::new(),
            births_protected: 0,
        }));
        let handler: SharedHandler = scheduler.clone();
        emitter.subscribe(EventType::Births, handler);
        Ok(Self {
            scheduler,
            emitter,
            protection_applied: 0,
            immunity_expired: 0,
            stale_skipped: 0,
        })
    }

    /// Stop listening to `births`. Already scheduled entries still fire.
    pub fn detach(&self) -> bool {
        let handler: SharedHandler = self.scheduler.clone();
        self.emitter.bus().unsubscribe(&EventType::Births, &handler)
    }

    /// Read access to the schedules.
    pub fn scheduler(&self) -> std::cell::Ref<'_, ImmunityScheduler> {
        self.scheduler.borrow()
    }

    /// Current statistics.
    pub fn stats(&self) -> PassiveImmunityStats {
        let scheduler = self.scheduler.borrow();
        PassiveImmunityStats {
            births_protected: scheduler.births_protected,
            protection_applied: self.protection_applied,
            immunity_expired: self.immunity_expired,
            agents_currently_protected: self.currently_protected(),
            pending_expirations: u64::try_from(scheduler.expirations.pending()).unwrap_or(u64::MAX),
            stale_skipped: self.stale_skipped,
        }
    }

    const fn currently_protected(&self) -> u64 {
        self.protection_applied.saturating_sub(self.immunity_expired)
    }

    fn skip(&mut self, tick: u64, agent: AgentIndex, action: &'static str, reason: &'static str) {
        self.stale_skipped = self.stale_skipped.saturating_add(1);
        debug!(tick, agent = %agent, action, reason, "Stale passive immunity entry skipped");
    }

    fn apply_protection(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        let due = self.scheduler.borrow_mut().pending_protection.take_due(tick);
        if due.is_empty() {
            return Ok(());
        }

        let mut applied = Vec::with_capacity(due.len());
        for agent in due {
            if let Some(reason) = liveness_skip(&ctx.store, agent) {
                self.skip(tick, agent, "protect", reason);
                continue;
            }
            if ctx.store.susceptibility(agent).unwrap_or(0.0) <= 0.0 {
                self.skip(tick, agent, "protect", "already immune");
                continue;
            }
            ctx.store.set_susceptibility(agent, 0.0)?;
            applied.push(agent);
        }
        if applied.is_empty() {
            return Ok(());
        }

        let count = u64::try_from(applied.len()).unwrap_or(u64::MAX);
        self.protection_applied = self.protection_applied.saturating_add(count);
        debug!(tick, protected = count, "Passive immunity applied");

        if self.emitter.has_subscribers(&EventType::ProtectionStart) {
            self.emitter.emit(
                EventType::ProtectionStart,
                tick,
                EventPayload::ProtectionStart(ProtectionDetails {
                    agent_indices: applied,
                    count,
                    still_protected: self.currently_protected(),
                }),
            );
        }
        Ok(())
    }

    fn expire(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        let due = self.scheduler.borrow_mut().expirations.take_due(tick);
        if due.is_empty() {
            return Ok(());
        }

        let mut expired = Vec::with_capacity(due.len());
        for agent in due {
            if let Some(reason) = liveness_skip(&ctx.store, agent) {
                self.skip(tick, agent, "expire", reason);
                continue;
            }
            if ctx.store.susceptibility(agent).unwrap_or(1.0) > 0.0 {
                self.skip(tick, agent, "expire", "already susceptible");
                continue;
            }
            ctx.store.set_susceptibility(agent, 1.0)?;
            expired.push(agent);
        }
        if expired.is_empty() {
            return Ok(());
        }

        let count = u64::try_from(expired.len()).unwrap_or(u64::MAX);
        self.immunity_expired = self.immunity_expired.saturating_add(count);
        debug!(
            tick,
            expired = count,
            still_protected = self.currently_protected(),
            "Passive immunity waned"
        );

        if self.emitter.has_subscribers(&EventType::ProtectionEnd) {
            self.emitter.emit(
                EventType::ProtectionEnd,
                tick,
                EventPayload::ProtectionEnd(ProtectionDetails {
                    agent_indices: expired,
                    count,
                    still_protected: self.currently_protected(),
                }),
            );
        }
        Ok(())
    }
}

impl Process for PassiveImmunityProcess {
    fn name(&self) -> &str {
        PASSIVE_IMMUNITY_SOURCE
    }

    fn apply(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        self.expire(ctx, tick)
    }

    fn finalize(&mut self, ctx: &mut SimContext, tick: u64) -> Result<(), ProcessError> {
        self.apply_protection(ctx, tick)?;
        if tick > 0 && tick.checked_rem(365) == Some(0) {
            let stats = self.stats();
            info!(
                tick,
                protected = stats.agents_currently_protected,
                pending = stats.pending_expirations,
                "Passive immunity yearly checkpoint"
            );
        }
        Ok(())
    }

    fn report(&self) -> Option<ProcessReport> {
        Some(ProcessReport::PassiveImmunity(self.stats()))
    }
}
