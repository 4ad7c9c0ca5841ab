//! Scheduling, processes, and the tick cycle for the Vitalis simulation.
//!
//! This crate owns everything that happens over time: the two-phase tick
//! cycle, the processes that run inside it, and the deferred-action queues
//! those processes use to act on later ticks.
//!
//! # Modules
//!
//! - [`clock`] -- Tick counter bounded by the store's tick columns.
//! - [`config`] -- Configuration loading from `vitalis-config.yaml` into
//!   strongly-typed structs.
//! - [`schedule`] -- Deferred-action queues ([`TickSchedule`], [`DueQueue`]).
//! - [`delay`] -- Per-agent delay sampling and coverage selection.
//! - [`process`] -- [`Process`] trait and the shared [`SimContext`].
//! - [`vital_dynamics`] -- Births, deaths, and routine immunization.
//! - [`passive_immunity`] -- Waning passive immunity for newborns.
//! - [`vaccination`] -- Scheduled vaccination of newborns.
//! - [`trackers`] -- Read-only subscribers that tally births and deaths.
//! - [`tick`] -- The two-phase tick cycle.
//! - [`runner`] -- Assembly from configuration and the bounded run loop.
//!
//! [`TickSchedule`]: schedule::TickSchedule
//! [`DueQueue`]: schedule::DueQueue
//! [`Process`]: process::Process
//! [`SimContext`]: process::SimContext

pub mod clock;
pub mod config;
pub mod delay;
pub mod passive_immunity;
pub mod process;
pub mod runner;
pub mod schedule;
pub mod tick;
pub mod trackers;
pub mod vaccination;
pub mod vital_dynamics;

pub use config::SimulationConfig;
pub use process::{Process, ProcessError, ProcessReport, SimContext};
pub use runner::{RunnerError, SimulationBuilder, SimulationResult};
pub use tick::{Simulation, TickError, TickPhase, TickSummary};
