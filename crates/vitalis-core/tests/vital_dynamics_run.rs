//! End-to-end runs of vital dynamics through the assembled simulation.
//!
//! These tests build a simulation from configuration exactly as the engine
//! does and check population bookkeeping across whole runs.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use vitalis_core::config::SimulationConfig;
use vitalis_core::{ProcessReport, SimulationBuilder};
use vitalis_events::HandlerError;
use vitalis_population::verify_consistency;
use vitalis_types::{AgentIndex, BirthsDetails, EventType};

fn two_region_config(birth_rate: f64, death_rate: f64, num_ticks: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.run.seed = 7;
    config.run.num_ticks = num_ticks;
    config.population.regions = vec![500, 300];
    config.vital_dynamics.birth_rate = birth_rate;
    config.vital_dynamics.death_rate = death_rate;
    config
}

#[test]
fn births_only_run_accounts_for_every_newborn() {
    let config = two_region_config(0.01, 0.0, 5);
    let mut sim = SimulationBuilder::from_config(&config).build().unwrap();

    let seen: Rc<RefCell<Vec<BirthsDetails>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    sim.bus().subscribe_fn(EventType::Births, move |event| {
        let births = event.births().ok_or_else(|| HandlerError::UnexpectedPayload {
            event_type: event.event_type.clone(),
        })?;
        sink.borrow_mut().push(births.clone());
        Ok(())
    });

    let result = sim.run().unwrap();
    assert_eq!(result.ticks_run, 5);
    assert_eq!(result.total_deaths, 0);
    assert_eq!(result.final_population, 800 + result.total_births);

    let batches = seen.borrow();
    let mut all = HashSet::new();
    let mut total = 0_u64;
    for batch in batches.iter() {
        assert_eq!(batch.total, batch.agent_indices.len() as u64);
        assert_eq!(batch.per_region_counts.iter().sum::<u64>(), batch.total);
        for &agent in &batch.agent_indices {
            assert!(all.insert(agent), "index {agent} born twice");
        }
        total += batch.total;
    }
    assert_eq!(total, result.total_births);
    assert!(all.iter().all(|a| a.get() >= 800));
    assert!(verify_consistency(&sim.ctx().store, &sim.ctx().regions).is_consistent());
}

#[test]
fn newborn_indices_are_contiguous_across_ticks() {
    let config = two_region_config(0.05, 0.0, 4);
    let mut sim = SimulationBuilder::from_config(&config).build().unwrap();

    let ranges: Rc<RefCell<Vec<Vec<AgentIndex>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&ranges);
    sim.bus().subscribe_fn(EventType::Births, move |event| {
        if let Some(births) = event.births() {
            sink.borrow_mut().push(births.agent_indices.clone());
        }
        Ok(())
    });
    sim.run().unwrap();

    let mut next = 800;
    for batch in ranges.borrow().iter() {
        for agent in batch {
            assert_eq!(agent.get(), next);
            next += 1;
        }
    }
    assert_eq!(sim.ctx().store.count(), next);
}

#[test]
fn deaths_are_unique_and_aggregates_stay_consistent() {
    let mut config = two_region_config(0.002, 0.002, 200);
    config.trackers.births = true;
    config.trackers.deaths = true;
    let mut sim = SimulationBuilder::from_config(&config).build().unwrap();

    let result = sim.run().unwrap();
    let deaths = result.deaths.unwrap();
    let births = result.births.unwrap();
    assert_eq!(deaths.duplicate_indices, 0);
    assert_eq!(births.duplicate_indices, 0);
    assert_eq!(deaths.total_deaths, result.total_deaths);
    assert_eq!(births.total_births, result.total_births);
    assert_eq!(
        result.final_population,
        800 + result.total_births - result.total_deaths
    );
    assert_eq!(
        sim.ctx().store.live_count() as u64,
        result.final_population
    );

    let report = result
        .reports
        .iter()
        .find_map(|r| match r {
            ProcessReport::VitalDynamics(stats) => Some(*stats),
            _ => None,
        })
        .unwrap();
    assert_eq!(report.total_births, result.total_births);
}

#[test]
fn same_seed_gives_same_run() {
    let config = two_region_config(0.003, 0.001, 120);
    let a = SimulationBuilder::from_config(&config)
        .build()
        .unwrap()
        .run()
        .unwrap();
    let b = SimulationBuilder::from_config(&config)
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(a.total_births, b.total_births);
    assert_eq!(a.total_deaths, b.total_deaths);
    assert_eq!(a.final_summary, b.final_summary);
}
