//! Loom Engine Runtime
//!
//! Boots a World with the demo systems, starts background workers and runs
//! the fixed-step loop until the configured tick limit.
//!
//! Usage: `loom [settings.json]`

mod systems;
mod workers;

use anyhow::{Context, Result};
use loom_core::time::FixedStep;
use loom_core::World;
use loom_metrics::{Stopwatch, TickBudget};
use loom_services::Settings;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use systems::{Census, CensusCounts, Movement, Scoring, Spawner};
use workers::{progress_handlers, ProgressBoard, WorkerPool};

fn main() -> Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("loading settings from {path}"))?,
        None => Settings::default(),
    };
    settings.validate()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(settings.log_level()?)
        .init();

    tracing::info!("Loom Engine v{}", loom_core::VERSION);

    let score = Rc::new(RefCell::new(0.0));
    let mut world = World::new();
    world.spawn_system(Census)?;
    world.spawn_system(Movement)?;
    world.spawn_system(Spawner::new(10, 64))?;
    world.spawn_system(Scoring::new(Rc::clone(&score)))?;

    let pool = WorkerPool::start(settings.workers.count, settings.workers.require_shared_memory)?;
    let mut replies = progress_handlers()?;
    let mut board = ProgressBoard::default();

    let mut step = FixedStep::new(settings.simulation.tick_rate_hz);
    let delta = step.step().as_secs_f64();
    let mut budget = TickBudget::new(step.step(), 120);
    let max_ticks = settings.simulation.max_ticks;
    tracing::info!(rate_hz = settings.simulation.tick_rate_hz, ?max_ticks, "simulation running");

    let started = Instant::now();
    let mut last_frame = started;
    'frames: loop {
        let now = Instant::now();
        let steps = step.accumulate(now - last_frame);
        last_frame = now;

        for _ in 0..steps {
            if max_ticks.is_some_and(|limit| world.clock().tick_count() >= limit) {
                break 'frames;
            }

            let watch = Stopwatch::start();
            let report = world.tick(delta);
            budget.record(watch.elapsed());

            if report.failed > 0 {
                tracing::warn!(
                    tick = report.tick,
                    failed = report.failed,
                    "systems failed this tick"
                );
            }
            pool.broadcast_tick(report.tick);
        }

        pool.poll(&mut replies, &mut board);
        if steps == 0 {
            std::thread::sleep(step.step() / 4);
        }
    }

    world.stop_all();
    pool.poll(&mut replies, &mut board);
    let peeked = pool.peek_shared();
    let shared_total = pool.shutdown()?;

    let census = world.resource::<CensusCounts>().copied().unwrap_or_default();
    tracing::info!(
        ticks = world.clock().tick_count(),
        simulated_secs = world.clock().elapsed(),
        wall_secs = started.elapsed().as_secs_f64(),
        "simulation finished"
    );
    tracing::info!(
        alive = world.entity_count(),
        spawned = census.spawned,
        despawned = census.despawned,
        score = *score.borrow(),
        hook_failures = world.hook_failures(),
        "world summary"
    );
    tracing::info!(shared_total, ?peeked, reports = ?board.latest, "worker summary");

    if loom_metrics::ENABLED {
        let (min, max) = budget.range();
        tracing::info!(
            budget_us = budget.budget().as_micros() as u64,
            avg_us = budget.average().as_micros() as u64,
            min_us = min.as_micros() as u64,
            max_us = max.as_micros() as u64,
            worst_us = budget.worst().as_micros() as u64,
            utilization = budget.utilization(),
            "tick timing"
        );
        if budget.overruns() > 0 {
            tracing::warn!(
                overruns = budget.overruns(),
                ticks = budget.ticks(),
                "ticks exceeded the fixed-step budget"
            );
        }
        for (system, timing) in world.profiler().iter() {
            tracing::debug!(
                system,
                calls = timing.calls(),
                avg_us = timing.average().as_micros() as u64,
                "update cost"
            );
        }
    }

    Ok(())
}
