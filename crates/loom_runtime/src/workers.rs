//! Background workers that share a guarded counter with the scheduler

use anyhow::{bail, Context, Result};
use loom_sync::{Guarded, Handlers, MemorySharing, Outbox, WorkerThread};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ticks between progress reports from each worker.
const REPORT_EVERY: u64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickNotice {
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub worker: String,
    pub processed: u64,
}

struct WorkerState {
    name: String,
    shared: Guarded<u64>,
    replies: Outbox,
    processed: u64,
}

fn worker_handlers() -> Result<Handlers<WorkerState>> {
    let handlers = Handlers::builder()
        .on_typed("onTick", |state: &mut WorkerState, notice: TickNotice| {
            *state.shared.lock() += 1;
            state.processed += 1;
            if notice.tick % REPORT_EVERY == 0 {
                let report = Progress {
                    worker: state.name.clone(),
                    processed: state.processed,
                };
                if let Err(err) = state.replies.send_serialized("onProgress", &report) {
                    tracing::debug!(worker = %state.name, error = %err, "controller gone");
                }
            }
        })
        .build()?;
    Ok(handlers)
}

/// Latest progress per worker, as seen by the scheduler.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    pub latest: BTreeMap<String, u64>,
}

pub fn progress_handlers() -> Result<Handlers<ProgressBoard>> {
    let handlers = Handlers::builder()
        .on_typed("onProgress", |board: &mut ProgressBoard, progress: Progress| {
            tracing::trace!(
                worker = %progress.worker,
                processed = progress.processed,
                "worker progress"
            );
            board.latest.insert(progress.worker, progress.processed);
        })
        .build()?;
    Ok(handlers)
}

pub struct WorkerPool {
    pub workers: Vec<WorkerThread>,
    pub shared: Guarded<u64>,
}

impl WorkerPool {
    pub fn start(count: usize, require_shared_memory: bool) -> Result<Self> {
        let sharing = MemorySharing::detect();
        if sharing == MemorySharing::Unavailable {
            if require_shared_memory {
                bail!("workers require shared memory, which this host does not provide");
            }
            tracing::warn!("shared memory unavailable; running without workers");
            return Ok(Self {
                workers: Vec::new(),
                shared: Guarded::with_sharing(0, sharing),
            });
        }

        let shared = Guarded::with_sharing(0u64, sharing);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("loom-worker-{index}");
            let handle = shared
                .connect()
                .with_context(|| format!("connecting {name} to the shared counter"))?;
            let state_name = name.clone();
            let worker = WorkerThread::spawn(name, worker_handlers()?, move |replies| WorkerState {
                name: state_name,
                shared: handle,
                replies,
                processed: 0,
            })?;
            workers.push(worker);
        }

        tracing::info!(count = workers.len(), "workers started");
        Ok(Self { workers, shared })
    }

    /// Tell every worker a tick has completed.
    pub fn broadcast_tick(&self, tick: u64) {
        for worker in &self.workers {
            if let Err(err) = worker.send_serialized("onTick", &TickNotice { tick }) {
                tracing::warn!(worker = worker.name(), error = %err, "failed to notify worker");
            }
        }
    }

    /// Drain replies without blocking.
    pub fn poll(&self, handlers: &mut Handlers<ProgressBoard>, board: &mut ProgressBoard) -> usize {
        self.workers
            .iter()
            .map(|worker| worker.poll(handlers, board))
            .sum()
    }

    /// Non-blocking read of the shared counter; `None` while a worker holds it.
    pub fn peek_shared(&self) -> Option<u64> {
        self.shared.try_lock().map(|value| *value)
    }

    pub fn shutdown(self) -> Result<u64> {
        for worker in self.workers {
            let name = worker.name().to_string();
            worker
                .terminate()
                .with_context(|| format!("stopping {name}"))?;
        }
        let total = *self.shared.lock();
        Ok(total)
    }
}
