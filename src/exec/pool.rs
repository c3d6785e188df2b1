// src/exec/pool.rs

//! Fixed-size pool of worker threads draining a [`WorkScheduler`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::errors::Result;
use crate::exec::runner::Runner;
use crate::work::WorkScheduler;

/// Worker threads that loop on [`WorkScheduler::take`] and hand each item
/// to a shared [`Runner`].
///
/// Every worker parks on the scheduler's condition variable while nothing is
/// runnable. Closing the scheduler (directly, or via [`shutdown`](Self::shutdown)
/// or drop) makes the workers finish their current item and exit.
#[derive(Debug)]
pub struct WorkerPool {
    scheduler: Arc<WorkScheduler>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn spawn(size: usize, runner: Arc<Runner>) -> Result<Self> {
        let size = size.max(1);
        let scheduler = Arc::clone(runner.scheduler());
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let runner = Arc::clone(&runner);
            let handle = thread::Builder::new()
                .name(format!("nodeflow-worker-{index}"))
                .spawn(move || worker_loop(index, runner))?;
            workers.push(handle);
        }

        info!(workers = size, "worker pool started");
        Ok(Self { scheduler, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the scheduler and join every worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.scheduler.close();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "worker thread panicked");
            }
        }
        info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(index: usize, runner: Arc<Runner>) {
    debug!(worker = index, "worker started");

    while let Some(item) = runner.scheduler().take() {
        let label = item.to_string();
        // The runner's completion guard has already released the item when
        // a panic gets here.
        match panic::catch_unwind(AssertUnwindSafe(|| runner.run(item))) {
            Ok(outcome) => debug!(worker = index, ?outcome, "worker finished item"),
            Err(_) => error!(worker = index, item = %label, "runner panicked; worker continues"),
        }
    }

    debug!(worker = index, "worker exiting (scheduler closed)");
}
