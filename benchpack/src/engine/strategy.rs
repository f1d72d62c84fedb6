//! Dispatch strategies for the work list.
//!
//! Sequential dispatch runs tasks in list order. Parallel dispatch runs them
//! on a bounded set of scoped worker threads pulling from a shared cursor.
//! In both, the first fatal error stops tasks that have not started yet;
//! tasks already running are left to finish.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use super::EngineResult;

/// A unit of work: run task `index`, returning a fatal error to abort.
pub type Task<'a> = dyn Fn(usize) -> EngineResult<()> + Sync + 'a;

/// Strategy for running the per-item tasks.
pub trait DispatchStrategy: Send + Sync {
    /// Run tasks `0..count`, stopping on the first fatal error.
    fn execute(&self, count: usize, task: &Task<'_>) -> EngineResult<()>;
}

/// Runs tasks one at a time in order.
#[derive(Debug, Default)]
pub struct SequentialStrategy;

impl SequentialStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchStrategy for SequentialStrategy {
    fn execute(&self, count: usize, task: &Task<'_>) -> EngineResult<()> {
        (0..count).try_for_each(task)
    }
}

/// Runs tasks on a bounded pool of worker threads.
#[derive(Debug)]
pub struct ParallelStrategy {
    /// Maximum number of concurrent tasks.
    pub concurrency: usize,
}

impl ParallelStrategy {
    /// Create a new parallel strategy (minimum concurrency 1).
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

impl Default for ParallelStrategy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_WORKERS)
    }
}

impl DispatchStrategy for ParallelStrategy {
    fn execute(&self, count: usize, task: &Task<'_>) -> EngineResult<()> {
        let workers = self.concurrency.min(count);
        let next = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);
        let first_error = Mutex::new(None);

        debug!(workers, tasks = count, "Starting parallel dispatch");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= count {
                        break;
                    }
                    if let Err(e) = task(index) {
                        aborted.store(true, Ordering::SeqCst);
                        first_error.lock().get_or_insert(e);
                        break;
                    }
                });
            }
        });

        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Pick a strategy for `count` tasks.
pub fn select(parallel: bool, workers: usize, count: usize) -> Box<dyn DispatchStrategy> {
    if parallel && workers > 1 && count > 1 {
        Box::new(ParallelStrategy::new(workers))
    } else {
        Box::new(SequentialStrategy::new())
    }
}
