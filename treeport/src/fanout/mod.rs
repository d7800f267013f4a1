//! Bounded fan-out over a closed batch
//!
//! A batch is loaded into a bounded queue which is then closed. A small
//! number of worker threads drain it: one worker for tiny batches, a fixed
//! pool otherwise. Each worker lowers its own priority and enters its own
//! bulk scope once, then processes items until the queue is closed and
//! empty. A failing (or panicking) item is logged and counted; the worker
//! carries on with the next item.
//!
//! A started batch always runs to completion. There is no cancellation and
//! no per-item timeout.

pub mod bulk;

use crate::model::Node;
use bulk::{BulkMode, BulkModeGuard};
use crossbeam_channel::Receiver;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Batches up to this size run on a single worker
pub const SEQUENTIAL_THRESHOLD: usize = 3;

/// Worker count for batches above the threshold
pub const MAX_WORKERS: usize = 8;

/// Number of workers used for a batch of `items`
pub fn worker_count(items: usize) -> usize {
    if items <= SEQUENTIAL_THRESHOLD {
        1
    } else {
        MAX_WORKERS
    }
}

/// Anything that can be queued on the pool
pub trait BatchItem {
    /// Context used when logging a failure for this item
    fn label(&self) -> String;
}

impl BatchItem for Node {
    fn label(&self) -> String {
        self.path.clone()
    }
}

/// Aggregated result of one batch
#[derive(Debug)]
pub struct FanoutOutcome<R> {
    /// Outputs of all workers, in no particular order
    pub results: Vec<R>,
    /// Items whose transform returned a value
    pub succeeded: usize,
    /// Items whose transform returned nothing
    pub skipped: usize,
    /// Items whose transform failed or panicked
    pub failed: usize,
    /// Workers that took part
    pub workers: usize,
    /// Outputs produced by each worker
    pub worker_results: Vec<usize>,
}

impl<R> FanoutOutcome<R> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            workers: 0,
            worker_results: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Partial result of one worker
struct WorkerReport<R> {
    results: Vec<R>,
    skipped: usize,
    failed: usize,
}

/// Parallel apply over a closed batch
#[derive(Debug, Clone)]
pub struct FanoutPool {
    name: String,
    mode: BulkMode,
}

impl FanoutPool {
    /// `name` prefixes worker thread names; `mode` is entered by every worker
    pub fn new(name: impl Into<String>, mode: BulkMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    /// Apply `transform` to every item and collect the outputs
    ///
    /// Blocks until every item has been processed.
    pub fn run<T, R, F>(&self, items: Vec<T>, transform: F) -> FanoutOutcome<R>
    where
        T: BatchItem + Send,
        R: Send,
        F: Fn(T) -> anyhow::Result<Option<R>> + Sync,
    {
        let total = items.len();
        if total == 0 {
            return FanoutOutcome::empty();
        }

        let workers = worker_count(total);

        let (tx, rx) = crossbeam_channel::bounded(total);
        for item in items {
            // `rx` is alive and the channel holds the whole batch, so send cannot fail
            let _ = tx.send(item);
        }
        // Close the queue: workers stop once it is drained
        drop(tx);

        info!(pool = %self.name, items = total, workers, "Starting batch");

        let transform = &transform;
        let mode = self.mode;
        let mut reports = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let rx = rx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-{}", self.name, worker_id))
                    .spawn_scoped(scope, move || {
                        bulk::lower_thread_priority();
                        worker_loop(worker_id, rx, transform, mode)
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => error!(pool = %self.name, worker_id, error = %e, "Failed to spawn worker"),
                }
            }

            let mut reports = Vec::with_capacity(handles.len());
            for handle in handles {
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => error!(pool = %self.name, "Worker terminated abnormally"),
                }
            }
            reports
        });

        // Nothing left unless workers could not be spawned
        if !rx.is_empty() {
            reports.push(worker_loop(workers, rx, transform, mode));
        }

        let mut outcome = FanoutOutcome::empty();
        outcome.workers = reports.len();
        for report in reports {
            outcome.worker_results.push(report.results.len());
            outcome.succeeded += report.results.len();
            outcome.skipped += report.skipped;
            outcome.failed += report.failed;
            outcome.results.extend(report.results);
        }

        info!(
            pool = %self.name,
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Batch completed"
        );

        outcome
    }
}

fn worker_loop<T, R, F>(worker_id: usize, rx: Receiver<T>, transform: &F, mode: BulkMode) -> WorkerReport<R>
where
    T: BatchItem,
    F: Fn(T) -> anyhow::Result<Option<R>>,
{
    let _scope = BulkModeGuard::enter(mode);
    let mut report = WorkerReport {
        results: Vec::new(),
        skipped: 0,
        failed: 0,
    };

    // recv blocks until an item arrives or the queue is closed and empty
    while let Ok(item) = rx.recv() {
        let label = item.label();

        match catch_unwind(AssertUnwindSafe(|| transform(item))) {
            Ok(Ok(Some(result))) => report.results.push(result),
            Ok(Ok(None)) => report.skipped += 1,
            Ok(Err(e)) => {
                error!(worker_id, path = %label, error = ?e, "Failed to process item {}", label);
                report.failed += 1;
            }
            Err(panic) => {
                error!(
                    worker_id,
                    path = %label,
                    panic = panic_message(panic.as_ref()),
                    "Item {} panicked during processing",
                    label
                );
                report.failed += 1;
            }
        }
    }

    debug!(
        worker_id,
        produced = report.results.len(),
        skipped = report.skipped,
        failed = report.failed,
        "Worker finished"
    );

    report
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
