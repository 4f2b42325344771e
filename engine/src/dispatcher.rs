//! Dispatcher — fans targets out over a bounded worker pool
//!
//! Workers pull targets from a shared queue, run each one on the executor in
//! its own task and hand the result to the collector over a channel. The
//! collector is the only writer of the aggregator. Targets still queued when
//! the run is cancelled are recorded as cancelled without being started.

use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::{Aggregator, RunReport};
use crate::error::DispatchError;
use crate::executor::Executor;
use crate::target::{Target, TargetResult};

/// Worker count used when no explicit limit is configured
pub const DEFAULT_MAX_PARALLEL: usize = 8;

type Queue = Arc<Mutex<VecDeque<Target>>>;

/// Runs sets of targets concurrently
pub struct Dispatcher {
    executor: Arc<Executor>,
    max_parallel: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor: Arc::new(executor),
            max_parallel: DEFAULT_MAX_PARALLEL,
            cancel: CancellationToken::new(),
        }
    }

    /// Limit concurrent targets; zero is treated as one
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Cancel every in-flight and queued target of current and future runs
    pub fn cancel_all(&self) {
        if !self.cancel.is_cancelled() {
            info!("Cancelling all targets");
        }
        self.cancel.cancel();
    }

    /// Handle for cancelling from elsewhere (signal handlers, UIs)
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run all targets and return the finalized report
    pub async fn run(&self, targets: Vec<Target>) -> Result<RunReport, DispatchError> {
        self.run_with_observer(targets, |_| {}).await
    }

    /// Run all targets, calling `observer` once per result in completion order
    pub async fn run_with_observer<F>(
        &self,
        targets: Vec<Target>,
        mut observer: F,
    ) -> Result<RunReport, DispatchError>
    where
        F: FnMut(&TargetResult),
    {
        let mut ids = HashSet::with_capacity(targets.len());
        for target in &targets {
            if !ids.insert(target.id().to_string()) {
                return Err(DispatchError::DuplicateTarget(target.id().to_string()));
            }
        }

        let total = targets.len();
        let workers = self.max_parallel.min(total);
        let mut aggregator = Aggregator::new(total);
        info!(
            "Run {} starting: {} targets, {} workers",
            aggregator.run_id(),
            total,
            workers
        );

        let run_cancel = self.cancel.child_token();
        let queue: Queue = Arc::new(Mutex::new(targets.into()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(worker_loop(
                worker,
                queue.clone(),
                self.executor.clone(),
                run_cancel.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            observer(&result);
            aggregator.collect(result)?;
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Dispatcher worker failed: {e}");
            }
        }

        // Never started: the run was cancelled before a worker got to them
        let leftover: Vec<Target> = lock_queue(&queue).drain(..).collect();
        for target in leftover {
            let result = TargetResult::cancelled_before_start(target.id());
            observer(&result);
            aggregator.collect(result)?;
        }

        // A worker that died after taking a target must not lose it
        if aggregator.collected() < total {
            let started = Utc::now();
            let mut missing: Vec<&String> = ids.iter().filter(|id| !aggregator.contains(id)).collect();
            missing.sort();
            for id in missing {
                warn!("Target {id} was lost by its worker");
                let result = TargetResult::lost(id, started, "worker exited before reporting a result");
                observer(&result);
                aggregator.collect(result)?;
            }
        }

        aggregator.mark_complete();
        Ok(aggregator.finalize()?)
    }
}

fn lock_queue(queue: &Queue) -> std::sync::MutexGuard<'_, VecDeque<Target>> {
    // A poisoned queue still holds valid targets
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One pool slot: take targets until the queue is empty or the run is cancelled
async fn worker_loop(
    worker: usize,
    queue: Queue,
    executor: Arc<Executor>,
    cancel: CancellationToken,
    results: mpsc::UnboundedSender<TargetResult>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(target) = lock_queue(&queue).pop_front() else {
            break;
        };

        let id = target.id().to_string();
        let started = Utc::now();
        let exec = executor.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { exec.execute(&target, &token).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Worker {worker}: executor for {id} crashed: {e}");
                TargetResult::lost(&id, started, format!("executor crashed: {e}"))
            }
        };

        if results.send(result).is_err() {
            break;
        }
    }
}
