//! Result Aggregator — collects target results into a run report
//!
//! Single writer: the dispatcher funnels every result through `collect` in
//! completion order and calls `mark_complete` once all targets are terminal.

use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AggregateError;
use crate::target::{Status, TargetResult};

/// Stores target results for one run
#[derive(Debug)]
pub struct Aggregator {
    run_id: Uuid,
    expected: usize,
    results: Vec<TargetResult>,
    index: HashMap<String, usize>,
    succeeded: usize,
    complete: bool,
}

impl Aggregator {
    pub fn new(expected: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            expected,
            results: Vec::with_capacity(expected),
            index: HashMap::with_capacity(expected),
            succeeded: 0,
            complete: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a terminal result. A second result for the same target is
    /// rejected and the first one stays as it was.
    pub fn collect(&mut self, result: TargetResult) -> Result<(), AggregateError> {
        if self.index.contains_key(result.target_id()) {
            return Err(AggregateError::DuplicateResult(result.target_id().to_string()));
        }

        debug!(
            "Target {} finished: {} ({} lines)",
            result.target_id(),
            result.status(),
            result.output().len()
        );

        if result.is_success() {
            self.succeeded += 1;
        }
        self.index
            .insert(result.target_id().to_string(), self.results.len());
        self.results.push(result);
        Ok(())
    }

    /// Whether a result for this target has been collected
    pub fn contains(&self, target_id: &str) -> bool {
        self.index.contains_key(target_id)
    }

    pub fn collected(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Called by the dispatcher once every target is terminal
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete && self.results.len() == self.expected
    }

    /// Build the run report; only valid after the run completed
    pub fn finalize(&self) -> Result<RunReport, AggregateError> {
        if !self.is_complete() {
            return Err(AggregateError::RunNotComplete {
                collected: self.results.len(),
                expected: self.expected,
            });
        }

        let report = RunReport {
            run_id: self.run_id,
            results: self.results.clone(),
            index: self.index.clone(),
            total: self.expected,
            succeeded: self.succeeded,
            failed: self.expected - self.succeeded,
        };
        info!(
            "Run {} finished: {}/{} succeeded",
            report.run_id, report.succeeded, report.total
        );
        Ok(report)
    }
}

/// Summary of one run: every submitted target exactly once, in completion order
#[derive(Debug, Clone)]
pub struct RunReport {
    run_id: Uuid,
    results: Vec<TargetResult>,
    index: HashMap<String, usize>,
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl RunReport {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Results in completion order
    pub fn results(&self) -> &[TargetResult] {
        &self.results
    }

    pub fn get(&self, target_id: &str) -> Option<&TargetResult> {
        self.index.get(target_id).map(|&i| &self.results[i])
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Every target that did not succeed: failures, timeouts and cancellations
    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code: 0 when everything succeeded, else the failed count capped at 255
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.failed).unwrap_or(u8::MAX)
    }
}
