//! Result aggregation into scorecards.
//!
//! The aggregator exclusively owns the append-only execution result log.
//! Scorecards are never mutated in place: every query is a pure fold over
//! the log at call time, so aggregation stays idempotent and safe to run
//! concurrently with recording.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::outcome::{ExecutionResult, Outcome};

/// Aggregated counts for one variant (or one task rollup).
///
/// Policy: a variant with any `load-error` contributes zero passes and is
/// flagged with `load_failed`, keeping it distinct from a variant that
/// loaded but failed its tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// Variant id (or task key for rollups).
    pub subject: String,
    pub total: usize,
    pub passes: usize,
    pub fails: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub expected_failures_confirmed: usize,
    pub expected_failures_violated: usize,
    pub load_errors: usize,
    pub harness_errors: usize,
    pub load_failed: bool,
    pub pass_rate: f64,
}

impl Scorecard {
    /// Fold a set of results belonging to one subject into a scorecard.
    fn compute(subject: &str, results: &[&ExecutionResult]) -> Self {
        let mut card = Self {
            subject: subject.to_string(),
            total: results.len(),
            passes: 0,
            fails: 0,
            errors: 0,
            timeouts: 0,
            expected_failures_confirmed: 0,
            expected_failures_violated: 0,
            load_errors: 0,
            harness_errors: 0,
            load_failed: false,
            pass_rate: 0.0,
        };
        for result in results {
            match result.outcome {
                Outcome::Pass => card.passes += 1,
                Outcome::Fail => card.fails += 1,
                Outcome::Error => card.errors += 1,
                Outcome::Timeout => card.timeouts += 1,
                Outcome::ExpectedFailureConfirmed => {
                    card.expected_failures_confirmed += 1;
                    card.passes += 1;
                }
                Outcome::ExpectedFailureViolated => card.expected_failures_violated += 1,
                Outcome::LoadError => card.load_errors += 1,
                Outcome::HarnessError => card.harness_errors += 1,
            }
        }
        if card.load_errors > 0 {
            card.load_failed = true;
            card.passes = 0;
        }
        if card.total > 0 {
            card.pass_rate = card.passes as f64 / card.total as f64;
        }
        card
    }
}

/// Per-task scorecard: one card per variant, never averaged together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScorecard {
    pub task: String,
    pub variants: Vec<Scorecard>,
}

/// Owns the execution result log and derives scorecards from it.
pub struct ResultAggregator {
    log: RwLock<Vec<ExecutionResult>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
        }
    }

    /// Append a result. Prior results are never mutated.
    pub fn record(&self, result: ExecutionResult) {
        self.log.write().expect("result log poisoned").push(result);
    }

    pub fn len(&self) -> usize {
        self.log.read().expect("result log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the full result log.
    pub fn results(&self) -> Vec<ExecutionResult> {
        self.log.read().expect("result log poisoned").clone()
    }

    /// Scorecard for one variant, or `None` if it has no recorded results.
    pub fn scorecard_for_variant(&self, variant_id: &str) -> Option<Scorecard> {
        let log = self.log.read().expect("result log poisoned");
        let subset: Vec<&ExecutionResult> =
            log.iter().filter(|r| r.variant == variant_id).collect();
        if subset.is_empty() {
            return None;
        }
        Some(Scorecard::compute(variant_id, &subset))
    }

    /// Per-variant scorecards for one task, or `None` if unrecorded.
    pub fn scorecard_for_task(&self, task_key: &str) -> Option<TaskScorecard> {
        let log = self.log.read().expect("result log poisoned");
        let mut by_variant: BTreeMap<&str, Vec<&ExecutionResult>> = BTreeMap::new();
        for result in log.iter().filter(|r| r.task == task_key) {
            by_variant.entry(&result.variant).or_default().push(result);
        }
        if by_variant.is_empty() {
            return None;
        }
        Some(TaskScorecard {
            task: task_key.to_string(),
            variants: by_variant
                .into_iter()
                .map(|(variant, subset)| Scorecard::compute(variant, &subset))
                .collect(),
        })
    }

    /// All task scorecards, ordered by task key.
    pub fn task_scorecards(&self) -> Vec<TaskScorecard> {
        let log = self.log.read().expect("result log poisoned");
        let mut tasks: BTreeMap<&str, BTreeMap<&str, Vec<&ExecutionResult>>> = BTreeMap::new();
        for result in log.iter() {
            tasks
                .entry(&result.task)
                .or_default()
                .entry(&result.variant)
                .or_default()
                .push(result);
        }
        tasks
            .into_iter()
            .map(|(task, by_variant)| TaskScorecard {
                task: task.to_string(),
                variants: by_variant
                    .into_iter()
                    .map(|(variant, subset)| Scorecard::compute(variant, &subset))
                    .collect(),
            })
            .collect()
    }

    /// Counts per outcome class across the whole run.
    pub fn outcome_totals(&self) -> BTreeMap<Outcome, usize> {
        let log = self.log.read().expect("result log poisoned");
        let mut totals = BTreeMap::new();
        for result in log.iter() {
            *totals.entry(result.outcome).or_insert(0) += 1;
        }
        totals
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}
