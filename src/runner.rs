//! Test suite execution against a loaded variant.
//!
//! Each test case runs as its own interpreter child process inside the job's
//! isolation context: the per-case state machine is
//! `pending → running → {pass, fail, error, timeout}`, with the expectation
//! overlay applied on top of the raw outcome. Cases of one (variant, test
//! file) pair run sequentially in file order.
//!
//! Determinism: the runner never retries a test outcome. A flaky case is a
//! reportable signal, not something to hide.

use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::corpus::{TestCase, TestFile, Variant};
use crate::isolation::{IsolationContext, MEM_LIMIT_ENV};
use crate::loader::{VariantLoader, SHIM_FILE};
use crate::outcome::{truncate_capture, ExecutionResult, Outcome};
use crate::{glog_debug, glog_trace, Error, Result};

/// Executes every test case in a test file against one variant.
#[derive(Debug, Clone)]
pub struct TestSuiteRunner {
    loader: VariantLoader,
}

impl TestSuiteRunner {
    pub fn new(interpreter: PathBuf) -> Self {
        Self {
            loader: VariantLoader::new(interpreter),
        }
    }

    pub fn loader(&self) -> &VariantLoader {
        &self.loader
    }

    /// Load the variant and run the whole suite inside the given context.
    ///
    /// A variant that fails to load yields one `load-error` result per test
    /// case — it contributes zero passes and stays distinguishable from a
    /// variant that loaded and failed. Cancellation stops between cases;
    /// results collected so far are returned.
    pub async fn run_suite(
        &self,
        context: &IsolationContext,
        variant: &Variant,
        test_file: &TestFile,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExecutionResult>> {
        let variant_file = self.loader.materialize(context, variant)?;
        let test_file_name = test_file
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("test_{}.py", test_file.task));
        context.write_file(&test_file_name, &test_file.source)?;

        let load = self.loader.load(context, &variant_file).await?;
        if !load.is_loaded() {
            let diagnostic = load
                .diagnostic
                .unwrap_or_else(|| "variant failed to load".to_string());
            glog_debug!("variant {} failed to load", variant.id);
            return Ok(test_file
                .cases
                .iter()
                .map(|case| {
                    ExecutionResult::new(
                        variant.task.as_str(),
                        &variant.id,
                        &case.name,
                        Outcome::LoadError,
                        std::time::Duration::from_millis(load.duration_ms),
                    )
                    .with_diagnostic(&diagnostic)
                })
                .collect());
        }

        let mut results = Vec::with_capacity(test_file.cases.len());
        for case in &test_file.cases {
            if cancel.is_cancelled() {
                glog_debug!(
                    "cancelled before case {} of variant {}",
                    case.name,
                    variant.id
                );
                break;
            }
            match self
                .run_case(context, &variant_file, &test_file_name, variant, case, cancel)
                .await?
            {
                Some(result) => results.push(result),
                // In-flight case was cancelled; abandon the rest of the suite.
                None => break,
            }
        }
        Ok(results)
    }

    /// Run a single test case as a child process and classify the outcome.
    ///
    /// Returns `None` when the run was cancelled mid-case; the child is
    /// force-killed either way (timeout or cancellation).
    async fn run_case(
        &self,
        context: &IsolationContext,
        variant_file: &str,
        test_file_name: &str,
        variant: &Variant,
        case: &TestCase,
        cancel: &CancellationToken,
    ) -> Result<Option<ExecutionResult>> {
        let budget = context.budget();
        let started = Instant::now();

        let mut cmd = Command::new(self.loader.interpreter());
        cmd.arg(SHIM_FILE)
            .arg(variant_file)
            .arg(test_file_name)
            .arg(&case.name)
            .current_dir(context.path())
            .kill_on_drop(true);
        if let Some(limit) = budget.memory_limit_bytes {
            cmd.env(MEM_LIMIT_ENV, limit.to_string());
        }
        glog_trace!(
            "running case {} of {} against {}",
            case.name,
            test_file_name,
            variant.id
        );

        let output = tokio::select! {
            timed = tokio::time::timeout(budget.timeout, cmd.output()) => match timed {
                Ok(io_result) => io_result.map_err(|e| Error::JobExecution(e.to_string()))?,
                Err(_) => {
                    // Dropping the output future kills the child (kill_on_drop),
                    // so the worker is free for new jobs immediately.
                    let result = ExecutionResult::new(
                        variant.task.as_str(),
                        &variant.id,
                        &case.name,
                        Outcome::Timeout,
                        started.elapsed(),
                    )
                    .with_diagnostic(&format!(
                        "exceeded wall-clock budget of {:?}; child force-killed",
                        budget.timeout
                    ));
                    return Ok(Some(result));
                }
            },
            _ = cancel.cancelled() => {
                glog_debug!("case {} cancelled mid-flight", case.name);
                return Ok(None);
            }
        };

        let raw = Outcome::from_exit_code(output.status.code());
        let outcome = raw.overlay(case.expectation);
        let mut result = ExecutionResult::new(
            variant.task.as_str(),
            &variant.id,
            &case.name,
            outcome,
            started.elapsed(),
        )
        .with_output(
            truncate_capture(&output.stdout, budget.max_output_bytes),
            truncate_capture(&output.stderr, budget.max_output_bytes),
        );
        if output.status.code().is_none() {
            result = result.with_diagnostic("child terminated by signal");
        }
        Ok(Some(result))
    }
}
