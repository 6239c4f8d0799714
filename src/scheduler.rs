//! Scheduler and worker pool for the job matrix.
//!
//! A job is one (variant, test file) pair; the scheduler fans the full matrix
//! across a bounded pool of workers. Each worker owns at most one isolation
//! context at a time, created for the job and destroyed after it, so no
//! variant state survives between jobs.
//!
//! Backpressure: the job queue is a bounded channel and `submit` awaits on
//! it — once workers saturate and the queue fills, the producer blocks
//! instead of growing memory without bound.
//!
//! Results stream out over an unbounded channel as they complete; ordering
//! between independent jobs is not guaranteed and not significant.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::corpus::{TestFile, Variant};
use crate::isolation::{IsolationContext, ResourceBudget};
use crate::outcome::{ExecutionResult, Outcome};
use crate::runner::TestSuiteRunner;
use crate::{glog_debug, glog_error, glog_warn, Error, Result};

/// One schedulable unit: a variant paired with one of its task's test files.
///
/// Jobs are independent; no job depends on another's outcome.
#[derive(Debug, Clone)]
pub struct Job {
    pub variant: Variant,
    pub test_file: TestFile,
}

impl Job {
    pub fn new(variant: Variant, test_file: TestFile) -> Self {
        Self { variant, test_file }
    }

    /// Human-readable identity for logs.
    pub fn describe(&self) -> String {
        format!(
            "{} x {}",
            self.variant.id,
            self.test_file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "<test file>".to_string())
        )
    }
}

/// Worker pool sizing and per-job budget.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Bounded job queue capacity; `submit` blocks when full.
    pub queue_capacity: usize,
    /// Resolved interpreter binary.
    pub interpreter: PathBuf,
    /// Budget applied to every isolation context.
    pub budget: ResourceBudget,
}

/// Fans jobs across isolated workers and streams results out.
///
/// # Example
///
/// ```ignore
/// let (results_tx, mut results_rx) = mpsc::unbounded_channel();
/// let scheduler = Scheduler::new(options, results_tx);
/// for job in jobs {
///     scheduler.submit(job).await?;
/// }
/// scheduler.shutdown().await?;
/// ```
pub struct Scheduler {
    job_tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Spawn the worker pool.
    ///
    /// Workers start idle, waiting on the shared job queue; they exit when
    /// the queue closes and drains.
    pub fn new(
        options: SchedulerOptions,
        results_tx: mpsc::UnboundedSender<ExecutionResult>,
    ) -> Self {
        let concurrency = options.concurrency.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(options.queue_capacity.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let cancel = CancellationToken::new();

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let rx = Arc::clone(&job_rx);
            let tx = results_tx.clone();
            let runner = TestSuiteRunner::new(options.interpreter.clone());
            let budget = options.budget;
            let token = cancel.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, tx, runner, budget, token).await;
            }));
        }

        Self {
            job_tx,
            workers,
            cancel,
        }
    }

    /// Enqueue a job, blocking the caller while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.job_tx.send(job).await.map_err(|_| Error::QueueClosed)
    }

    /// A token observing this run's cancellation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the whole run.
    ///
    /// In-flight children are force-killed via their contexts; results
    /// already collected stay valid and are not discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for every worker to drain and exit.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.job_tx);
        for handle in self.workers {
            handle
                .await
                .map_err(|e| Error::TaskJoin(e.to_string()))?;
        }
        Ok(())
    }
}

/// Worker body: pull jobs until the queue closes.
///
/// A harness-internal fault (context creation, spawn failure) is retried at
/// most once, then recorded as `harness-error` results so the run itself
/// never aborts over one bad job.
async fn worker_loop(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    results_tx: mpsc::UnboundedSender<ExecutionResult>,
    runner: TestSuiteRunner,
    budget: ResourceBudget,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            glog_debug!("worker {} exiting: queue closed", worker_id);
            break;
        };
        if cancel.is_cancelled() {
            // Drain the queue without executing.
            continue;
        }

        glog_debug!("worker {} picked up {}", worker_id, job.describe());
        match execute_job(&runner, budget, &job, &cancel).await {
            Ok(results) => send_all(&results_tx, results),
            Err(first) => {
                glog_warn!(
                    "worker {} harness fault on {}: {} (retrying once)",
                    worker_id,
                    job.describe(),
                    first
                );
                match execute_job(&runner, budget, &job, &cancel).await {
                    Ok(results) => send_all(&results_tx, results),
                    Err(second) => {
                        glog_error!(
                            "worker {} job {} failed to complete: {}",
                            worker_id,
                            job.describe(),
                            second
                        );
                        send_all(&results_tx, harness_error_results(&job, &second));
                    }
                }
            }
        }
    }
}

/// Run one job inside a fresh context, destroying the context afterwards.
async fn execute_job(
    runner: &TestSuiteRunner,
    budget: ResourceBudget,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<Vec<ExecutionResult>> {
    let context = IsolationContext::create(budget)?;
    let outcome = runner
        .run_suite(&context, &job.variant, &job.test_file, cancel)
        .await;
    if let Err(e) = context.destroy() {
        glog_warn!("context teardown failed for {}: {}", job.describe(), e);
    }
    outcome
}

/// Synthesize `harness-error` results for a job that failed to complete.
fn harness_error_results(job: &Job, error: &Error) -> Vec<ExecutionResult> {
    let diagnostic = format!("job failed to complete after retry: {}", error);
    job.test_file
        .cases
        .iter()
        .map(|case| {
            ExecutionResult::new(
                job.variant.task.as_str(),
                &job.variant.id,
                &case.name,
                Outcome::HarnessError,
                std::time::Duration::ZERO,
            )
            .with_diagnostic(&diagnostic)
        })
        .collect()
}

fn send_all(tx: &mpsc::UnboundedSender<ExecutionResult>, results: Vec<ExecutionResult>) {
    for result in results {
        // The receiver outlives the workers in normal operation; if it has
        // gone away the results have nowhere to go and dropping them is all
        // that is left.
        let _ = tx.send(result);
    }
}
