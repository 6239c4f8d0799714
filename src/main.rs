use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use gauntlet::aggregate::ResultAggregator;
use gauntlet::config::Config;
use gauntlet::corpus::CorpusStore;
use gauntlet::report::{render_summary, Reporter, ScorecardDocument};
use gauntlet::scheduler::{Job, Scheduler, SchedulerOptions};
use gauntlet::{glog, glog_warn, Error, Result};

/// Gauntlet - isolated variant execution and correctness aggregation harness
#[derive(Parser, Debug)]
#[command(name = "gauntlet")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    GAUNTLET_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.gauntlet/gauntlet.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the full (task x variant x test) matrix of a corpus
    Run(RunArgs),

    /// Discover a corpus and print the job matrix without running anything
    List {
        /// Corpus root directory
        #[arg(long)]
        source: PathBuf,

        /// Only include tasks whose key matches this glob
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Corpus root directory
    #[arg(long)]
    pub source: PathBuf,

    /// Number of concurrent workers (default: machine parallelism)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-test-case wall-clock budget in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Memory ceiling per child process in megabytes
    #[arg(long)]
    pub memory_limit_mb: Option<u64>,

    /// Cap on captured stdout/stderr per test case in bytes
    #[arg(long)]
    pub max_output_bytes: Option<usize>,

    /// Bounded job queue capacity (submit blocks when full)
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Only run tasks whose key matches this glob
    #[arg(long)]
    pub filter: Option<String>,

    /// Interpreter binary driving variant code
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Directory receiving results.jsonl and scorecards.json
    #[arg(long, default_value = "gauntlet-out")]
    pub output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    gauntlet::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Run(args) => run_matrix(args),
        Command::List { source, filter } => run_list(source, filter),
    }
}

/// Merge CLI flags over the loaded configuration.
fn apply_overrides(mut config: Config, args: &RunArgs) -> Config {
    if args.concurrency.is_some() {
        config.concurrency = args.concurrency;
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.memory_limit_mb.is_some() {
        config.memory_limit_mb = args.memory_limit_mb;
    }
    if args.max_output_bytes.is_some() {
        config.max_output_bytes = args.max_output_bytes;
    }
    if args.queue_capacity.is_some() {
        config.queue_capacity = args.queue_capacity;
    }
    if args.interpreter.is_some() {
        config.interpreter = args.interpreter.clone();
    }
    config
}

/// Execute the full job matrix and emit the run artifacts.
///
/// Completing the run is success regardless of the pass/fail mix; only
/// harness-internal failures (unreadable corpus, unwritable output) exit
/// non-zero.
fn run_matrix(args: RunArgs) -> Result<()> {
    let config = apply_overrides(Config::load()?, &args);
    let interpreter = config.resolve_interpreter()?;
    probe_interpreter(&interpreter)?;

    let mut store = CorpusStore::discover(&args.source, config.effective_source_ext())?;
    if let Some(pattern) = &args.filter {
        store.filter(pattern)?;
    }
    glog!(
        "run starting: {} tasks, {} jobs, interpreter {}",
        store.task_count(),
        store.job_count(),
        interpreter.display()
    );
    if store.job_count() == 0 {
        glog_warn!("corpus yields no runnable jobs; emitting empty artifacts");
    }

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let started_at = Utc::now();
    let reporter = Reporter::new(&args.output)?;
    let mut results_writer = reporter.open_results_writer()?;

    let rt = tokio::runtime::Runtime::new()?;
    let (aggregator, cancelled) = rt.block_on(async {
        let aggregator = Arc::new(ResultAggregator::new());
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            SchedulerOptions {
                concurrency: config.effective_concurrency(),
                queue_capacity: config.effective_queue_capacity(),
                interpreter: interpreter.clone(),
                budget: config.budget(),
            },
            results_tx,
        );

        // Ctrl-C cancels the whole run; collected results stay valid.
        let cancel = scheduler.cancel_token();
        let ctrlc_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                glog!("interrupt received, cancelling run");
                ctrlc_token.cancel();
            }
        });

        // Stream results into the log and the jsonl artifact as they land.
        let collector = {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                while let Some(result) = results_rx.recv().await {
                    if let Err(e) = results_writer.append(&result) {
                        glog_warn!("failed to append result record: {}", e);
                    }
                    aggregator.record(result);
                }
                results_writer.finish()
            })
        };

        for task in store.tasks() {
            for test_file in &task.test_files {
                for variant in &task.variants {
                    scheduler
                        .submit(Job::new(variant.clone(), test_file.clone()))
                        .await?;
                }
            }
        }
        scheduler.shutdown().await?;

        collector
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))??;
        Ok::<_, Error>((aggregator, cancel.is_cancelled()))
    })?;

    let finished_at = Utc::now();
    let document = ScorecardDocument {
        run_id,
        corpus_root: store.root().display().to_string(),
        started_at,
        finished_at,
        cancelled,
        total_results: aggregator.len(),
        outcome_totals: aggregator
            .outcome_totals()
            .into_iter()
            .map(|(outcome, count)| (outcome.as_str().to_string(), count))
            .collect(),
        tasks: aggregator.task_scorecards(),
    };
    let scorecards_path = reporter.write_scorecards(&document)?;

    glog!(
        "run finished: {} results, artifacts at {}",
        document.total_results,
        scorecards_path.display()
    );
    print!("{}", render_summary(&document));
    println!("results: {}", reporter.results_path().display());
    println!("scorecards: {}", scorecards_path.display());

    Ok(())
}

/// Print the discovered job matrix as JSON.
fn run_list(source: PathBuf, filter: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let mut store = CorpusStore::discover(&source, config.effective_source_ext())?;
    if let Some(pattern) = &filter {
        store.filter(pattern)?;
    }

    let listing: Vec<serde_json::Value> = store
        .tasks()
        .map(|task| {
            serde_json::json!({
                "task": task.key.as_str(),
                "variants": task.variants.iter().map(|v| &v.id).collect::<Vec<_>>(),
                "test_files": task.test_files.iter().map(|tf| {
                    serde_json::json!({
                        "path": tf.path.display().to_string(),
                        "cases": tf.cases.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

/// Verify the interpreter spawns at all before fanning out N jobs.
///
/// The exit status is deliberately ignored: not every interpreter understands
/// `--version`, but one that cannot even spawn would otherwise surface as a
/// harness error on every single job.
fn probe_interpreter(interpreter: &std::path::Path) -> Result<()> {
    std::process::Command::new(interpreter)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map_err(|_| Error::InterpreterNotFound(interpreter.display().to_string()))?;
    Ok(())
}
