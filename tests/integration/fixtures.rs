//! Shared fixtures for the integration suite.
//!
//! The central piece is a stub interpreter: a shell script standing in for
//! the real language runtime so the pipeline can be exercised without one.
//! It honors the harness exit-code protocol and keys its behavior off the
//! test case name and markers in the variant source:
//!
//! - check mode: exit 3 with a diagnostic if the variant contains
//!   `LOAD_ERROR`, else exit 0;
//! - `*fail*` cases: exit 1, except `*off_by_one*` which passes only for
//!   variants containing `BUGGY` (and fails otherwise);
//! - `*returns_three*` cases: exit 1 for `BUGGY` variants, else exit 0;
//! - `*error*` cases: exit 2; `*hang*` cases: sleep 30;
//! - `*stateful*` cases: exit 2 if a marker file already exists in the
//!   sandbox, else create it and exit 0 (detects context reuse);
//! - anything else: echo ok and exit 0.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use gauntlet::corpus::CorpusStore;
use gauntlet::isolation::ResourceBudget;
use gauntlet::outcome::ExecutionResult;
use gauntlet::scheduler::{Job, Scheduler, SchedulerOptions};

pub struct CorpusFixture {
    dir: TempDir,
}

impl CorpusFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create corpus dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a corpus file at a path relative to the root.
    pub fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    pub fn discover(&self) -> CorpusStore {
        CorpusStore::discover(self.root(), "py").expect("discover corpus")
    }
}

/// Materialize the stub interpreter script, executable, in `dir`.
#[cfg(unix)]
pub fn stub_interpreter(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script = r#"#!/bin/sh
if [ "$2" = "--check" ]; then
  if grep -q LOAD_ERROR "$3" 2>/dev/null; then
    echo "SyntaxError: invalid syntax" >&2
    exit 3
  fi
  exit 0
fi
variant="$2"
case_name="$4"
buggy=0
if grep -q BUGGY "$variant" 2>/dev/null; then buggy=1; fi
case "$case_name" in
  *off_by_one*)
    if [ "$buggy" = "1" ]; then exit 0; else echo "assert failed" >&2; exit 1; fi;;
  *returns_three*)
    if [ "$buggy" = "1" ]; then echo "assert failed" >&2; exit 1; else exit 0; fi;;
  *fail*) echo "assert failed" >&2; exit 1;;
  *error*) echo "TypeError: boom" >&2; exit 2;;
  *hang*) sleep 30;;
  *stateful*)
    if [ -f sandbox_state_marker ]; then echo "contaminated" >&2; exit 2; fi
    echo touched > sandbox_state_marker
    exit 0;;
  *) echo ok; exit 0;;
esac
"#;
    let path = dir.join("stub-interp");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn default_options(interpreter: PathBuf) -> SchedulerOptions {
    SchedulerOptions {
        concurrency: 2,
        queue_capacity: 8,
        interpreter,
        budget: ResourceBudget::default(),
    }
}

/// Drive every job of a store through a scheduler and collect the results.
pub async fn run_store(store: &CorpusStore, options: SchedulerOptions) -> Vec<ExecutionResult> {
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(options, results_tx);
    for task in store.tasks() {
        for test_file in &task.test_files {
            for variant in &task.variants {
                scheduler
                    .submit(Job::new(variant.clone(), test_file.clone()))
                    .await
                    .expect("submit job");
            }
        }
    }
    scheduler.shutdown().await.expect("shutdown scheduler");

    let mut results = Vec::new();
    while let Ok(result) = results_rx.try_recv() {
        results.push(result);
    }
    results
}

/// Record a result batch into a fresh aggregator.
pub fn aggregate(results: &[ExecutionResult]) -> Arc<gauntlet::aggregate::ResultAggregator> {
    let aggregator = Arc::new(gauntlet::aggregate::ResultAggregator::new());
    for result in results {
        aggregator.record(result.clone());
    }
    aggregator
}
