//! Budget enforcement and cancellation: hung variants are terminated within
//! the budget and never wedge a worker or the shutdown path.

#![cfg(unix)]

use std::time::{Duration, Instant};

use gauntlet::isolation::ResourceBudget;
use gauntlet::outcome::Outcome;
use gauntlet::scheduler::{Job, Scheduler, SchedulerOptions};
use tokio::sync::mpsc;

use crate::fixtures::{default_options, run_store, stub_interpreter, CorpusFixture};

fn tight_budget() -> ResourceBudget {
    ResourceBudget {
        timeout: Duration::from_millis(300),
        ..ResourceBudget::default()
    }
}

#[tokio::test]
async fn test_hung_case_is_terminated_within_budget() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", "x = 1\n")
        .write(
            "tests/test_snippet_1.py",
            "def test_hang_spin():\n    pass\n\ndef test_recovers():\n    pass\n",
        );
    let store = corpus.discover();

    let interp = stub_interpreter(corpus.root());
    let options = SchedulerOptions {
        concurrency: 1,
        budget: tight_budget(),
        ..default_options(interp)
    };

    let started = Instant::now();
    let results = run_store(&store, options).await;

    // The hung case timed out; the case after it still ran on the same
    // worker, proving the worker was reclaimed immediately.
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].outcome, Outcome::Timeout);
    assert_eq!(results[1].outcome, Outcome::Pass);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "run should not wait out the 30s sleep, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_worker_available_for_new_jobs_after_timeout() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", "x = 1\n")
        .write("tests/test_snippet_1.py", "def test_hang_spin():\n    pass\n")
        .write("human/snippet_2.py", "x = 2\n")
        .write("tests/test_snippet_2.py", "def test_quick():\n    pass\n");
    let store = corpus.discover();

    let interp = stub_interpreter(corpus.root());
    let options = SchedulerOptions {
        concurrency: 1,
        budget: tight_budget(),
        ..default_options(interp)
    };
    let results = run_store(&store, options).await;

    assert_eq!(results.len(), 2);
    let timeout_count = results
        .iter()
        .filter(|r| r.outcome == Outcome::Timeout)
        .count();
    let pass_count = results
        .iter()
        .filter(|r| r.outcome == Outcome::Pass)
        .count();
    assert_eq!(timeout_count, 1);
    assert_eq!(pass_count, 1);
}

#[tokio::test]
async fn test_global_cancellation_keeps_collected_results() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", "x = 1\n")
        .write("tests/test_snippet_1.py", "def test_quick():\n    pass\n")
        .write("human/snippet_2.py", "x = 2\n")
        .write(
            "tests/test_snippet_2.py",
            "def test_hang_forever():\n    pass\n",
        );
    let store = corpus.discover();

    let interp = stub_interpreter(corpus.root());
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    // Generous budget: only cancellation can stop the hung case early.
    let scheduler = Scheduler::new(
        SchedulerOptions {
            concurrency: 2,
            queue_capacity: 8,
            interpreter: interp,
            budget: ResourceBudget::default(),
        },
        results_tx,
    );

    for task in store.tasks() {
        for test_file in &task.test_files {
            for variant in &task.variants {
                scheduler
                    .submit(Job::new(variant.clone(), test_file.clone()))
                    .await
                    .unwrap();
            }
        }
    }

    // Let the quick job finish and the hung one start, then cancel.
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.cancel();

    let started = Instant::now();
    scheduler.shutdown().await.unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "shutdown must kill in-flight children promptly"
    );

    // The quick job's result survived cancellation.
    let mut results = Vec::new();
    while let Ok(result) = results_rx.try_recv() {
        results.push(result);
    }
    assert!(results
        .iter()
        .any(|r| r.test_case == "test_quick" && r.outcome == Outcome::Pass));
    // The hung case produced no phantom result.
    assert!(!results.iter().any(|r| r.test_case == "test_hang_forever"));
}
