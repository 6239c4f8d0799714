//! End-to-end runs: discover a corpus, schedule every job, aggregate, and
//! check the artifact contract.

#![cfg(unix)]

use chrono::Utc;
use gauntlet::outcome::{ExecutionResult, Outcome};
use gauntlet::report::{Reporter, ScorecardDocument};
use tempfile::TempDir;

use crate::fixtures::{aggregate, default_options, run_store, stub_interpreter, CorpusFixture};

const VARIANT_OK: &str = "def compute(xs):\n    return len(xs) + 1\n";
const VARIANT_BUGGY: &str = "# BUGGY\ndef compute(xs):\n    return len(xs)\n";
const VARIANT_BROKEN: &str = "# LOAD_ERROR\ndef compute(xs:\n";

const TEST_FILE: &str = "\
from snippet_1 import compute

def test_returns_three():
    assert compute([1, 2]) == 3

def test_handles_empty():
    assert compute([]) == 1

@pytest.mark.xfail(strict=True)
def test_off_by_one_quirk():
    assert compute([1, 2]) == 2
";

/// The two-variant scenario: a correct variant and an off-by-one variant
/// running the same three-case test file, one case marked expect-failure.
#[tokio::test]
async fn test_two_variant_scenario_yields_distinct_scorecards() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", VARIANT_OK)
        .write("generated/snippet_1.py", VARIANT_BUGGY)
        .write("tests/test_snippet_1.py", TEST_FILE);
    let store = corpus.discover();
    assert_eq!(store.job_count(), 2);

    let interp = stub_interpreter(corpus.root());
    let results = run_store(&store, default_options(interp)).await;
    assert_eq!(results.len(), 6);

    let aggregator = aggregate(&results);
    let human = aggregator
        .scorecard_for_variant("human/snippet_1")
        .unwrap();
    let buggy = aggregator
        .scorecard_for_variant("generated/snippet_1")
        .unwrap();

    // Correct variant: pass, pass, expected-failure-confirmed.
    assert_eq!(human.total, 3);
    assert_eq!(human.passes, 3);
    assert_eq!(human.expected_failures_confirmed, 1);
    assert_eq!(human.expected_failures_violated, 0);

    // Buggy variant: fail, pass, expected-failure-violated.
    assert_eq!(buggy.total, 3);
    assert_eq!(buggy.passes, 1);
    assert_eq!(buggy.fails, 1);
    assert_eq!(buggy.expected_failures_violated, 1);

    // The task card keeps both variants distinct, never averaged.
    let task = aggregator.scorecard_for_task("snippet_1").unwrap();
    assert_eq!(task.variants.len(), 2);
    assert_ne!(task.variants[0].passes, task.variants[1].passes);
}

#[tokio::test]
async fn test_load_error_variant_reported_distinctly() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", VARIANT_OK)
        .write("generated/snippet_1.py", VARIANT_BROKEN)
        .write("tests/test_snippet_1.py", TEST_FILE);
    let store = corpus.discover();

    let interp = stub_interpreter(corpus.root());
    let results = run_store(&store, default_options(interp)).await;

    let aggregator = aggregate(&results);
    let broken = aggregator
        .scorecard_for_variant("generated/snippet_1")
        .unwrap();
    assert!(broken.load_failed);
    assert_eq!(broken.passes, 0);
    assert_eq!(broken.load_errors, 3);
    // Diagnostics carry the raw interpreter output.
    assert!(results
        .iter()
        .filter(|r| r.variant == "generated/snippet_1")
        .all(|r| r.outcome == Outcome::LoadError
            && r.diagnostic.as_ref().unwrap().contains("SyntaxError")));

    // The healthy sibling is unaffected.
    let healthy = aggregator
        .scorecard_for_variant("human/snippet_1")
        .unwrap();
    assert!(!healthy.load_failed);
    assert_eq!(healthy.passes, 3);
}

#[tokio::test]
async fn test_artifact_contract_roundtrips() {
    let corpus = CorpusFixture::new();
    corpus
        .write("human/snippet_1.py", VARIANT_OK)
        .write("tests/test_snippet_1.py", TEST_FILE);
    let store = corpus.discover();

    let interp = stub_interpreter(corpus.root());
    let results = run_store(&store, default_options(interp)).await;
    let aggregator = aggregate(&results);

    let out_dir = TempDir::new().unwrap();
    let reporter = Reporter::new(out_dir.path()).unwrap();
    let mut writer = reporter.open_results_writer().unwrap();
    for result in &results {
        writer.append(result).unwrap();
    }
    writer.finish().unwrap();

    let document = ScorecardDocument {
        run_id: "run-e2e".to_string(),
        corpus_root: store.root().display().to_string(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        cancelled: false,
        total_results: aggregator.len(),
        outcome_totals: aggregator
            .outcome_totals()
            .into_iter()
            .map(|(outcome, count)| (outcome.as_str().to_string(), count))
            .collect(),
        tasks: aggregator.task_scorecards(),
    };
    reporter.write_scorecards(&document).unwrap();

    // One JSON record per result line.
    let jsonl = std::fs::read_to_string(reporter.results_path()).unwrap();
    let parsed: Vec<ExecutionResult> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed.len(), results.len());

    // Scorecard document parses back with the same shape.
    let doc: ScorecardDocument =
        serde_json::from_str(&std::fs::read_to_string(reporter.scorecards_path()).unwrap())
            .unwrap();
    assert_eq!(doc.total_results, results.len());
    assert_eq!(doc.tasks.len(), 1);
    assert_eq!(doc.outcome_totals.get("pass"), Some(&2));
    assert_eq!(doc.outcome_totals.get("expected-failure-confirmed"), Some(&1));
}

#[tokio::test]
async fn test_empty_corpus_completes_with_no_results() {
    let corpus = CorpusFixture::new();
    corpus.write("tests/test_snippet_1.py", TEST_FILE); // tests but no variants
    let store = corpus.discover();
    assert_eq!(store.job_count(), 0);

    let interp = stub_interpreter(corpus.root());
    let results = run_store(&store, default_options(interp)).await;
    assert!(results.is_empty());
}
