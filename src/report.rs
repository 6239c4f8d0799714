//! Run artifacts: the JSON contract consumed by external reporting tools.
//!
//! Two artifacts per run, and nothing else:
//! - `results.jsonl` — one JSON record per execution result, appended as
//!   results arrive;
//! - `scorecards.json` — the scorecard document written at run end.
//!
//! The harness always emits both, even when every job failed: "the corpus
//! was bad" is a reportable outcome, not a run failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::aggregate::TaskScorecard;
use crate::outcome::ExecutionResult;
use crate::Result;

pub const RESULTS_FILE: &str = "results.jsonl";
pub const SCORECARDS_FILE: &str = "scorecards.json";

/// The scorecard document written at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardDocument {
    pub run_id: String,
    pub corpus_root: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub total_results: usize,
    /// Counts per outcome class across the whole run.
    pub outcome_totals: BTreeMap<String, usize>,
    /// Per-task scorecards, each holding distinct per-variant cards.
    pub tasks: Vec<TaskScorecard>,
}

/// Writes run artifacts into one output directory.
#[derive(Debug)]
pub struct Reporter {
    out_dir: PathBuf,
}

impl Reporter {
    pub fn new(out_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(out_dir)?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
        })
    }

    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join(RESULTS_FILE)
    }

    pub fn scorecards_path(&self) -> PathBuf {
        self.out_dir.join(SCORECARDS_FILE)
    }

    /// Open the incremental results writer, truncating any previous run.
    pub fn open_results_writer(&self) -> Result<ResultsWriter> {
        let file = File::create(self.results_path())?;
        Ok(ResultsWriter {
            writer: BufWriter::new(file),
        })
    }

    pub fn write_scorecards(&self, document: &ScorecardDocument) -> Result<PathBuf> {
        let path = self.scorecards_path();
        let json = serde_json::to_string_pretty(document)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Appends execution results as JSON lines while the run is in flight.
#[derive(Debug)]
pub struct ResultsWriter {
    writer: BufWriter<File>,
}

impl ResultsWriter {
    pub fn append(&mut self, result: &ExecutionResult) -> Result<()> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Human-readable run summary for the terminal.
///
/// The JSON artifacts are the contract; this is a courtesy.
pub fn render_summary(document: &ScorecardDocument) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "run {} over {}: {} results across {} tasks{}\n",
        document.run_id,
        document.corpus_root,
        document.total_results,
        document.tasks.len(),
        if document.cancelled { " (cancelled)" } else { "" }
    ));
    for (outcome, count) in &document.outcome_totals {
        out.push_str(&format!("  {:>28}  {}\n", outcome, count));
    }
    for task in &document.tasks {
        out.push_str(&format!("task {}\n", task.task));
        for card in &task.variants {
            out.push_str(&format!(
                "  {:<40} {:>3}/{:<3} passed ({:.0}%){}\n",
                card.subject,
                card.passes,
                card.total,
                card.pass_rate * 100.0,
                if card.load_failed { "  [load failed]" } else { "" }
            ));
        }
    }
    out
}
