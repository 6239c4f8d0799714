//! Corpus data model and discovery.
//!
//! A corpus is a directory tree of small source files: candidate
//! implementations ("variants") of tiny tasks, plus paired test files. Many
//! unrelated variants share identical class and module names, so the records
//! built here are purely descriptive — nothing is loaded or executed at
//! discovery time.
//!
//! Layout contract (consumed, not produced):
//! - a variant file is any source file whose stem does not mark it as a test;
//! - a test file's stem is `test_<key>` or `<key>_test`;
//! - the task key is the normalized stem, shared across directories;
//! - the origin tag is the directory path relative to the corpus root
//!   (e.g. `human/full_doc` or `generated/gpt/no_doc`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::{glog_debug, Error, Result};

/// Stable key identifying a task, derived from file stems.
///
/// `snippet_042.py`, `test_snippet_042.py` and `snippet_042_test.py` all map
/// to the key `snippet_042`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(pub String);

impl TaskKey {
    /// Derive the task key from a file stem, stripping test markers.
    pub fn from_stem(stem: &str) -> Self {
        let key = if let Some(rest) = stem.strip_prefix("test_") {
            rest
        } else if let Some(rest) = stem.strip_suffix("_test") {
            rest
        } else {
            stem
        };
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One candidate implementation of a task's contract.
///
/// Immutable after discovery. The id is unique within a corpus:
/// `<origin-tag>/<file-stem>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique identifier within the corpus.
    pub id: String,
    /// The task this variant implements.
    pub task: TaskKey,
    /// Origin tag: relative directory under the corpus root.
    pub origin: String,
    /// Path to the source file.
    pub path: PathBuf,
    /// The source text, read at discovery time.
    pub source: String,
}

/// Expectation attached to a test case.
///
/// Mirrors strict expected-failure markers in generated test files: a case
/// marked `ExpectFailure` that raises has confirmed the expectation; one that
/// completes normally has violated it and must be flagged, never silently
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    Normal,
    ExpectFailure,
}

impl Default for Expectation {
    fn default() -> Self {
        Self::Normal
    }
}

/// A named, self-contained test procedure inside a test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub expectation: Expectation,
}

/// An ordered sequence of test cases associated with exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFile {
    /// The task this file tests.
    pub task: TaskKey,
    /// Path to the test source file.
    pub path: PathBuf,
    /// The test source text.
    pub source: String,
    /// Test cases in file order.
    pub cases: Vec<TestCase>,
}

/// A logical unit of work: all variants and test files sharing one key.
///
/// Invariant: every variant of a task is a candidate for the same contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    pub variants: Vec<Variant>,
    pub test_files: Vec<TestFile>,
}

impl Task {
    fn new(key: TaskKey) -> Self {
        Self {
            key,
            variants: Vec::new(),
            test_files: Vec::new(),
        }
    }
}

/// Immutable store of every task discovered in a corpus directory.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
    tasks: BTreeMap<TaskKey, Task>,
}

impl CorpusStore {
    /// Walk a corpus root and pair variants with test files by task key.
    ///
    /// Files that fail to read are skipped with a warning rather than
    /// aborting the walk; an unreadable root is a harness error.
    pub fn discover(root: &Path, source_ext: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::CorpusUnreadable(root.display().to_string()));
        }
        let root = root
            .canonicalize()
            .map_err(|_| Error::CorpusUnreadable(root.display().to_string()))?;

        let mut tasks: BTreeMap<TaskKey, Task> = BTreeMap::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    crate::log::warn(&format!("corpus walk error: {}", e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(source_ext) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    crate::log::warn(&format!("skipping unreadable {}: {}", path.display(), e));
                    continue;
                }
            };

            let key = TaskKey::from_stem(stem);
            let task = tasks.entry(key.clone()).or_insert_with(|| Task::new(key.clone()));

            if is_test_stem(stem) {
                let cases = parse_test_cases(&source);
                glog_debug!(
                    "discovered test file {} ({} cases)",
                    path.display(),
                    cases.len()
                );
                task.test_files.push(TestFile {
                    task: key,
                    path: path.to_path_buf(),
                    source,
                    cases,
                });
            } else {
                let origin = origin_tag(&root, path);
                task.variants.push(Variant {
                    id: format!("{}/{}", origin, stem),
                    task: key,
                    origin,
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        Ok(Self { root, tasks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of runnable (variant × test file) jobs in the store.
    pub fn job_count(&self) -> usize {
        self.tasks
            .values()
            .map(|t| t.variants.len() * t.test_files.len())
            .sum()
    }

    /// Keep only tasks whose key matches the glob pattern.
    pub fn filter(&mut self, pattern: &str) -> Result<()> {
        let re = glob_to_regex(pattern)?;
        self.tasks.retain(|key, _| re.is_match(key.as_str()));
        Ok(())
    }
}

/// True if the stem marks the file as a test file.
fn is_test_stem(stem: &str) -> bool {
    stem.starts_with("test_") || stem.ends_with("_test")
}

/// Origin tag: the directory path relative to the corpus root, `/`-joined.
fn origin_tag(root: &Path, path: &Path) -> String {
    let rel = path.parent().and_then(|p| p.strip_prefix(root).ok());
    match rel {
        Some(p) if !p.as_os_str().is_empty() => p
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
        _ => "root".to_string(),
    }
}

/// Scan a test source for top-level `def test_*` procedures and
/// expected-failure markers on their decorators.
///
/// The marker match is deliberately generic (`xfail` or `expected_failure`
/// anywhere in a decorator line) so the harness is not coupled to one test
/// framework's spelling.
pub fn parse_test_cases(source: &str) -> Vec<TestCase> {
    let def_re = Regex::new(r"^def\s+(test_\w+)\s*\(").expect("static regex");
    let marker_re =
        Regex::new(r"^\s*@.*(xfail|expected_failure)").expect("static regex");

    let mut cases = Vec::new();
    let mut pending_expectation = Expectation::Normal;
    for line in source.lines() {
        if marker_re.is_match(line) {
            pending_expectation = Expectation::ExpectFailure;
            continue;
        }
        if let Some(caps) = def_re.captures(line) {
            cases.push(TestCase {
                name: caps[1].to_string(),
                expectation: pending_expectation,
            });
            pending_expectation = Expectation::Normal;
            continue;
        }
        // A decorator we don't recognize keeps any pending marker; anything
        // else (code, blank line) drops it.
        if !line.trim_start().starts_with('@') && !line.trim().is_empty() {
            pending_expectation = Expectation::Normal;
        }
    }
    cases
}

/// Convert a task-key glob (`*`, `?`) to an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|_| Error::InvalidFilter(pattern.to_string()))
}
