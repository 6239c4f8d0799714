//! Outcome taxonomy and execution results.
//!
//! Every (task, variant, test case) execution classifies into exactly one
//! outcome. Outcomes are data, not harness faults: all of them except
//! `HarnessError` describe the variant or its tests, and none of them
//! propagate as errors out of the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::corpus::Expectation;

/// Exit code protocol shared with the interpreter driver shim.
pub const EXIT_PASS: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_LOAD_ERROR: i32 = 3;

/// Classification of a single test case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Every assertion held.
    Pass,
    /// An assertion inside the test case did not hold.
    Fail,
    /// Any other exception propagated out of the test case.
    Error,
    /// The per-case wall-clock budget elapsed; the child was force-killed.
    Timeout,
    /// An expect-failure case failed or errored, confirming the expectation.
    ExpectedFailureConfirmed,
    /// An expect-failure case passed; the expectation is violated.
    ExpectedFailureViolated,
    /// The variant failed to parse or import.
    LoadError,
    /// Infrastructure fault unrelated to the variant (worker crash, spawn
    /// failure). Retried once before being recorded.
    HarnessError,
}

impl Outcome {
    /// Map a child process exit code to a raw outcome.
    ///
    /// `None` (killed by signal) classifies as `Error`: the variant died
    /// outside the protocol, e.g. a hard crash or an RLIMIT kill.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_PASS) => Outcome::Pass,
            Some(EXIT_FAIL) => Outcome::Fail,
            Some(EXIT_ERROR) => Outcome::Error,
            Some(EXIT_LOAD_ERROR) => Outcome::LoadError,
            _ => Outcome::Error,
        }
    }

    /// Apply the expectation overlay to a raw outcome.
    ///
    /// For an expect-failure case, `Fail`/`Error` confirm the expectation and
    /// `Pass` violates it. `Timeout`, `LoadError` and `HarnessError` are never
    /// remapped: a hang or a broken variant says nothing about the marked
    /// expectation.
    pub fn overlay(self, expectation: Expectation) -> Self {
        match expectation {
            Expectation::Normal => self,
            Expectation::ExpectFailure => match self {
                Outcome::Pass => Outcome::ExpectedFailureViolated,
                Outcome::Fail | Outcome::Error => Outcome::ExpectedFailureConfirmed,
                other => other,
            },
        }
    }

    /// True for outcomes that count toward a variant's pass tally.
    pub fn counts_as_pass(&self) -> bool {
        matches!(self, Outcome::Pass | Outcome::ExpectedFailureConfirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Error => "error",
            Outcome::Timeout => "timeout",
            Outcome::ExpectedFailureConfirmed => "expected-failure-confirmed",
            Outcome::ExpectedFailureViolated => "expected-failure-violated",
            Outcome::LoadError => "load-error",
            Outcome::HarnessError => "harness-error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The immutable record of one (task, variant, test case) execution.
///
/// Created once per execution and owned by the aggregator afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Task key.
    pub task: String,
    /// Variant id (`<origin>/<stem>`).
    pub variant: String,
    /// Test case name.
    pub test_case: String,
    /// Classified outcome.
    pub outcome: Outcome,
    /// Wall-clock duration of the child process.
    pub duration_ms: u64,
    /// Captured stdout, truncated to the budget's output cap.
    pub stdout: String,
    /// Captured stderr, truncated to the budget's output cap.
    pub stderr: String,
    /// Harness-side diagnostic (timeout notes, load diagnostics, retry info).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// When the result was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn new(
        task: &str,
        variant: &str,
        test_case: &str,
        outcome: Outcome,
        duration: Duration,
    ) -> Self {
        Self {
            task: task.to_string(),
            variant: variant.to_string(),
            test_case: test_case.to_string(),
            outcome,
            duration_ms: duration.as_millis() as u64,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: &str) -> Self {
        self.diagnostic = Some(diagnostic.to_string());
        self
    }
}

/// Truncate captured child output to the budget cap, marking the cut.
pub fn truncate_capture(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    // Back off to a UTF-8 boundary so the lossy conversion stays clean.
    let mut end = max_bytes;
    while end > 0 && bytes[end] & 0b1100_0000 == 0b1000_0000 {
        end -= 1;
    }
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    text.push_str("\n... [output truncated]");
    text
}
