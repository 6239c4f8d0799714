//! Disposable, collision-free execution environments.
//!
//! Each job gets a fresh sandbox directory and a resource budget; every test
//! case of the job runs as its own interpreter child process rooted in that
//! directory. Two variants defining the same `Transport` class can never
//! alias each other's state because they never share an interpreter process
//! or a working directory.
//!
//! Destruction is deterministic: children are spawned with `kill_on_drop`, so
//! tearing the context down mid-execution leaks neither processes nor files.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::{glog_trace, Error, Result};

/// Environment variable carrying the memory ceiling to child processes.
///
/// The driver shim applies it with `RLIMIT_AS` inside the child, which keeps
/// the limit attributable to the context without unsafe pre-exec hooks.
pub const MEM_LIMIT_ENV: &str = "GAUNTLET_MEM_LIMIT_BYTES";

/// Per-job resource budget.
///
/// All three limits are configuration, overridable per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    /// Wall-clock budget per test case.
    pub timeout: Duration,
    /// Address-space ceiling for child processes, if any.
    pub memory_limit_bytes: Option<u64>,
    /// Cap on captured stdout/stderr per test case.
    pub max_output_bytes: usize,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            memory_limit_bytes: None,
            max_output_bytes: crate::config::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// A fresh, disposable execution namespace for exactly one job.
///
/// Owns a temp directory that doubles as the child working directory, so a
/// variant's filesystem effects stay inside the context by default.
#[derive(Debug)]
pub struct IsolationContext {
    dir: TempDir,
    budget: ResourceBudget,
}

impl IsolationContext {
    /// Allocate a fresh sandbox with the given budget.
    ///
    /// Creation failure (resource exhaustion) is harness-fatal for the job
    /// only: callers report it and continue with other jobs.
    pub fn create(budget: ResourceBudget) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gauntlet-")
            .tempdir()
            .map_err(|e| Error::ContextCreate(e.to_string()))?;
        glog_trace!("context created at {}", dir.path().display());
        Ok(Self { dir, budget })
    }

    /// The sandbox directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn budget(&self) -> &ResourceBudget {
        &self.budget
    }

    /// Write a file into the sandbox, returning its absolute path.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Release the sandbox.
    ///
    /// Children spawned for this context carry `kill_on_drop`, so destroying
    /// a context whose code is mid-execution still reclaims everything.
    pub fn destroy(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        glog_trace!("context destroyed at {}", path.display());
        Ok(())
    }
}
