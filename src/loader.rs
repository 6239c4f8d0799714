//! Variant loading inside an isolation context.
//!
//! The loader materializes a variant's source and the embedded driver shim
//! into a sandbox, then runs the interpreter in check mode. Load failures
//! (syntax errors, missing imports) come back as a [`LoadStatus::LoadError`]
//! with the raw diagnostic — they are data, never a harness fault.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;

use crate::corpus::Variant;
use crate::isolation::{IsolationContext, MEM_LIMIT_ENV};
use crate::outcome::{truncate_capture, EXIT_PASS};
use crate::{glog_debug, Error, Result};

/// File name the driver shim is materialized under inside each sandbox.
pub const SHIM_FILE: &str = "gauntlet_shim.py";

/// The embedded interpreter driver.
pub const SHIM_SOURCE: &str = include_str!("shim.py");

/// File name a variant's source is materialized under.
///
/// The stem must match the variant's own stem so test files can import the
/// module by its original name.
fn variant_file_name(variant: &Variant) -> String {
    variant
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("{}.py", variant.task))
}

/// Result of one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    LoadError,
}

/// Outcome of loading a variant into a context.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub status: LoadStatus,
    /// Raw interpreter diagnostic on failure.
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

impl LoadResult {
    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }
}

/// Turns variant source text into an invokable unit inside a context.
#[derive(Debug, Clone)]
pub struct VariantLoader {
    interpreter: PathBuf,
}

impl VariantLoader {
    pub fn new(interpreter: PathBuf) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Write the variant source and the driver shim into the sandbox.
    ///
    /// Returns the sandbox-relative variant file name; the shim always lands
    /// under [`SHIM_FILE`]. A variant defining multiple top-level symbols is
    /// materialized as a whole unit — locating the symbol a test needs is the
    /// runner's (well, the shim's) concern.
    pub fn materialize(&self, context: &IsolationContext, variant: &Variant) -> Result<String> {
        let file_name = variant_file_name(variant);
        context.write_file(&file_name, &variant.source)?;
        context.write_file(SHIM_FILE, SHIM_SOURCE)?;
        glog_debug!(
            "materialized variant {} into {}",
            variant.id,
            context.path().display()
        );
        Ok(file_name)
    }

    /// Run the interpreter's load check against a materialized variant.
    ///
    /// A load that exceeds the context's wall-clock budget (a hanging
    /// module-level import) is also a load error, with a diagnostic saying so.
    pub async fn load(
        &self,
        context: &IsolationContext,
        variant_file: &str,
    ) -> Result<LoadResult> {
        let budget = context.budget();
        let started = Instant::now();

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(SHIM_FILE)
            .arg("--check")
            .arg(variant_file)
            .current_dir(context.path())
            .kill_on_drop(true);
        if let Some(limit) = budget.memory_limit_bytes {
            cmd.env(MEM_LIMIT_ENV, limit.to_string());
        }

        let output = match tokio::time::timeout(budget.timeout, cmd.output()).await {
            Ok(io_result) => io_result.map_err(|e| Error::JobExecution(e.to_string()))?,
            Err(_) => {
                return Ok(LoadResult {
                    status: LoadStatus::LoadError,
                    diagnostic: Some(format!(
                        "load exceeded wall-clock budget of {:?}",
                        budget.timeout
                    )),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if output.status.code() == Some(EXIT_PASS) {
            Ok(LoadResult {
                status: LoadStatus::Loaded,
                diagnostic: None,
                duration_ms,
            })
        } else {
            let diagnostic = truncate_capture(&output.stderr, budget.max_output_bytes);
            Ok(LoadResult {
                status: LoadStatus::LoadError,
                diagnostic: Some(diagnostic),
                duration_ms,
            })
        }
    }
}
