//! Harness configuration.
//!
//! Resource limits (timeout, memory ceiling, concurrency, output caps) are
//! configuration, not hidden constants. Values resolve in three layers:
//! built-in defaults < `~/.gauntlet/gauntlet.toml` < CLI flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::isolation::ResourceBudget;
use crate::{glog_debug, Error, Result};

/// Default per-test-case wall-clock budget in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default cap on captured stdout/stderr per test case.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Default bounded job queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default interpreter binary used to drive variant code.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Default source file extension discovered in the corpus.
pub const DEFAULT_SOURCE_EXT: &str = "py";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub max_output_bytes: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub interpreter: Option<String>,
    pub source_ext: Option<String>,
}

impl Config {
    pub fn gauntlet_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".gauntlet"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::gauntlet_dir()?.join("gauntlet.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        glog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            glog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        glog_debug!(
            "Config loaded: concurrency={:?}, timeout_secs={:?}, interpreter={:?}",
            config.concurrency,
            config.timeout_secs,
            config.interpreter
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::gauntlet_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        glog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Number of concurrent workers; defaults to the machine's parallelism.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn effective_memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_mb.map(|mb| mb * 1024 * 1024)
    }

    pub fn effective_max_output_bytes(&self) -> usize {
        self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES)
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY).max(1)
    }

    pub fn effective_interpreter(&self) -> &str {
        self.interpreter.as_deref().unwrap_or(DEFAULT_INTERPRETER)
    }

    pub fn effective_source_ext(&self) -> &str {
        self.source_ext.as_deref().unwrap_or(DEFAULT_SOURCE_EXT)
    }

    /// The per-job resource budget derived from this configuration.
    pub fn budget(&self) -> ResourceBudget {
        ResourceBudget {
            timeout: self.effective_timeout(),
            memory_limit_bytes: self.effective_memory_limit_bytes(),
            max_output_bytes: self.effective_max_output_bytes(),
        }
    }

    /// Resolve the interpreter binary on PATH.
    ///
    /// A missing interpreter is one clear harness error reported before the
    /// run starts, not N per-job failures.
    pub fn resolve_interpreter(&self) -> Result<PathBuf> {
        let name = self.effective_interpreter();
        which::which(name).map_err(|_| Error::InterpreterNotFound(name.to_string()))
    }
}
