//! Batch configuration
//!
//! [`BatchConfig`] is plain data: it can be built in code with the `with_*`
//! methods or loaded from TOML.
//!
//! ```toml
//! consolidate = true
//! scratch_prefix = "bm-task-"
//! task_timeout_secs = 1800
//!
//! [worker_environment]
//! OMP_NUM_THREADS = "1"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default prefix for scratch directory names
pub const DEFAULT_SCRATCH_PREFIX: &str = "bm-task-";

/// Variables that pin numeric libraries to one thread per task
const SINGLE_THREADED_NUMERICS: [&str; 4] = [
    "OMP_NUM_THREADS",
    "MKL_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "NUMBA_NUM_THREADS",
];

/// Environment applied to every worker once, before its first task
///
/// Tasks read it from their [`TaskContext`](crate::TaskContext); nothing
/// here touches the orchestrator's own process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerEnvironment {
    vars: BTreeMap<String, String>,
}

impl WorkerEnvironment {
    /// Environment with no variables
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }

    /// Set a variable
    #[inline]
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// All variables, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Apply to a child process command
    ///
    /// For task functions that shell out to external numeric tools.
    pub fn apply_to(&self, command: &mut std::process::Command) {
        command.envs(self.iter());
    }
}

impl Default for WorkerEnvironment {
    /// Disables nested parallelism inside numeric libraries
    fn default() -> Self {
        SINGLE_THREADED_NUMERICS
            .iter()
            .fold(Self::empty(), |env, name| env.with_var(*name, "1"))
    }
}

/// Batch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Deduplicate equivalent objects during recombination
    pub consolidate: bool,
    /// Directory scratch workspaces are created under (system temp if unset)
    pub scratch_root: Option<PathBuf>,
    /// Prefix for scratch directory names
    pub scratch_prefix: String,
    /// Deadline for the whole join barrier, in seconds
    pub task_timeout_secs: Option<u64>,
    /// Environment applied to every worker
    pub worker_environment: WorkerEnvironment,
}

impl BatchConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With consolidation switch
    #[inline]
    #[must_use]
    pub fn with_consolidate(mut self, consolidate: bool) -> Self {
        self.consolidate = consolidate;
        self
    }

    /// With scratch root
    #[inline]
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// With join deadline
    #[inline]
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// With worker environment
    #[inline]
    #[must_use]
    pub fn with_worker_environment(mut self, environment: WorkerEnvironment) -> Self {
        self.worker_environment = environment;
        self
    }

    /// Join deadline as a duration
    #[inline]
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Effective scratch root
    #[must_use]
    pub fn effective_scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if unreadable, `ConfigError::Parse` if malformed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `ConfigError::Render` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            consolidate: true,
            scratch_root: None,
            scratch_prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
            task_timeout_secs: None,
            worker_environment: WorkerEnvironment::default(),
        }
    }
}
