//! Core types for batch execution
//!
//! - [`TaskDescriptor`]: what a worker receives (index, arguments, scratch)
//! - [`TaskContext`]: descriptor plus the worker's environment, handed to
//!   the task function
//! - [`TaskResult`]: what a task hands back

use crate::config::WorkerEnvironment;
use crate::error::TaskError;
use bm_store::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

/// Named arguments for one task
pub type TaskArgs = serde_json::Map<String, serde_json::Value>;

/// Argument key carrying the task's index
pub const INDEX_ARG: &str = "index";

/// Argument key carrying the task's scratch directory
pub const SCRATCH_PATH_ARG: &str = "scratch_path";

/// Unique batch identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Ulid);

impl BatchId {
    /// Generate new batch ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable description of one submitted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    index: usize,
    arguments: TaskArgs,
    scratch_path: PathBuf,
}

impl TaskDescriptor {
    /// Build a descriptor, injecting `index` and `scratch_path` into the
    /// argument mapping (caller-supplied values under those keys are
    /// replaced)
    #[must_use]
    pub fn new(index: usize, mut arguments: TaskArgs, scratch_path: PathBuf) -> Self {
        if arguments.contains_key(INDEX_ARG) || arguments.contains_key(SCRATCH_PATH_ARG) {
            tracing::debug!("Task {} arguments shadow injected keys; overriding", index);
        }
        arguments.insert(INDEX_ARG.to_string(), serde_json::Value::from(index));
        arguments.insert(
            SCRATCH_PATH_ARG.to_string(),
            serde_json::Value::from(scratch_path.to_string_lossy().into_owned()),
        );
        Self {
            index,
            arguments,
            scratch_path,
        }
    }

    /// Zero-based submission index
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Argument mapping, including the injected keys
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &TaskArgs {
        &self.arguments
    }

    /// Private scratch directory
    #[inline]
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }
}

/// Everything a task function sees
#[derive(Debug, Clone)]
pub struct TaskContext {
    descriptor: TaskDescriptor,
    environment: Arc<WorkerEnvironment>,
}

impl TaskContext {
    /// Pair a descriptor with the executing worker's environment
    #[inline]
    #[must_use]
    pub fn new(descriptor: TaskDescriptor, environment: Arc<WorkerEnvironment>) -> Self {
        Self {
            descriptor,
            environment,
        }
    }

    /// Zero-based submission index
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    /// Private scratch directory
    #[inline]
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        &self.descriptor.scratch_path
    }

    /// Full argument mapping
    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &TaskArgs {
        &self.descriptor.arguments
    }

    /// Worker environment applied at backend initialization
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &WorkerEnvironment {
        &self.environment
    }

    /// Underlying descriptor
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// Deserialize a required argument
    ///
    /// # Errors
    /// `TaskError::MissingArgument` if absent, `TaskError::InvalidArgument`
    /// if it does not deserialize into `T`
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskError> {
        let value = self
            .descriptor
            .arguments
            .get(name)
            .ok_or_else(|| TaskError::MissingArgument(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| TaskError::InvalidArgument {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Deserialize an optional argument
    ///
    /// # Errors
    /// `TaskError::InvalidArgument` if present but not a `T`
    pub fn arg_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, TaskError> {
        match self.descriptor.arguments.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(_) => self.arg(name).map(Some),
        }
    }
}

/// Outcome reported by one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Index of the originating descriptor
    pub index: usize,
    /// Whether the task considers itself successful
    pub success: bool,
    /// Store produced by the task, if any
    pub artifact_locator: Option<PathBuf>,
    /// Objects to import; `None` imports everything in the store
    pub object_ids: Option<Vec<ObjectId>>,
}

impl TaskResult {
    /// Successful result with a produced store
    #[inline]
    #[must_use]
    pub fn success(
        index: usize,
        artifact_locator: impl Into<PathBuf>,
        object_ids: Option<Vec<ObjectId>>,
    ) -> Self {
        Self {
            index,
            success: true,
            artifact_locator: Some(artifact_locator.into()),
            object_ids,
        }
    }

    /// Successful result that produced nothing to merge
    #[inline]
    #[must_use]
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            success: true,
            artifact_locator: None,
            object_ids: None,
        }
    }

    /// Failed result
    #[inline]
    #[must_use]
    pub fn failed(index: usize) -> Self {
        Self {
            index,
            success: false,
            artifact_locator: None,
            object_ids: None,
        }
    }

    /// Whether the recombination engine has anything to do for this result
    #[inline]
    #[must_use]
    pub fn needs_merge(&self) -> bool {
        self.success && self.artifact_locator.is_some()
    }
}

impl From<(usize, bool, Option<PathBuf>, Option<Vec<ObjectId>>)> for TaskResult {
    fn from(
        (index, success, artifact_locator, object_ids): (
            usize,
            bool,
            Option<PathBuf>,
            Option<Vec<ObjectId>>,
        ),
    ) -> Self {
        Self {
            index,
            success,
            artifact_locator,
            object_ids,
        }
    }
}
