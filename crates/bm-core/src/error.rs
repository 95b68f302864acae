//! Error types for batch orchestration
//!
//! The taxonomy mirrors how far a failure is allowed to travel:
//! - [`TaskError`] / [`TaskFault`]: local to one task, end up as `false`
//!   in that task's slot
//! - [`MergeError`]: local to one task's merge, same treatment
//! - [`ScratchError`]: allocation failures, local to the task being set up
//! - [`BatchError`]: structural problems that invalidate the whole batch

use std::path::PathBuf;

/// Boxed error crossing a generic store boundary
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Batch-fatal errors
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Results violate the index contract
    #[error("malformed batch: {0}")]
    MalformedBatch(#[from] MalformedBatch),

    /// Destination store could not be opened, created or persisted
    #[error("destination store {}: {source}", path.display())]
    Destination {
        /// Destination path
        path: PathBuf,
        /// Underlying store error
        #[source]
        source: BoxError,
    },

    /// Worker backend could not be brought up
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Orchestrator-side failure (a recombination thread died)
    #[error("internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Check if the error is a violation of the index contract
    #[inline]
    #[must_use]
    pub fn is_malformed_batch(&self) -> bool {
        matches!(self, Self::MalformedBatch(_))
    }

    pub(crate) fn destination(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Destination {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Ways a collected result set can violate the index contract
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedBatch {
    /// Two results claim the same index
    #[error("index {0} reported more than once")]
    DuplicateIndex(usize),

    /// A result claims an index outside `0..batch_size`
    #[error("index {index} out of range for batch of {batch_size}")]
    IndexOutOfRange {
        /// Reported index
        index: usize,
        /// Number of submitted tasks
        batch_size: usize,
    },

    /// No result for an index
    #[error("no result for index {0}")]
    MissingIndex(usize),
}

/// Worker backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Local thread pool could not be built
    #[error("worker pool build failed: {0}")]
    PoolBuild(String),

    /// Cluster reports no workers
    #[error("cluster has no workers")]
    NoWorkers,

    /// Not every worker acknowledged the environment
    #[error("worker configuration incomplete: {acknowledged}/{expected} workers configured")]
    WorkerConfiguration {
        /// Workers the scheduler reported
        expected: usize,
        /// Workers that acknowledged
        acknowledged: usize,
    },

    /// Scheduler query failed
    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    /// Worker channel closed
    #[error("worker {0} unavailable")]
    WorkerUnavailable(usize),
}

/// Scratch workspace errors
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    /// Directory could not be created
    #[error("cannot allocate scratch workspace under {}: {source}", root.display())]
    Allocation {
        /// Scratch root
        root: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by a task function
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Required argument absent
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// Argument present but unusable
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument {
        /// Argument name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Store access inside the task failed
    #[error("store error: {0}")]
    Store(#[from] bm_store::StoreError),

    /// Filesystem failure inside the task
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How a task handle resolved without a usable result
#[derive(Debug, thiserror::Error)]
pub enum TaskFault {
    /// Task function returned an error
    #[error("task returned error: {0}")]
    Failed(TaskError),

    /// Task function panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Worker went away without replying
    #[error("worker dropped the task")]
    Lost,

    /// Deadline passed before the task resolved
    #[error("task did not finish before the deadline")]
    TimedOut,

    /// Worker had not received its environment
    #[error("worker {worker} is not configured")]
    Unconfigured {
        /// Worker id
        worker: usize,
    },

    /// Task never reached a worker
    #[error("task rejected before execution: {0}")]
    Rejected(String),
}

impl TaskFault {
    /// Check if the fault is a deadline expiry
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Per-task merge failure
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Task store could not be opened
    #[error("cannot open task store {}: {source}", locator.display())]
    OpenSource {
        /// Artifact locator reported by the task
        locator: PathBuf,
        /// Underlying store error
        #[source]
        source: BoxError,
    },

    /// Requested object id not in the task store
    #[error("object {id} not present in {}", locator.display())]
    UnknownObject {
        /// Requested id
        id: bm_store::ObjectId,
        /// Artifact locator reported by the task
        locator: PathBuf,
    },

    /// Copy into the destination failed
    #[error("copy of {id} failed: {source}")]
    Copy {
        /// Object being copied
        id: bm_store::ObjectId,
        /// Underlying store error
        #[source]
        source: BoxError,
    },
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML could not be produced
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// Config file unreadable
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}
