//! batchmerge core - fork-join batch orchestration
//!
//! Runs one task function over a list of argument mappings, concurrently,
//! then merges the stores the tasks produced into a single destination:
//! - Allocates a private scratch workspace per task
//! - Runs tasks on a local worker pool or a cluster, behind a failure
//!   boundary
//! - Restores submission order from the index each result carries
//! - Recombines stores sequentially in index order, consolidating
//!   equivalent objects
//! - Removes every workspace afterwards, whatever happened
//!
//! # Example
//!
//! ```rust,no_run
//! use bm_core::{run_batch, task_fn, Concurrency, TaskArgs, TaskResult};
//! use bm_store::{ArtifactStore, ObjectStore, StoredObject};
//!
//! # async fn example() -> Result<(), bm_core::BatchError> {
//! let faulting = task_fn("faulting", |ctx| {
//!     let path = ctx.scratch_path().join("fault.json");
//!     let mut store: ObjectStore = ObjectStore::create(&path)?;
//!     store.insert(StoredObject::new(format!("fault-{}", ctx.index()), "FaultInterpretation"))?;
//!     store.persist()?;
//!     Ok(TaskResult::success(ctx.index(), path, None))
//! });
//!
//! let successes = run_batch::<ObjectStore>(
//!     faulting,
//!     vec![TaskArgs::new(); 8],
//!     "merged.json",
//!     true,
//!     Concurrency::local(4),
//! )
//! .await?;
//! assert_eq!(successes.len(), 8);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod backend;
pub mod batch;
pub mod cleanup;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod recombine;
pub mod scratch;
pub mod task;
pub mod types;

pub use backend::{
    await_handles, default_worker_count, ClusterClient, ClusterInfo, ClusterJob,
    DistributedBackend, InProcessCluster, LocalPoolBackend, TaskHandle, TaskOutcome, WorkerBackend,
};
pub use batch::{run_batch, BatchReport, BatchRunner, Concurrency};
pub use cleanup::{release_all, CleanupReport};
pub use collector::{collect, order_results};
pub use config::{BatchConfig, WorkerEnvironment, DEFAULT_SCRATCH_PREFIX};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{
    BackendError, BatchError, BoxError, ConfigError, MalformedBatch, MergeError, ScratchError,
    TaskError, TaskFault,
};
pub use recombine::{recombine, MergeFailure, RecombineOutcome, Recombiner};
pub use scratch::{remove_tree, ReleaseFailure, ReleaseReport, ScratchManager, ScratchWorkspace};
pub use task::{run_guarded, task_fn, FnTask, TaskFunction};
pub use types::{
    BatchId, TaskArgs, TaskContext, TaskDescriptor, TaskResult, INDEX_ARG, SCRATCH_PATH_ARG,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing and running batches
    pub use crate::{
        run_batch, task_fn, BatchConfig, BatchError, BatchRunner, Concurrency, TaskArgs,
        TaskContext, TaskError, TaskFunction, TaskResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
