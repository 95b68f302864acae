//! Batch orchestration
//!
//! [`BatchRunner`] wires the phases together:
//!
//! ```text
//! dispatch -> join barrier -> recombine (one thread, index order) -> cleanup
//! ```
//!
//! Cleanup runs whether or not collection or recombination failed.

use crate::backend::{
    ClusterClient, DistributedBackend, LocalPoolBackend, TaskHandle, WorkerBackend,
};
use crate::cleanup::{release_all, CleanupReport};
use crate::collector::collect;
use crate::config::{BatchConfig, WorkerEnvironment};
use crate::dispatcher::{Dispatched, Dispatcher};
use crate::error::{BackendError, BatchError};
use crate::recombine::{MergeFailure, RecombineOutcome, Recombiner};
use crate::scratch::ScratchManager;
use crate::task::TaskFunction;
use crate::types::{BatchId, TaskArgs};
use bm_store::ArtifactStore;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where tasks run
#[derive(Debug, Clone)]
pub enum Concurrency {
    /// Worker threads on this host (host parallelism if `None`)
    LocalPool {
        /// Pool size
        workers: Option<usize>,
    },
    /// A cluster scheduler
    Cluster(Arc<dyn ClusterClient>),
}

impl Concurrency {
    /// Local pool of `workers` threads
    #[inline]
    #[must_use]
    pub fn local(workers: usize) -> Self {
        Self::LocalPool {
            workers: Some(workers),
        }
    }

    /// Cluster backend
    #[inline]
    #[must_use]
    pub fn cluster(client: Arc<dyn ClusterClient>) -> Self {
        Self::Cluster(client)
    }

    async fn connect(
        &self,
        environment: &WorkerEnvironment,
    ) -> Result<Box<dyn WorkerBackend>, BackendError> {
        let backend: Box<dyn WorkerBackend> = match self {
            Self::LocalPool { workers } => {
                Box::new(LocalPoolBackend::new(*workers, environment.clone())?)
            }
            Self::Cluster(client) => {
                Box::new(DistributedBackend::connect(Arc::clone(client), environment).await?)
            }
        };
        Ok(backend)
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::LocalPool { workers: None }
    }
}

/// Everything known about a finished batch
#[derive(Debug)]
pub struct BatchReport {
    /// Batch identifier
    pub batch_id: BatchId,
    /// Task function name
    pub function: String,
    /// Destination store
    pub destination: PathBuf,
    /// When dispatch started
    pub started_at: DateTime<Utc>,
    /// When cleanup finished
    pub finished_at: DateTime<Utc>,
    /// Per-task success, in input order
    pub successes: Vec<bool>,
    /// Objects inserted as new entries
    pub imported: usize,
    /// Objects absorbed by an equivalent existing entry
    pub consolidated: usize,
    /// Objects in the destination afterwards
    pub destination_objects: usize,
    /// Tasks whose merge failed
    pub merge_failures: Vec<MergeFailure>,
    /// Workspace removal outcome
    pub cleanup: CleanupReport,
}

impl BatchReport {
    /// Number of tasks
    #[inline]
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.successes.len()
    }

    /// Number of `true` slots
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.iter().filter(|s| **s).count()
    }

    /// Whether every task succeeded and merged
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.successes.iter().all(|s| *s)
    }

    /// Wall time from dispatch to end of cleanup
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Runs batches with one configuration and backend choice
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    config: BatchConfig,
    concurrency: Concurrency,
}

impl BatchRunner {
    /// Create a runner
    #[inline]
    #[must_use]
    pub fn new(config: BatchConfig, concurrency: Concurrency) -> Self {
        Self {
            config,
            concurrency,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a batch and return the success vector
    ///
    /// # Errors
    /// See [`run_with_report`](Self::run_with_report)
    pub async fn run<S: ArtifactStore + 'static>(
        &self,
        function: Arc<dyn TaskFunction>,
        argument_mappings: Vec<TaskArgs>,
        destination: &Path,
    ) -> Result<Vec<bool>, BatchError> {
        self.run_with_report::<S>(function, argument_mappings, destination)
            .await
            .map(|report| report.successes)
    }

    /// Run a batch and return the full report
    ///
    /// Every allocated workspace is released before this returns, on every
    /// path past backend startup.
    ///
    /// # Errors
    /// - `BatchError::Backend` if the backend cannot be started
    /// - `BatchError::MalformedBatch` if results violate the index contract
    /// - `BatchError::Destination` if the destination store fails
    pub async fn run_with_report<S: ArtifactStore + 'static>(
        &self,
        function: Arc<dyn TaskFunction>,
        argument_mappings: Vec<TaskArgs>,
        destination: &Path,
    ) -> Result<BatchReport, BatchError> {
        let batch_id = BatchId::new();
        let started_at = Utc::now();
        tracing::info!(
            "Batch {}: calling {} for {} argument sets",
            batch_id,
            function.name(),
            argument_mappings.len()
        );

        let backend = self
            .concurrency
            .connect(&self.config.worker_environment)
            .await?;
        tracing::info!(
            "Backend {} running {} workers",
            backend.name(),
            backend.worker_count()
        );

        let scratch = ScratchManager::from_config(&self.config);
        let Dispatched {
            handles,
            workspaces,
        } = Dispatcher::new(backend.as_ref(), &scratch)
            .dispatch(&function, argument_mappings)
            .await;

        let merged = self
            .join_and_recombine::<S>(backend.as_ref(), handles, destination)
            .await;
        let cleanup = release_all(&scratch, workspaces);
        let outcome = merged?;

        let report = BatchReport {
            batch_id,
            function: function.name().to_string(),
            destination: destination.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            successes: outcome.successes,
            imported: outcome.imported,
            consolidated: outcome.consolidated,
            destination_objects: outcome.destination_objects,
            merge_failures: outcome.merge_failures,
            cleanup,
        };
        tracing::info!(
            "Batch {} finished: {}/{} tasks merged in {} ms",
            report.batch_id,
            report.success_count(),
            report.batch_size(),
            report.elapsed().num_milliseconds()
        );
        Ok(report)
    }

    async fn join_and_recombine<S: ArtifactStore + 'static>(
        &self,
        backend: &dyn WorkerBackend,
        handles: Vec<TaskHandle>,
        destination: &Path,
    ) -> Result<RecombineOutcome, BatchError> {
        let results = collect(backend, handles, self.config.task_timeout()).await?;
        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!("Number of successes {}/{}", succeeded, results.len());

        let recombiner = Recombiner::<S>::new(destination, self.config.consolidate);
        tokio::task::spawn_blocking(move || recombiner.recombine(&results))
            .await
            .map_err(|e| BatchError::Internal(format!("recombination thread: {e}")))?
    }
}

/// Run `function` once per argument mapping and merge the results into the
/// store at `destination`
///
/// Returns one flag per mapping, in input order: `true` iff the task
/// succeeded and its objects were merged.
///
/// # Errors
/// See [`BatchRunner::run_with_report`]
pub async fn run_batch<S: ArtifactStore + 'static>(
    function: impl TaskFunction,
    argument_mappings: Vec<TaskArgs>,
    destination: impl AsRef<Path>,
    consolidate: bool,
    concurrency: Concurrency,
) -> Result<Vec<bool>, BatchError> {
    let config = BatchConfig::default().with_consolidate(consolidate);
    BatchRunner::new(config, concurrency)
        .run::<S>(Arc::new(function), argument_mappings, destination.as_ref())
        .await
}
