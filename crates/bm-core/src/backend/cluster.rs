//! Distributed cluster backend
//!
//! [`DistributedBackend`] talks to a scheduler through [`ClusterClient`].
//! Before it hands out a backend it asks the scheduler how many workers
//! exist and pushes the [`WorkerEnvironment`] to every one of them; a
//! cluster where some worker did not acknowledge is refused.
//!
//! [`InProcessCluster`] is a client whose workers are Tokio tasks fed by
//! channels. Blocking task functions run on the blocking pool, at most
//! `threads_per_worker` at a time per worker.

use super::{TaskHandle, TaskOutcome, WorkerBackend};
use crate::config::WorkerEnvironment;
use crate::error::{BackendError, TaskFault};
use crate::task::{panic_message, run_guarded, TaskFunction};
use crate::types::{TaskContext, TaskDescriptor};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Scheduler-reported shape of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Workers available
    pub workers: usize,
    /// Threads each worker runs
    pub threads_per_worker: usize,
}

/// One unit of work shipped to a cluster worker
pub struct ClusterJob {
    /// Function to run
    pub function: Arc<dyn TaskFunction>,
    /// Task descriptor
    pub descriptor: TaskDescriptor,
}

impl fmt::Debug for ClusterJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterJob")
            .field("function", &self.function.name())
            .field("index", &self.descriptor.index())
            .finish()
    }
}

/// Connection to a cluster scheduler
#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    /// Query worker and thread counts
    ///
    /// # Errors
    /// `BackendError::SchedulerUnavailable` if the scheduler cannot be reached
    async fn scheduler_info(&self) -> Result<ClusterInfo, BackendError>;

    /// Apply `environment` on every worker; returns how many acknowledged
    ///
    /// # Errors
    /// `BackendError` if the scheduler cannot be reached
    async fn configure_workers(&self, environment: &WorkerEnvironment) -> Result<usize, BackendError>;

    /// Ship one job; the receiver resolves with the job's outcome
    ///
    /// # Errors
    /// `BackendError` if no worker accepted the job
    async fn submit(&self, job: ClusterJob) -> Result<oneshot::Receiver<TaskOutcome>, BackendError>;
}

/// Backend running tasks on a configured cluster
#[derive(Debug)]
pub struct DistributedBackend {
    client: Arc<dyn ClusterClient>,
    info: ClusterInfo,
}

impl DistributedBackend {
    /// Query the cluster and configure every worker
    ///
    /// # Errors
    /// - `BackendError::NoWorkers` if the scheduler reports none
    /// - `BackendError::WorkerConfiguration` if any worker did not
    ///   acknowledge the environment
    pub async fn connect(
        client: Arc<dyn ClusterClient>,
        environment: &WorkerEnvironment,
    ) -> Result<Self, BackendError> {
        let info = client.scheduler_info().await?;
        tracing::info!(
            "Cluster reports {} workers, {} threads per worker",
            info.workers,
            info.threads_per_worker
        );
        if info.workers == 0 {
            return Err(BackendError::NoWorkers);
        }

        let acknowledged = client.configure_workers(environment).await?;
        if acknowledged < info.workers {
            return Err(BackendError::WorkerConfiguration {
                expected: info.workers,
                acknowledged,
            });
        }
        tracing::debug!("Environment applied on {} workers", acknowledged);

        Ok(Self { client, info })
    }

    /// Cluster shape observed at connect time
    #[inline]
    #[must_use]
    pub fn info(&self) -> ClusterInfo {
        self.info
    }
}

#[async_trait]
impl WorkerBackend for DistributedBackend {
    fn name(&self) -> &str {
        "cluster"
    }

    fn worker_count(&self) -> usize {
        self.info.workers
    }

    async fn submit(
        &self,
        function: Arc<dyn TaskFunction>,
        descriptor: TaskDescriptor,
    ) -> Result<TaskHandle, BackendError> {
        let index = descriptor.index();
        let receiver = self
            .client
            .submit(ClusterJob {
                function,
                descriptor,
            })
            .await?;
        Ok(TaskHandle::new(index, receiver))
    }
}

/// Messages sent to a simulated worker
enum WorkerMessage {
    /// Install the worker environment
    Configure {
        environment: Arc<WorkerEnvironment>,
        ack: oneshot::Sender<()>,
    },
    /// Run a job
    Execute {
        job: ClusterJob,
        reply: oneshot::Sender<TaskOutcome>,
    },
    /// Stop the worker loop
    Shutdown,
}

/// Handle for one simulated worker
#[derive(Debug, Clone)]
struct WorkerHandle {
    id: usize,
    sender: mpsc::Sender<WorkerMessage>,
}

impl WorkerHandle {
    async fn send(&self, message: WorkerMessage) -> Result<(), BackendError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| BackendError::WorkerUnavailable(self.id))
    }
}

/// Cluster of simulated workers living in this process
#[derive(Debug)]
pub struct InProcessCluster {
    workers: Mutex<Vec<WorkerHandle>>,
    threads_per_worker: usize,
    next: AtomicUsize,
    executed: Arc<DashMap<usize, usize>>,
}

impl InProcessCluster {
    /// Spawn `workers` worker loops
    ///
    /// # Panics
    /// Outside a Tokio runtime
    #[must_use]
    pub fn start(workers: usize, threads_per_worker: usize) -> Self {
        let threads_per_worker = threads_per_worker.max(1);
        let executed = Arc::new(DashMap::new());
        let handles = (0..workers)
            .map(|id| {
                let (sender, receiver) = mpsc::channel(100);
                tokio::spawn(worker_loop(
                    id,
                    threads_per_worker,
                    receiver,
                    Arc::clone(&executed),
                ));
                WorkerHandle { id, sender }
            })
            .collect();

        Self {
            workers: Mutex::new(handles),
            threads_per_worker,
            next: AtomicUsize::new(0),
            executed,
        }
    }

    /// Jobs a worker has finished
    #[must_use]
    pub fn jobs_executed(&self, worker: usize) -> usize {
        self.executed.get(&worker).map_or(0, |count| *count)
    }

    /// Jobs finished across all workers
    #[must_use]
    pub fn total_executed(&self) -> usize {
        self.executed.iter().map(|entry| *entry.value()).sum()
    }

    /// Stop every worker
    ///
    /// Jobs already running finish; later submissions are rejected.
    pub async fn shutdown(&self) {
        let workers: Vec<WorkerHandle> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.send(WorkerMessage::Shutdown).await;
        }
    }

    fn snapshot(&self) -> Vec<WorkerHandle> {
        self.workers.lock().clone()
    }
}

#[async_trait]
impl ClusterClient for InProcessCluster {
    async fn scheduler_info(&self) -> Result<ClusterInfo, BackendError> {
        Ok(ClusterInfo {
            workers: self.workers.lock().len(),
            threads_per_worker: self.threads_per_worker,
        })
    }

    async fn configure_workers(&self, environment: &WorkerEnvironment) -> Result<usize, BackendError> {
        let environment = Arc::new(environment.clone());
        let mut acknowledged = 0;
        for worker in self.snapshot() {
            let (ack, done) = oneshot::channel();
            let message = WorkerMessage::Configure {
                environment: Arc::clone(&environment),
                ack,
            };
            if worker.send(message).await.is_ok() && done.await.is_ok() {
                acknowledged += 1;
            }
        }
        Ok(acknowledged)
    }

    async fn submit(&self, job: ClusterJob) -> Result<oneshot::Receiver<TaskOutcome>, BackendError> {
        let workers = self.snapshot();
        if workers.is_empty() {
            return Err(BackendError::SchedulerUnavailable(
                "cluster is shut down".to_string(),
            ));
        }
        let worker = &workers[self.next.fetch_add(1, Ordering::Relaxed) % workers.len()];
        let (reply, receiver) = oneshot::channel();
        worker.send(WorkerMessage::Execute { job, reply }).await?;
        Ok(receiver)
    }
}

/// Worker lifecycle loop (runs in its own Tokio task)
async fn worker_loop(
    id: usize,
    threads: usize,
    mut receiver: mpsc::Receiver<WorkerMessage>,
    executed: Arc<DashMap<usize, usize>>,
) {
    let mut environment: Option<Arc<WorkerEnvironment>> = None;
    let slots = Arc::new(Semaphore::new(threads));

    while let Some(message) = receiver.recv().await {
        match message {
            WorkerMessage::Configure {
                environment: applied,
                ack,
            } => {
                tracing::debug!("Worker {} configured with {} variables", id, applied.len());
                environment = Some(applied);
                let _ = ack.send(());
            }
            WorkerMessage::Execute { job, reply } => {
                let Some(environment) = environment.clone() else {
                    tracing::warn!(
                        "Worker {} received task {} before configuration",
                        id,
                        job.descriptor.index()
                    );
                    let _ = reply.send(Err(TaskFault::Unconfigured { worker: id }));
                    continue;
                };
                let Ok(slot) = Arc::clone(&slots).acquire_owned().await else {
                    let _ = reply.send(Err(TaskFault::Lost));
                    continue;
                };
                let executed = Arc::clone(&executed);
                tokio::spawn(async move {
                    let ClusterJob {
                        function,
                        descriptor,
                    } = job;
                    let outcome = tokio::task::spawn_blocking(move || {
                        let ctx = TaskContext::new(descriptor, environment);
                        run_guarded(function.as_ref(), &ctx)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        let message = if e.is_panic() {
                            panic_message(e.into_panic().as_ref())
                        } else {
                            e.to_string()
                        };
                        Err(TaskFault::Panicked(message))
                    });
                    *executed.entry(id).or_insert(0) += 1;
                    drop(slot);
                    let _ = reply.send(outcome);
                });
            }
            WorkerMessage::Shutdown => break,
        }
    }
    tracing::debug!("Worker {} stopped", id);
}
