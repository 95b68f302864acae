//! Worker backends
//!
//! One capability, two implementations:
//! - [`LocalPoolBackend`]: bounded pool of worker threads on this host
//! - [`DistributedBackend`]: jobs handed to a [`ClusterClient`]
//!
//! Both hand out [`TaskHandle`]s and share the join barrier implemented by
//! [`WorkerBackend::await_all`], which never fails: every handle resolves
//! to a [`TaskResult`], faults becoming `success = false`.

mod cluster;
mod local;

pub use cluster::{ClusterClient, ClusterInfo, ClusterJob, DistributedBackend, InProcessCluster};
pub use local::LocalPoolBackend;

use crate::error::{BackendError, TaskFault};
use crate::task::TaskFunction;
use crate::types::{TaskDescriptor, TaskResult};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// What a worker reports for one task
pub type TaskOutcome = Result<TaskResult, TaskFault>;

/// Pending result of one submitted task
#[derive(Debug)]
pub struct TaskHandle {
    index: usize,
    receiver: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Wrap the receiving end of a worker's reply channel
    #[inline]
    #[must_use]
    pub fn new(index: usize, receiver: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { index, receiver }
    }

    /// Handle that is already resolved
    #[must_use]
    pub fn resolved(index: usize, outcome: TaskOutcome) -> Self {
        let (sender, receiver) = oneshot::channel();
        // receiver is alive, send cannot fail
        let _ = sender.send(outcome);
        Self { index, receiver }
    }

    /// Index of the submitted descriptor
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the outcome; a dropped reply channel means the worker is gone
    pub async fn wait(self) -> TaskOutcome {
        self.receiver.await.unwrap_or(Err(TaskFault::Lost))
    }
}

/// Run tasks somewhere and get their results back
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Number of workers executing tasks
    fn worker_count(&self) -> usize;

    /// Submit one task
    ///
    /// # Errors
    /// `BackendError` if the task could not be handed to a worker
    async fn submit(
        &self,
        function: Arc<dyn TaskFunction>,
        descriptor: TaskDescriptor,
    ) -> Result<TaskHandle, BackendError>;

    /// Join barrier: wait for every handle, optionally bounded by `deadline`
    ///
    /// Results come back in handle order, one per handle.
    async fn await_all(&self, handles: Vec<TaskHandle>, deadline: Option<Duration>) -> Vec<TaskResult> {
        await_handles(handles, deadline).await
    }
}

/// Resolve every handle into a [`TaskResult`]
///
/// Handles still pending when `deadline` expires resolve as
/// [`TaskFault::TimedOut`]. The underlying tasks are not cancelled.
pub async fn await_handles(handles: Vec<TaskHandle>, deadline: Option<Duration>) -> Vec<TaskResult> {
    let expires_at = deadline.map(|d| Instant::now() + d);
    let waits = handles.into_iter().map(|handle| async move {
        let index = handle.index();
        let outcome = match expires_at {
            Some(at) => tokio::time::timeout_at(at, handle.wait())
                .await
                .unwrap_or(Err(TaskFault::TimedOut)),
            None => handle.wait().await,
        };
        outcome.unwrap_or_else(|fault| {
            tracing::warn!("Task {} failed: {}", index, fault);
            TaskResult::failed(index)
        })
    });
    futures::future::join_all(waits).await
}

/// Host parallelism, 1 if it cannot be determined
#[must_use]
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
