//! Local worker pool
//!
//! A dedicated rayon pool. Each task owns its descriptor and scratch path
//! and runs behind [`run_guarded`], reporting through a oneshot channel.

use super::{default_worker_count, TaskHandle, WorkerBackend};
use crate::config::WorkerEnvironment;
use crate::error::BackendError;
use crate::task::{run_guarded, TaskFunction};
use crate::types::{TaskContext, TaskDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Bounded pool of worker threads on this host
#[derive(Debug)]
pub struct LocalPoolBackend {
    pool: rayon::ThreadPool,
    workers: usize,
    environment: Arc<WorkerEnvironment>,
}

impl LocalPoolBackend {
    /// Start a pool of `workers` threads (host parallelism if `None`)
    ///
    /// # Errors
    /// - `BackendError::NoWorkers` for `Some(0)`
    /// - `BackendError::PoolBuild` if the threads cannot be spawned
    pub fn new(workers: Option<usize>, environment: WorkerEnvironment) -> Result<Self, BackendError> {
        let workers = workers.unwrap_or_else(default_worker_count);
        if workers == 0 {
            return Err(BackendError::NoWorkers);
        }

        let environment = Arc::new(environment);
        let startup_env = Arc::clone(&environment);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bm-worker-{i}"))
            .start_handler(move |i| {
                tracing::debug!(
                    "Worker {} started with environment {:?}",
                    i,
                    startup_env.iter().collect::<Vec<_>>()
                );
            })
            .build()
            .map_err(|e| BackendError::PoolBuild(e.to_string()))?;

        Ok(Self {
            pool,
            workers,
            environment,
        })
    }

    /// Environment every worker was started with
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &WorkerEnvironment {
        &self.environment
    }
}

#[async_trait]
impl WorkerBackend for LocalPoolBackend {
    fn name(&self) -> &str {
        "local-pool"
    }

    fn worker_count(&self) -> usize {
        self.workers
    }

    async fn submit(
        &self,
        function: Arc<dyn TaskFunction>,
        descriptor: TaskDescriptor,
    ) -> Result<TaskHandle, BackendError> {
        let index = descriptor.index();
        let (sender, receiver) = oneshot::channel();
        let ctx = TaskContext::new(descriptor, Arc::clone(&self.environment));
        self.pool.spawn(move || {
            let outcome = run_guarded(function.as_ref(), &ctx);
            // receiver gone means the batch stopped waiting (deadline)
            let _ = sender.send(outcome);
        });
        Ok(TaskHandle::new(index, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TaskError, TaskFault};
    use crate::task::task_fn;
    use crate::types::TaskResult;
    use std::path::PathBuf;

    fn descriptor(index: usize) -> TaskDescriptor {
        TaskDescriptor::new(index, serde_json::Map::new(), PathBuf::from("/tmp/unused"))
    }

    #[test]
    fn zero_workers_rejected() {
        let result = LocalPoolBackend::new(Some(0), WorkerEnvironment::default());
        assert!(matches!(result, Err(BackendError::NoWorkers)));
    }

    #[tokio::test]
    async fn runs_tasks_and_contains_panics() {
        let backend = LocalPoolBackend::new(Some(2), WorkerEnvironment::default()).unwrap();
        assert_eq!(backend.worker_count(), 2);

        let function: Arc<dyn TaskFunction> = Arc::new(task_fn("odd-panics", |ctx| {
            if ctx.index() % 2 == 1 {
                panic!("odd index");
            }
            Ok(TaskResult::empty(ctx.index()))
        }));

        let mut handles = Vec::new();
        for i in 0..4 {
            handles.push(backend.submit(Arc::clone(&function), descriptor(i)).await.unwrap());
        }
        let results = backend.await_all(handles, None).await;
        let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn tasks_see_worker_environment() {
        let env = WorkerEnvironment::empty().with_var("OMP_NUM_THREADS", "1");
        let backend = LocalPoolBackend::new(Some(1), env).unwrap();
        let function: Arc<dyn TaskFunction> = Arc::new(task_fn("env", |ctx| {
            match ctx.environment().get("OMP_NUM_THREADS") {
                Some("1") => Ok(TaskResult::empty(ctx.index())),
                _ => Err(TaskError::MissingArgument("OMP_NUM_THREADS".into())),
            }
        }));
        let handle = backend.submit(function, descriptor(0)).await.unwrap();
        assert!(handle.wait().await.unwrap().success);
    }

    #[tokio::test]
    async fn returned_error_is_fault() {
        let backend = LocalPoolBackend::new(Some(1), WorkerEnvironment::default()).unwrap();
        let function: Arc<dyn TaskFunction> =
            Arc::new(task_fn("fails", |_| Err(TaskError::MissingArgument("x".into()))));
        let handle = backend.submit(function, descriptor(0)).await.unwrap();
        assert!(matches!(handle.wait().await, Err(TaskFault::Failed(_))));
    }
}
