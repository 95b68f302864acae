//! Task dispatch
//!
//! Turns the caller's argument mappings into descriptors (index = position
//! in the list), gives each one a scratch workspace and submits it. A task
//! that cannot be set up or submitted still gets a handle, resolved as a
//! fault, so the batch always yields one result per mapping.

use crate::backend::{TaskHandle, WorkerBackend};
use crate::error::TaskFault;
use crate::scratch::{ScratchManager, ScratchWorkspace};
use crate::task::TaskFunction;
use crate::types::{TaskArgs, TaskDescriptor};
use std::sync::Arc;

/// Handles and workspaces produced by one dispatch
#[derive(Debug)]
pub struct Dispatched {
    /// One handle per argument mapping, in submission order
    pub handles: Vec<TaskHandle>,
    /// Every workspace allocated, to be released after recombination
    pub workspaces: Vec<ScratchWorkspace>,
}

/// Submits a batch to a backend
pub struct Dispatcher<'a> {
    backend: &'a dyn WorkerBackend,
    scratch: &'a ScratchManager,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher
    #[inline]
    #[must_use]
    pub fn new(backend: &'a dyn WorkerBackend, scratch: &'a ScratchManager) -> Self {
        Self { backend, scratch }
    }

    /// Allocate, describe and submit every task
    pub async fn dispatch(
        &self,
        function: &Arc<dyn TaskFunction>,
        argument_mappings: Vec<TaskArgs>,
    ) -> Dispatched {
        let mut handles = Vec::with_capacity(argument_mappings.len());
        let mut workspaces = Vec::with_capacity(argument_mappings.len());

        for (index, arguments) in argument_mappings.into_iter().enumerate() {
            let workspace = match self.scratch.allocate() {
                Ok(workspace) => workspace,
                Err(e) => {
                    tracing::warn!("Task {} not submitted: {}", index, e);
                    handles.push(TaskHandle::resolved(
                        index,
                        Err(TaskFault::Rejected(e.to_string())),
                    ));
                    continue;
                }
            };

            let descriptor = TaskDescriptor::new(index, arguments, workspace.path().to_path_buf());
            workspaces.push(workspace);

            let handle = match self.backend.submit(Arc::clone(function), descriptor).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!("Task {} not submitted: {}", index, e);
                    TaskHandle::resolved(index, Err(TaskFault::Rejected(e.to_string())))
                }
            };
            handles.push(handle);
        }

        tracing::debug!(
            "Submitted {} tasks to {}",
            handles.len(),
            self.backend.name()
        );
        Dispatched {
            handles,
            workspaces,
        }
    }
}
