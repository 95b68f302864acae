//! Task function boundary
//!
//! A [`TaskFunction`] is opaque to the orchestrator: it receives a
//! [`TaskContext`] and hands back a [`TaskResult`]. Backends never call it
//! directly; they go through [`run_guarded`], which turns a returned error
//! or a panic into a [`TaskFault`] so one task cannot take its siblings down.

use crate::error::{TaskError, TaskFault};
use crate::types::{TaskContext, TaskResult};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Work executed once per argument mapping
pub trait TaskFunction: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run the task
    ///
    /// # Errors
    /// Any [`TaskError`]; the batch records `false` for this task
    fn call(&self, ctx: &TaskContext) -> Result<TaskResult, TaskError>;
}

/// Named closure implementing [`TaskFunction`]
pub struct FnTask<F> {
    name: String,
    function: F,
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

impl<F> TaskFunction for FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskResult, TaskError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &TaskContext) -> Result<TaskResult, TaskError> {
        (self.function)(ctx)
    }
}

/// Wrap a closure as a task function
///
/// ```rust
/// use bm_core::{task_fn, TaskFunction, TaskResult};
///
/// let noop = task_fn("noop", |ctx| Ok(TaskResult::empty(ctx.index())));
/// assert_eq!(noop.name(), "noop");
/// ```
#[must_use]
pub fn task_fn<F>(name: impl Into<String>, function: F) -> FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskResult, TaskError> + Send + Sync + 'static,
{
    FnTask {
        name: name.into(),
        function,
    }
}

/// Run a task function behind a failure boundary
///
/// # Errors
/// `TaskFault::Failed` if the function returned an error,
/// `TaskFault::Panicked` if it panicked
pub fn run_guarded(function: &dyn TaskFunction, ctx: &TaskContext) -> Result<TaskResult, TaskFault> {
    match panic::catch_unwind(AssertUnwindSafe(|| function.call(ctx))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(TaskFault::Failed(error)),
        Err(payload) => Err(TaskFault::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
