//! Result collection
//!
//! The join barrier, then a strict reordering by the `index` each result
//! carries. Completion order never matters; a result set that is not
//! exactly `{0, ..., N-1}` is a backend bug and fails the batch.

use crate::backend::{TaskHandle, WorkerBackend};
use crate::error::MalformedBatch;
use crate::types::TaskResult;
use std::time::Duration;

/// Wait for every handle and return results in index order
///
/// # Errors
/// `MalformedBatch` if the reported indices are not a permutation of
/// `0..handles.len()`
pub async fn collect(
    backend: &dyn WorkerBackend,
    handles: Vec<TaskHandle>,
    deadline: Option<Duration>,
) -> Result<Vec<TaskResult>, MalformedBatch> {
    let batch_size = handles.len();
    let results = backend.await_all(handles, deadline).await;
    tracing::info!("Function calls complete");
    order_results(results, batch_size)
}

/// Sort results by index, validating the index contract
///
/// Checked in order: out of range, duplicated, missing.
///
/// # Errors
/// The first violation found
pub fn order_results(
    mut results: Vec<TaskResult>,
    batch_size: usize,
) -> Result<Vec<TaskResult>, MalformedBatch> {
    if let Some(stray) = results.iter().find(|r| r.index >= batch_size) {
        return Err(MalformedBatch::IndexOutOfRange {
            index: stray.index,
            batch_size,
        });
    }

    results.sort_by_key(|r| r.index);
    if let Some(pair) = results.windows(2).find(|pair| pair[0].index == pair[1].index) {
        return Err(MalformedBatch::DuplicateIndex(pair[0].index));
    }

    // unique and in range: position i holds index i up to the first gap
    if results.len() < batch_size {
        let gap = results
            .iter()
            .enumerate()
            .find(|(position, r)| r.index != *position)
            .map_or(results.len(), |(position, _)| position);
        return Err(MalformedBatch::MissingIndex(gap));
    }

    Ok(results)
}
