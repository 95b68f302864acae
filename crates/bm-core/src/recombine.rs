//! Recombination engine
//!
//! Merges every successful task's store into the destination, strictly in
//! index order and on a single thread. With consolidation on, the lowest
//! index producing an object of an equivalence class owns the surviving
//! representative; later tasks only add aliases to it.
//!
//! A task whose store cannot be opened, or which names an object its store
//! does not hold, gets `false` in its slot. Nothing is copied for it when
//! the problem is detected before the first copy.

use crate::error::{BatchError, MergeError};
use crate::types::TaskResult;
use bm_store::{ArtifactStore, CopyOutcome, ObjectId};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One task whose artifacts could not be merged
#[derive(Debug)]
pub struct MergeFailure {
    /// Task index
    pub index: usize,
    /// What went wrong
    pub error: MergeError,
}

/// Result of one recombination pass
#[derive(Debug, Default)]
pub struct RecombineOutcome {
    /// Per-task success, in index order
    pub successes: Vec<bool>,
    /// Objects inserted as new entries
    pub imported: usize,
    /// Objects absorbed by an equivalent existing entry
    pub consolidated: usize,
    /// Tasks whose merge failed
    pub merge_failures: Vec<MergeFailure>,
    /// Objects in the destination after persisting
    pub destination_objects: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct MergeTally {
    imported: usize,
    consolidated: usize,
}

/// Merges task stores of type `S` into one destination
#[derive(Debug)]
pub struct Recombiner<S> {
    destination: PathBuf,
    consolidate: bool,
    store: PhantomData<fn() -> S>,
}

impl<S: ArtifactStore> Recombiner<S> {
    /// Create an engine writing to `destination`
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, consolidate: bool) -> Self {
        Self {
            destination: destination.into(),
            consolidate,
            store: PhantomData,
        }
    }

    /// Destination store path
    #[inline]
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Merge `results` (already in index order) and persist the destination
    ///
    /// # Errors
    /// `BatchError::Destination` if the destination cannot be opened,
    /// created or persisted. Per-task problems never fail the call.
    pub fn recombine(&self, results: &[TaskResult]) -> Result<RecombineOutcome, BatchError> {
        if self.destination.is_file() {
            tracing::info!("Opening existing store {}", self.destination.display());
        } else {
            tracing::info!("Creating new store {}", self.destination.display());
        }
        let mut destination = S::open_or_create(&self.destination)
            .map_err(|e| BatchError::destination(&self.destination, e))?;

        let mut outcome = RecombineOutcome::default();
        for result in results {
            if !result.needs_merge() {
                outcome.successes.push(result.success);
                continue;
            }
            match self.merge_task(&mut destination, result) {
                Ok(tally) => {
                    outcome.imported += tally.imported;
                    outcome.consolidated += tally.consolidated;
                    outcome.successes.push(true);
                }
                Err(error) => {
                    tracing::warn!("Merge of task {} failed: {}", result.index, error);
                    outcome.merge_failures.push(MergeFailure {
                        index: result.index,
                        error,
                    });
                    outcome.successes.push(false);
                }
            }
        }

        destination
            .persist()
            .map_err(|e| BatchError::destination(&self.destination, e))?;
        outcome.destination_objects = destination.len();
        tracing::info!(
            "Store {} holds {} objects ({} imported, {} consolidated)",
            self.destination.display(),
            outcome.destination_objects,
            outcome.imported,
            outcome.consolidated
        );
        Ok(outcome)
    }

    fn merge_task(&self, destination: &mut S, result: &TaskResult) -> Result<MergeTally, MergeError> {
        let Some(locator) = result.artifact_locator.as_deref() else {
            return Ok(MergeTally::default());
        };
        let source = S::open(locator).map_err(|e| MergeError::OpenSource {
            locator: locator.to_path_buf(),
            source: Box::new(e),
        })?;

        let ids = self.resolve_ids(&source, locator, result.object_ids.as_deref())?;
        let mut tally = MergeTally::default();
        for id in &ids {
            let copied = destination
                .copy_object(&source, id, self.consolidate)
                .map_err(|e| MergeError::Copy {
                    id: id.clone(),
                    source: Box::new(e),
                })?;
            match copied {
                CopyOutcome::Imported { .. } => tally.imported += 1,
                CopyOutcome::Consolidated { .. } => tally.consolidated += 1,
                CopyOutcome::AlreadyPresent { .. } => {}
            }
        }

        tracing::info!(
            "Task {}: {} objects from {} ({} imported, {} consolidated)",
            result.index,
            ids.len(),
            locator.display(),
            tally.imported,
            tally.consolidated
        );
        Ok(tally)
    }

    fn resolve_ids(
        &self,
        source: &S,
        locator: &Path,
        requested: Option<&[ObjectId]>,
    ) -> Result<Vec<ObjectId>, MergeError> {
        let Some(requested) = requested else {
            return Ok(source.object_ids());
        };
        if let Some(unknown) = requested.iter().find(|id| !source.contains(id)) {
            return Err(MergeError::UnknownObject {
                id: unknown.clone(),
                locator: locator.to_path_buf(),
            });
        }
        Ok(requested.to_vec())
    }
}

/// Merge `results` into the store at `destination`
///
/// Returns the per-task success vector in index order.
///
/// # Errors
/// See [`Recombiner::recombine`]
pub fn recombine<S: ArtifactStore>(
    destination: &Path,
    results: &[TaskResult],
    consolidate: bool,
) -> Result<Vec<bool>, BatchError> {
    Recombiner::<S>::new(destination, consolidate)
        .recombine(results)
        .map(|outcome| outcome.successes)
}
