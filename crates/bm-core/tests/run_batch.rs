//! End-to-end batches on the local worker pool.
//!
//! Guarantees exercised here:
//! - one flag per argument mapping, in input order, for any batch size
//! - the lowest index owns every consolidated object, whatever order the
//!   tasks finish in
//! - task faults stay in their own slot
//! - every scratch workspace is gone when the call returns, on every path

use bm_core::{BatchConfig, BatchError, BatchRunner, Concurrency, MalformedBatch, TaskArgs, TaskFunction};
use bm_store::{ArtifactStore, ObjectStore};
use bm_test_utils::{
    args, crs, entry_count, horizon, open_store, originators, script, store_script, with_selection,
    with_sleep, Behavior, ObjectSpec, ScriptedTask,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    fn destination(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn runner(&self, consolidate: bool) -> BatchRunner {
        let config = BatchConfig::new()
            .with_consolidate(consolidate)
            .with_scratch_root(self.scratch_root());
        BatchRunner::new(config, Concurrency::local(3))
    }

    async fn run(&self, consolidate: bool, tasks: Vec<TaskArgs>, destination: &Path) -> Result<Vec<bool>, BatchError> {
        let function: Arc<dyn TaskFunction> = Arc::new(ScriptedTask);
        self.runner(consolidate)
            .run::<ObjectStore>(function, tasks, destination)
            .await
    }

    fn assert_scratch_clean(&self) {
        assert_eq!(entry_count(&self.scratch_root()), 0, "scratch workspaces left behind");
    }
}

fn layer(depth: f64) -> Vec<ObjectSpec> {
    vec![crs("crs"), horizon("A", depth).referencing("crs")]
}

/// The reference scenario: one failure between two equivalent producers.
#[tokio::test]
async fn failed_task_between_equivalent_producers() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = vec![
        store_script(&[horizon("A", 1.0)]),
        script(Behavior::Fail),
        store_script(&[horizon("A", 1.0)]),
    ];

    let successes = fx.run(true, tasks, &dest).await.unwrap();
    assert_eq!(successes, vec![true, false, true]);

    let store = open_store(&dest);
    assert_eq!(store.len(), 1);
    assert_eq!(originators(&store), vec!["task-0".to_string()]);
    fx.assert_scratch_clean();
}

#[tokio::test]
async fn empty_batch() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let successes = fx.run(true, Vec::new(), &dest).await.unwrap();
    assert!(successes.is_empty());
    assert!(open_store(&dest).is_empty());
}

/// Task 0 finishes last, yet its objects survive consolidation.
#[tokio::test]
async fn survivor_independent_of_completion_order() {
    let fx = Fixture::new();
    let sleeps = [300, 0, 150, 50];

    let mut observed = Vec::new();
    for run in 0..2 {
        let dest = fx.destination(&format!("merged-{run}.json"));
        let tasks = sleeps
            .iter()
            .map(|&ms| with_sleep(store_script(&layer(2.5)), ms))
            .collect();
        let successes = fx.run(true, tasks, &dest).await.unwrap();
        assert_eq!(successes, vec![true; 4]);

        let store = open_store(&dest);
        observed.push((store.len(), originators(&store)));
    }

    assert_eq!(observed[0], (2, vec!["task-0".to_string(), "task-0".to_string()]));
    assert_eq!(observed[0], observed[1]);
    fx.assert_scratch_clean();
}

#[tokio::test]
async fn rerunning_into_same_destination_adds_nothing() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = || vec![store_script(&layer(1.0)), store_script(&layer(2.0))];

    fx.run(true, tasks(), &dest).await.unwrap();
    let first = open_store(&dest).len();
    fx.run(true, tasks(), &dest).await.unwrap();
    let second = open_store(&dest).len();

    // crs shared, two distinct horizons
    assert_eq!(first, 3);
    assert_eq!(second, first);
}

#[tokio::test]
async fn without_consolidation_equivalent_objects_duplicate() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = vec![store_script(&[horizon("A", 1.0)]), store_script(&[horizon("A", 1.0)])];

    let successes = fx.run(false, tasks, &dest).await.unwrap();
    assert_eq!(successes, vec![true, true]);

    let store = open_store(&dest);
    assert_eq!(store.len(), 2);
    assert_eq!(originators(&store), vec!["task-0".to_string(), "task-1".to_string()]);
}

#[tokio::test]
async fn faults_stay_in_their_slot() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = vec![
        store_script(&[horizon("A", 1.0)]),
        script(Behavior::Panic),
        script(Behavior::Error),
        script(Behavior::Empty),
        store_script(&[horizon("B", 9.0)]),
    ];

    let successes = fx.run(true, tasks, &dest).await.unwrap();
    assert_eq!(successes, vec![true, false, false, true, true]);
    assert_eq!(open_store(&dest).len(), 2);
    fx.assert_scratch_clean();
}

#[tokio::test]
async fn unknown_selected_object_fails_only_that_task() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = vec![
        with_selection(store_script(&[horizon("A", 1.0)]), &["A", "ghost"]),
        with_selection(store_script(&layer(3.0)), &["A"]),
    ];

    let successes = fx.run(true, tasks, &dest).await.unwrap();
    assert_eq!(successes, vec![false, true]);

    // the selected horizon pulls in the crs it references
    let store = open_store(&dest);
    assert_eq!(store.len(), 2);
    assert_eq!(originators(&store), vec!["task-1".to_string(), "task-1".to_string()]);
}

#[tokio::test]
async fn duplicate_index_is_batch_fatal() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let tasks = vec![
        store_script(&[horizon("A", 1.0)]),
        args(serde_json::json!({ "behavior": Behavior::WrongIndex, "report_index": 0 })),
        store_script(&[horizon("B", 2.0)]),
    ];

    let err = fx.run(true, tasks, &dest).await.unwrap_err();
    assert!(err.is_malformed_batch());
    assert!(matches!(
        err,
        BatchError::MalformedBatch(MalformedBatch::DuplicateIndex(0))
    ));
    assert!(!dest.exists(), "nothing may be merged from a malformed batch");
    fx.assert_scratch_clean();
}

#[tokio::test]
async fn deadline_fails_slow_tasks_and_still_cleans_up() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    let config = BatchConfig::new()
        .with_scratch_root(fx.scratch_root())
        .with_task_timeout(Duration::from_secs(1));
    let runner = BatchRunner::new(config, Concurrency::local(2));
    let tasks = vec![
        store_script(&[horizon("A", 1.0)]),
        with_sleep(store_script(&[horizon("B", 2.0)]), 2_000),
    ];

    let report = runner
        .run_with_report::<ObjectStore>(Arc::new(ScriptedTask), tasks, &dest)
        .await
        .unwrap();
    assert_eq!(report.successes, vec![true, false]);
    assert!(report.cleanup.is_clean());
    fx.assert_scratch_clean();

    // the late task writes its store after cleanup and must not bring its workspace back
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    fx.assert_scratch_clean();
    assert_eq!(open_store(&dest).len(), 1);
}

#[tokio::test]
async fn existing_destination_is_appended_to() {
    let fx = Fixture::new();
    let dest = fx.destination("merged.json");
    fx.run(true, vec![store_script(&[horizon("A", 1.0)])], &dest)
        .await
        .unwrap();

    let report = fx
        .runner(true)
        .run_with_report::<ObjectStore>(
            Arc::new(ScriptedTask),
            vec![store_script(&[horizon("A", 1.0)]), store_script(&[horizon("C", 4.0)])],
            &dest,
        )
        .await
        .unwrap();
    assert_eq!(report.successes, vec![true, true]);
    assert_eq!(report.consolidated, 1);
    assert_eq!(report.imported, 1);
    assert_eq!(report.destination_objects, 2);
    // the object merged by the first batch is still the representative
    assert_eq!(
        originators(&open_store(&dest)),
        vec!["task-0".to_string(), "task-1".to_string()]
    );
}
