//! Testing utilities for batchmerge workspace
//!
//! Store fixtures and a scripted task function whose behavior is chosen by
//! its arguments.

#![allow(missing_docs)]

use bm_core::{TaskArgs, TaskContext, TaskError, TaskFunction, TaskResult};
use bm_store::{ArtifactStore, ObjectId, ObjectStore, StoredObject};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the store a scripted task writes inside its scratch directory
pub const TASK_STORE_NAME: &str = "task.json";

/// Metadata key recording which task produced an object
pub const ORIGINATOR: &str = "originator";

/// Object a scripted task writes into its store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: String,
    pub object_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub references: Vec<String>,
}

impl ObjectSpec {
    pub fn new(id: &str, object_type: &str, content: Value) -> Self {
        Self {
            id: id.to_string(),
            object_type: object_type.to_string(),
            content,
            references: Vec::new(),
        }
    }

    pub fn referencing(mut self, id: &str) -> Self {
        self.references.push(id.to_string());
        self
    }
}

/// What a scripted task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Write `objects` to a store and report it
    Store,
    /// Report success without a store
    Empty,
    /// Report `success = false`
    Fail,
    /// Return an error
    Error,
    /// Panic
    Panic,
    /// Report success under `report_index` instead of its own index
    WrongIndex,
}

/// Build task arguments from a JSON object literal
pub fn args(value: Value) -> TaskArgs {
    value.as_object().cloned().unwrap_or_default()
}

/// Arguments for a scripted task
pub fn script(behavior: Behavior) -> TaskArgs {
    args(json!({ "behavior": behavior }))
}

/// Arguments for a scripted task that writes `objects`
pub fn store_script(objects: &[ObjectSpec]) -> TaskArgs {
    args(json!({ "behavior": Behavior::Store, "objects": objects }))
}

/// Add a delay before the task does anything
pub fn with_sleep(mut arguments: TaskArgs, millis: u64) -> TaskArgs {
    arguments.insert("sleep_ms".to_string(), json!(millis));
    arguments
}

/// Restrict the reported object ids
pub fn with_selection(mut arguments: TaskArgs, ids: &[&str]) -> TaskArgs {
    arguments.insert("select".to_string(), json!(ids));
    arguments
}

/// Task function driven entirely by its arguments
///
/// Arguments: `behavior` (default `store`), `objects`, `select`,
/// `sleep_ms`, `report_index`. Every object written carries an
/// `originator` metadata entry `task-<index>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedTask;

impl TaskFunction for ScriptedTask {
    fn name(&self) -> &str {
        "scripted"
    }

    fn call(&self, ctx: &TaskContext) -> Result<TaskResult, TaskError> {
        if let Some(millis) = ctx.arg_opt::<u64>("sleep_ms")? {
            std::thread::sleep(Duration::from_millis(millis));
        }

        let index = ctx.index();
        match ctx.arg_opt::<Behavior>("behavior")?.unwrap_or(Behavior::Store) {
            Behavior::Store => {
                let objects: Vec<ObjectSpec> = ctx.arg_opt("objects")?.unwrap_or_default();
                let path = ctx.scratch_path().join(TASK_STORE_NAME);
                write_store(&path, &objects, &format!("task-{index}"))?;
                let select: Option<Vec<ObjectId>> = ctx
                    .arg_opt::<Vec<String>>("select")?
                    .map(|ids| ids.into_iter().map(ObjectId::from).collect());
                Ok(TaskResult::success(index, path, select))
            }
            Behavior::Empty => Ok(TaskResult::empty(index)),
            Behavior::Fail => Ok(TaskResult::failed(index)),
            Behavior::Error => Err(TaskError::InvalidArgument {
                name: "behavior".to_string(),
                reason: format!("task {index} scripted to error"),
            }),
            Behavior::Panic => panic!("task {index} scripted to panic"),
            Behavior::WrongIndex => Ok(TaskResult::empty(ctx.arg::<usize>("report_index")?)),
        }
    }
}

/// Write a store holding `objects`, each tagged with `originator`
pub fn write_store(
    path: &Path,
    objects: &[ObjectSpec],
    originator: &str,
) -> Result<(), bm_store::StoreError> {
    let mut store: ObjectStore = ObjectStore::create(path)?;
    for spec in objects {
        let mut object = StoredObject::new(spec.id.as_str(), spec.object_type.as_str())
            .with_content(spec.content.clone())
            .with_metadata(ORIGINATOR, originator);
        for reference in &spec.references {
            object = object.with_reference(reference.as_str());
        }
        store.insert(object)?;
    }
    store.persist()
}

/// Write a store fixture into `dir` and return its path
pub fn store_fixture(dir: &Path, name: &str, objects: &[ObjectSpec], originator: &str) -> PathBuf {
    let path = dir.join(name);
    write_store(&path, objects, originator).unwrap();
    path
}

/// Open a store, panicking on failure
pub fn open_store(path: &Path) -> ObjectStore {
    ObjectStore::open(path).unwrap()
}

/// Originator tags of every object in a store, in insertion order
pub fn originators(store: &ObjectStore) -> Vec<String> {
    store
        .objects()
        .map(|o| o.metadata.get(ORIGINATOR).cloned().unwrap_or_default())
        .collect()
}

/// A horizon-like object; equal `depth` means structurally equivalent
pub fn horizon(id: &str, depth: f64) -> ObjectSpec {
    ObjectSpec::new(id, "HorizonInterpretation", json!({ "depth": depth }))
}

/// A coordinate reference system
pub fn crs(id: &str) -> ObjectSpec {
    ObjectSpec::new(id, "LocalDepth3dCrs", json!({ "z_inc_down": true }))
}

/// Number of entries directly under `dir` (0 if it does not exist)
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count())
}
