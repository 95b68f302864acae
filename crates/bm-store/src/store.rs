//! Artifact store contract and the JSON-backed object store
//!
//! [`ArtifactStore`] is the minimal surface the recombination engine needs:
//! open/create by path, enumerate identifiers, copy one object across
//! stores (optionally consolidating it), and persist.
//!
//! [`ObjectStore`] implements it on a single JSON document per store.
//!
//! # Import semantics
//!
//! Copying an object first copies the objects it references (when the
//! source store holds them) and rewrites its references to the identifiers
//! those objects received in the destination. Then:
//!
//! - with consolidation, the first existing object of the same type that
//!   the store's [`Equivalence`] accepts absorbs the incoming one; the
//!   incoming identifier is recorded as an alias of the survivor
//! - otherwise the object is inserted, keeping its identifier unless that
//!   identifier is already taken, in which case a fresh one is minted
//!
//! Each (source store, source id) pair is imported at most once per open
//! destination, so an object reached both directly and through a reference
//! lands exactly once.
//!
//! A reference that closes a cycle inside the source store cannot be
//! rewritten while its target is still being imported. It is patched once
//! the whole copy has unwound, so it ends up pointing at whatever the
//! target became in the destination (renamed or consolidated).
//!
//! # On-disk format
//!
//! The document records a [`ContentHash`] per object next to the objects
//! themselves; [`open`](ArtifactStore::open) recomputes and compares them
//! so a store edited out of band is refused instead of merged.

use crate::equivalence::{Equivalence, StructuralEquivalence};
use crate::error::StoreError;
use crate::hash::ContentHash;
use crate::id::ObjectId;
use crate::object::StoredObject;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk format version written by this build
pub const FORMAT_VERSION: u32 = 1;

/// Minimal store contract used by the recombination engine
pub trait ArtifactStore: Sized + Send {
    /// Error type for all store operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open an existing store
    ///
    /// # Errors
    /// Fails if nothing readable exists at `path`
    fn open(path: &Path) -> Result<Self, Self::Error>;

    /// Create a new empty store bound to `path`
    ///
    /// Nothing is written until [`persist`](Self::persist).
    ///
    /// # Errors
    /// Implementation specific
    fn create(path: &Path) -> Result<Self, Self::Error>;

    /// Open the store at `path` if one exists, otherwise create it
    ///
    /// # Errors
    /// See [`open`](Self::open) and [`create`](Self::create)
    fn open_or_create(path: &Path) -> Result<Self, Self::Error> {
        if path.is_file() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Path the store is bound to
    fn location(&self) -> &Path;

    /// Write the store to its path
    ///
    /// # Errors
    /// Implementation specific
    fn persist(&mut self) -> Result<(), Self::Error>;

    /// Identifiers of every object, in insertion order
    fn object_ids(&self) -> Vec<ObjectId>;

    /// Whether `id` names an object (directly or through an alias)
    fn contains(&self, id: &ObjectId) -> bool;

    /// Number of objects
    fn len(&self) -> usize;

    /// Whether the store holds no objects
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy one object (and what it references) from `source`
    ///
    /// # Errors
    /// Fails if `id` is not in `source`
    fn copy_object(
        &mut self,
        source: &Self,
        id: &ObjectId,
        consolidate: bool,
    ) -> Result<CopyOutcome, Self::Error>;
}

/// What happened to one copied object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Inserted as a new object
    Imported {
        /// Identifier in the source store
        source_id: ObjectId,
        /// Identifier in the destination (differs on collision)
        destination_id: ObjectId,
    },
    /// Absorbed by an equivalent existing object
    Consolidated {
        /// Identifier in the source store
        source_id: ObjectId,
        /// Surviving destination object
        existing_id: ObjectId,
    },
    /// Already imported from this source earlier
    AlreadyPresent {
        /// Identifier in the source store
        source_id: ObjectId,
        /// Identifier it was imported as
        destination_id: ObjectId,
    },
}

impl CopyOutcome {
    /// Identifier the object has in the destination
    #[inline]
    #[must_use]
    pub fn destination_id(&self) -> &ObjectId {
        match self {
            Self::Imported { destination_id, .. } | Self::AlreadyPresent { destination_id, .. } => {
                destination_id
            }
            Self::Consolidated { existing_id, .. } => existing_id,
        }
    }

    /// Whether a new object was created
    #[inline]
    #[must_use]
    pub fn created(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }
}

#[derive(Deserialize)]
struct StoreDocument {
    format_version: u32,
    #[serde(default)]
    objects: Vec<StoredObject>,
    #[serde(default)]
    aliases: BTreeMap<ObjectId, ObjectId>,
    #[serde(default)]
    fingerprints: BTreeMap<ObjectId, ContentHash>,
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    format_version: u32,
    objects: Vec<&'a StoredObject>,
    aliases: &'a BTreeMap<ObjectId, ObjectId>,
    fingerprints: BTreeMap<&'a ObjectId, ContentHash>,
}

/// Cycle back-edge left verbatim during an import
#[derive(Debug)]
struct PendingEdge {
    /// Destination id of the object holding the reference
    holder: ObjectId,
    /// Index into the holder's references
    position: usize,
    /// Source id the reference points at
    target: ObjectId,
}

/// JSON-backed store of [`StoredObject`]s
#[derive(Debug)]
pub struct ObjectStore<Q: Equivalence = StructuralEquivalence> {
    path: PathBuf,
    objects: IndexMap<ObjectId, StoredObject>,
    aliases: BTreeMap<ObjectId, ObjectId>,
    /// (source store, source id) -> destination id, for this session
    provenance: HashMap<(PathBuf, ObjectId), ObjectId>,
    equivalence: Q,
}

impl<Q: Equivalence> ObjectStore<Q> {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            objects: IndexMap::new(),
            aliases: BTreeMap::new(),
            provenance: HashMap::new(),
            equivalence: Q::default(),
        }
    }

    /// Insert an object as-is
    ///
    /// # Errors
    /// `StoreError::DuplicateObject` if the identifier is taken
    pub fn insert(&mut self, object: StoredObject) -> Result<(), StoreError> {
        if self.objects.contains_key(&object.id) || self.aliases.contains_key(&object.id) {
            return Err(StoreError::DuplicateObject(object.id));
        }
        self.objects.insert(object.id.clone(), object);
        Ok(())
    }

    /// Look up an object, following aliases
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&StoredObject> {
        self.resolve(id).and_then(|resolved| self.objects.get(&resolved))
    }

    /// Final identifier `id` stands for, following aliases
    #[must_use]
    pub fn resolve(&self, id: &ObjectId) -> Option<ObjectId> {
        let mut current = id;
        // bounded so a corrupt alias cycle cannot spin forever
        for _ in 0..=self.aliases.len() {
            if self.objects.contains_key(current) {
                return Some(current.clone());
            }
            current = self.aliases.get(current)?;
        }
        None
    }

    /// Objects in insertion order
    pub fn objects(&self) -> impl Iterator<Item = &StoredObject> {
        self.objects.values()
    }

    /// Alias table (incoming id -> surviving id)
    #[inline]
    #[must_use]
    pub fn aliases(&self) -> &BTreeMap<ObjectId, ObjectId> {
        &self.aliases
    }

    /// Objects of one type, in insertion order
    pub fn objects_of_type<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a StoredObject> + 'a {
        self.objects
            .values()
            .filter(move |o| o.object_type == object_type)
    }

    fn find_equivalent(&self, incoming: &StoredObject) -> Option<ObjectId> {
        self.objects_of_type(&incoming.object_type)
            .find(|existing| self.equivalence.equivalent(incoming, existing))
            .map(|existing| existing.id.clone())
    }

    fn id_taken(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id) || self.aliases.contains_key(id)
    }

    fn import(
        &mut self,
        source: &Self,
        requested: &ObjectId,
        consolidate: bool,
        stack: &mut Vec<ObjectId>,
        pending: &mut Vec<PendingEdge>,
    ) -> Result<CopyOutcome, StoreError> {
        let source_id = source
            .resolve(requested)
            .ok_or_else(|| StoreError::MissingObject {
                id: requested.clone(),
                store: source.path.clone(),
            })?;

        let key = (source.path.clone(), source_id.clone());
        if let Some(destination_id) = self.provenance.get(&key) {
            return Ok(CopyOutcome::AlreadyPresent {
                source_id,
                destination_id: destination_id.clone(),
            });
        }

        let mut incoming = source
            .objects
            .get(&source_id)
            .cloned()
            .ok_or_else(|| StoreError::MissingObject {
                id: source_id.clone(),
                store: source.path.clone(),
            })?;

        let mut back_edges = Vec::new();
        stack.push(source_id.clone());
        for (position, reference) in incoming.references.iter_mut().enumerate() {
            let Some(target) = source.resolve(reference) else {
                // external reference, kept verbatim
                continue;
            };
            if stack.contains(&target) {
                tracing::debug!("Reference cycle through {}, patched after import", target);
                back_edges.push((position, target));
                continue;
            }
            let outcome = self.import(source, &target, consolidate, stack, pending)?;
            *reference = outcome.destination_id().clone();
        }
        stack.pop();

        if consolidate {
            if let Some(existing_id) = self.find_equivalent(&incoming) {
                tracing::debug!(
                    "Consolidated {} from {} into existing {}",
                    source_id,
                    source.path.display(),
                    existing_id
                );
                if !self.objects.contains_key(&source_id) {
                    self.aliases
                        .entry(source_id.clone())
                        .or_insert_with(|| existing_id.clone());
                }
                self.provenance.insert(key, existing_id.clone());
                return Ok(CopyOutcome::Consolidated {
                    source_id,
                    existing_id,
                });
            }
        }

        if self.id_taken(&incoming.id) {
            let fresh = ObjectId::generate();
            tracing::debug!("Identifier {} taken, importing as {}", incoming.id, fresh);
            incoming.id = fresh;
        }
        let destination_id = incoming.id.clone();
        self.objects.insert(destination_id.clone(), incoming);
        self.provenance.insert(key, destination_id.clone());
        pending.extend(back_edges.into_iter().map(|(position, target)| PendingEdge {
            holder: destination_id.clone(),
            position,
            target,
        }));

        Ok(CopyOutcome::Imported {
            source_id,
            destination_id,
        })
    }

    fn patch_back_edges(&mut self, source: &Path, pending: Vec<PendingEdge>) {
        for edge in pending {
            // target import failed midway: leave the reference as it was
            let Some(target) = self.provenance.get(&(source.to_path_buf(), edge.target)).cloned() else {
                continue;
            };
            if let Some(reference) = self
                .objects
                .get_mut(&edge.holder)
                .and_then(|holder| holder.references.get_mut(edge.position))
            {
                *reference = target;
            }
        }
    }

    fn verify_fingerprints(
        &self,
        recorded: BTreeMap<ObjectId, ContentHash>,
    ) -> Result<(), StoreError> {
        for (id, expected) in recorded {
            let object = self.objects.get(&id).ok_or_else(|| StoreError::MissingObject {
                id: id.clone(),
                store: self.path.clone(),
            })?;
            let found = object.fingerprint().map_err(|source| StoreError::Fingerprint {
                id: id.clone(),
                source,
            })?;
            if found != expected {
                return Err(StoreError::FingerprintMismatch {
                    path: self.path.clone(),
                    id,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

impl<Q: Equivalence> ArtifactStore for ObjectStore<Q> {
    type Error = StoreError;

    fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let document: StoreDocument =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::format(path, e))?;
        if document.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: document.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let mut store = Self::empty(path);
        for object in document.objects {
            store.insert(object)?;
        }
        for (alias, target) in document.aliases {
            if store.objects.contains_key(&alias) {
                return Err(StoreError::DuplicateObject(alias));
            }
            store.aliases.insert(alias, target);
        }
        store.verify_fingerprints(document.fingerprints)?;
        Ok(store)
    }

    fn create(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::empty(path))
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // never recreate a directory someone else removed
        if !dir.is_dir() {
            return Err(StoreError::io(
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "parent directory does not exist"),
            ));
        }

        let mut fingerprints = BTreeMap::new();
        for (id, object) in &self.objects {
            let hash = object.fingerprint().map_err(|source| StoreError::Fingerprint {
                id: id.clone(),
                source,
            })?;
            fingerprints.insert(id, hash);
        }
        let document = StoreDocumentRef {
            format_version: FORMAT_VERSION,
            objects: self.objects.values().collect(),
            aliases: &self.aliases,
            fingerprints,
        };

        // write-then-rename so a crash never leaves a truncated store
        let mut staged = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        serde_json::to_writer_pretty(&mut staged, &document)
            .map_err(|e| StoreError::format(&self.path, e))?;
        staged.flush().map_err(|e| StoreError::io(&self.path, e))?;
        staged
            .persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        tracing::debug!(
            "Persisted {} objects ({} aliases) to {}",
            self.objects.len(),
            self.aliases.len(),
            self.path.display()
        );
        Ok(())
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().cloned().collect()
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.resolve(id).is_some()
    }

    fn len(&self) -> usize {
        self.objects.len()
    }

    fn copy_object(
        &mut self,
        source: &Self,
        id: &ObjectId,
        consolidate: bool,
    ) -> Result<CopyOutcome, StoreError> {
        let mut stack = Vec::new();
        let mut pending = Vec::new();
        let outcome = self.import(source, id, consolidate, &mut stack, &mut pending);
        self.patch_back_edges(&source.path, pending);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn crs(id: &str) -> StoredObject {
        StoredObject::new(id, "LocalDepth3dCrs").with_content(json!({"z_inc_down": true}))
    }

    fn surface(id: &str, crs_id: &str, z: f64) -> StoredObject {
        StoredObject::new(id, "TriangulatedSetRepresentation")
            .with_content(json!({"z": z}))
            .with_reference(crs_id)
    }

    fn store_at(dir: &Path, name: &str, objects: Vec<StoredObject>) -> ObjectStore {
        let mut store = ObjectStore::create(&dir.join(name)).unwrap();
        for object in objects {
            store.insert(object).unwrap();
        }
        store
    }

    #[test]
    fn persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(dir.path(), "a.json", vec![crs("c1"), surface("s1", "c1", 1.0)]);
        store.persist().unwrap();

        let reopened = ObjectStore::<StructuralEquivalence>::open(&dir.path().join("a.json")).unwrap();
        assert_eq!(reopened.object_ids(), vec![ObjectId::new("c1"), ObjectId::new("s1")]);
        assert_eq!(reopened.get(&ObjectId::new("s1")), store.get(&ObjectId::new("s1")));
    }

    #[test]
    fn open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ObjectStore::<StructuralEquivalence>::open(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn open_rejects_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v9.json");
        fs::write(&path, r#"{"format_version": 9, "objects": []}"#).unwrap();
        let err = ObjectStore::<StructuralEquivalence>::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn open_or_create_creates_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::<StructuralEquivalence>::open_or_create(&dir.path().join("new.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn insert_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(dir.path(), "a.json", vec![crs("c1")]);
        assert!(matches!(store.insert(crs("c1")), Err(StoreError::DuplicateObject(_))));
    }

    #[test]
    fn copy_brings_references_along() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(dir.path(), "src.json", vec![crs("c1"), surface("s1", "c1", 1.0)]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);

        let outcome = dest.copy_object(&source, &ObjectId::new("s1"), true).unwrap();
        assert!(outcome.created());
        assert_eq!(dest.len(), 2);
        assert!(dest.contains(&ObjectId::new("c1")));
    }

    #[test]
    fn consolidation_aliases_and_rewrites_references() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_at(dir.path(), "t0.json", vec![crs("c0"), surface("s0", "c0", 1.0)]);
        let second = store_at(dir.path(), "t1.json", vec![crs("c1"), surface("s1", "c1", 2.0)]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);

        for id in first.object_ids() {
            dest.copy_object(&first, &id, true).unwrap();
        }
        for id in second.object_ids() {
            dest.copy_object(&second, &id, true).unwrap();
        }

        // one crs survives, both surfaces remain and point at it
        assert_eq!(dest.objects_of_type("LocalDepth3dCrs").count(), 1);
        assert_eq!(dest.aliases().get(&ObjectId::new("c1")), Some(&ObjectId::new("c0")));
        let s1 = dest.get(&ObjectId::new("s1")).unwrap();
        assert_eq!(s1.references, vec![ObjectId::new("c0")]);
        assert_eq!(dest.resolve(&ObjectId::new("c1")), Some(ObjectId::new("c0")));
    }

    #[test]
    fn consolidation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(dir.path(), "src.json", vec![crs("c1"), surface("s1", "c1", 1.0)]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);

        for id in source.object_ids() {
            dest.copy_object(&source, &id, true).unwrap();
        }
        let before = dest.len();
        for id in source.object_ids() {
            let outcome = dest.copy_object(&source, &id, true).unwrap();
            assert!(!outcome.created());
        }
        assert_eq!(dest.len(), before);
    }

    #[test]
    fn no_consolidation_duplicates_equivalent_objects() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_at(dir.path(), "t0.json", vec![crs("A")]);
        let second = store_at(dir.path(), "t1.json", vec![crs("A")]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);

        dest.copy_object(&first, &ObjectId::new("A"), false).unwrap();
        let outcome = dest.copy_object(&second, &ObjectId::new("A"), false).unwrap();

        assert_eq!(dest.len(), 2);
        assert_ne!(outcome.destination_id(), &ObjectId::new("A"));
    }

    #[test]
    fn shared_reference_imported_once_without_consolidation() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(
            dir.path(),
            "src.json",
            vec![crs("c1"), surface("s1", "c1", 1.0), surface("s2", "c1", 2.0)],
        );
        let mut dest = store_at(dir.path(), "dest.json", vec![]);

        for id in source.object_ids() {
            dest.copy_object(&source, &id, false).unwrap();
        }
        assert_eq!(dest.len(), 3);
    }

    #[test]
    fn copy_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(dir.path(), "src.json", vec![crs("c1")]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);
        let err = dest.copy_object(&source, &ObjectId::new("ghost"), true).unwrap_err();
        assert!(err.is_missing_object());
        assert!(dest.is_empty());
    }

    #[test]
    fn external_references_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(dir.path(), "src.json", vec![surface("s1", "elsewhere", 1.0)]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);
        dest.copy_object(&source, &ObjectId::new("s1"), true).unwrap();
        assert_eq!(
            dest.get(&ObjectId::new("s1")).unwrap().references,
            vec![ObjectId::new("elsewhere")]
        );
    }

    #[test]
    fn aliases_survive_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_at(dir.path(), "t0.json", vec![crs("c0")]);
        let second = store_at(dir.path(), "t1.json", vec![crs("c1")]);
        let mut dest = store_at(dir.path(), "dest.json", vec![]);
        dest.copy_object(&first, &ObjectId::new("c0"), true).unwrap();
        dest.copy_object(&second, &ObjectId::new("c1"), true).unwrap();
        dest.persist().unwrap();

        let reopened = ObjectStore::<StructuralEquivalence>::open(dest.location()).unwrap();
        assert_eq!(reopened.resolve(&ObjectId::new("c1")), Some(ObjectId::new("c0")));
    }

    #[test]
    fn cycle_back_edge_follows_renamed_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = store_at(
            dir.path(),
            "src.json",
            vec![
                StoredObject::new("A", "Fault").with_reference("B"),
                StoredObject::new("B", "Fault").with_reference("A"),
            ],
        );
        let mut dest = store_at(dir.path(), "dest.json", vec![StoredObject::new("A", "Other")]);

        let outcome = dest.copy_object(&source, &ObjectId::new("A"), false).unwrap();
        let imported_a = outcome.destination_id().clone();
        assert_ne!(imported_a, ObjectId::new("A"));

        let b = dest.get(&ObjectId::new("B")).unwrap();
        assert_eq!(b.references, vec![imported_a.clone()]);
        assert_eq!(dest.get(&imported_a).unwrap().references, vec![ObjectId::new("B")]);
    }

    #[test]
    fn persist_requires_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("gone");
        let mut store = ObjectStore::<StructuralEquivalence>::create(&parent.join("a.json")).unwrap();
        store.insert(crs("c1")).unwrap();

        let err = store.persist().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!parent.exists());
    }

    #[test]
    fn open_detects_edited_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(dir.path(), "a.json", vec![crs("c1")]);
        store.persist().unwrap();

        let path = dir.path().join("a.json");
        let mut document: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(document["fingerprints"]["c1"].is_string());
        document["objects"][0]["content"] = json!({"z_inc_down": false});
        fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let err = ObjectStore::<StructuralEquivalence>::open(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn open_rejects_malformed_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"format_version": 1, "objects": [], "fingerprints": {"c1": "abcd"}}"#,
        )
        .unwrap();
        let err = ObjectStore::<StructuralEquivalence>::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    proptest::proptest! {
        #[test]
        fn consolidated_size_counts_distinct_structures(depths in proptest::collection::vec(0u8..5, 1..12)) {
            let dir = tempfile::tempdir().unwrap();
            let mut dest = store_at(dir.path(), "dest.json", vec![]);
            for (i, z) in depths.iter().enumerate() {
                let crs_id = format!("c{i}");
                let source = store_at(
                    dir.path(),
                    &format!("t{i}.json"),
                    vec![crs(&crs_id), surface(&format!("s{i}"), &crs_id, f64::from(*z))],
                );
                for id in source.object_ids() {
                    dest.copy_object(&source, &id, true).unwrap();
                }
            }

            let distinct: std::collections::BTreeSet<u8> = depths.iter().copied().collect();
            proptest::prop_assert_eq!(dest.len(), 1 + distinct.len());
            // first producer of each structure survives
            let survivors: Vec<ObjectId> = dest
                .objects_of_type("TriangulatedSetRepresentation")
                .map(|o| o.id.clone())
                .collect();
            let mut expected = Vec::new();
            let mut seen = std::collections::BTreeSet::new();
            for (i, z) in depths.iter().enumerate() {
                if seen.insert(*z) {
                    expected.push(ObjectId::new(format!("s{i}")));
                }
            }
            proptest::prop_assert_eq!(survivors, expected);
        }
    }
}
