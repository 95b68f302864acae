//! batchmerge object stores
//!
//! The artifact side of a batch: every task writes its own store, and the
//! recombination engine copies their objects into one destination.
//!
//! # Core Concepts
//!
//! - [`ArtifactStore`]: the contract the recombination engine relies on
//! - [`ObjectStore`]: JSON-backed implementation with alias tracking
//! - [`StoredObject`]: typed payload plus references to other objects
//! - [`Equivalence`]: domain predicate deciding which objects consolidate
//! - [`ContentHash`]: Blake3 fingerprint used by [`StructuralEquivalence`]
//!
//! # Example
//!
//! ```rust
//! use bm_store::{ArtifactStore, ObjectId, ObjectStore, StoredObject};
//!
//! # fn main() -> Result<(), bm_store::StoreError> {
//! let dir = tempfile::tempdir().expect("tempdir");
//! let mut task_store: ObjectStore = ObjectStore::create(&dir.path().join("task.json"))?;
//! task_store.insert(StoredObject::new("crs", "LocalDepth3dCrs"))?;
//!
//! let mut merged: ObjectStore = ObjectStore::create(&dir.path().join("merged.json"))?;
//! merged.copy_object(&task_store, &ObjectId::new("crs"), true)?;
//! merged.persist()?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

mod equivalence;
mod error;
mod hash;
mod id;
mod object;
mod store;

pub use equivalence::{Equivalence, IdentityEquivalence, StructuralEquivalence};
pub use error::StoreError;
pub use hash::{ContentHash, HashError};
pub use id::ObjectId;
pub use object::StoredObject;
pub use store::{ArtifactStore, CopyOutcome, ObjectStore, FORMAT_VERSION};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
