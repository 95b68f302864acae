//! Stored objects
//!
//! A [`StoredObject`] is the unit of domain data a store holds: a typed,
//! titled JSON payload plus the identifiers of the objects it refers to.
//! The store treats the payload as opaque; only the equivalence predicate
//! looks inside.

use crate::hash::{ContentHash, HashError};
use crate::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A uniquely identified object inside a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Identifier, unique within its store
    pub id: ObjectId,
    /// Domain type tag (e.g. "TriangulatedSetRepresentation")
    pub object_type: String,
    /// Human readable title
    #[serde(default)]
    pub title: String,
    /// Opaque domain payload
    #[serde(default)]
    pub content: serde_json::Value,
    /// Objects this one refers to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ObjectId>,
    /// Free-form citation data (originator, creation time, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// The parts of an object that define its structure
#[derive(Serialize)]
struct Structure<'a> {
    object_type: &'a str,
    content: &'a serde_json::Value,
    references: &'a [ObjectId],
}

impl StoredObject {
    /// Create object with empty payload
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<ObjectId>, object_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            title: String::new(),
            content: serde_json::Value::Null,
            references: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// With payload
    #[inline]
    #[must_use]
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    /// Add a reference to another object
    #[inline]
    #[must_use]
    pub fn with_reference(mut self, id: impl Into<ObjectId>) -> Self {
        self.references.push(id.into());
        self
    }

    /// Add a metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Structural fingerprint
    ///
    /// Covers type, payload and references. Identifier, title and metadata
    /// are excluded: two objects produced independently with different ids
    /// and citations still fingerprint equal when they describe the same
    /// thing.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized
    pub fn fingerprint(&self) -> Result<ContentHash, HashError> {
        ContentHash::compute_serializable(&Structure {
            object_type: &self.object_type,
            content: &self.content,
            references: &self.references,
        })
    }
}
