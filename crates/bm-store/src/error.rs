//! Error types for store operations

use crate::hash::{ContentHash, HashError};
use crate::id::ObjectId;
use std::path::PathBuf;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No store exists at the path
    #[error("store not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem failure
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded or decoded
    #[error("malformed store {}: {source}", path.display())]
    Format {
        /// Store path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Document written by an incompatible version
    #[error("unsupported store format version {found} in {} (expected {expected})", path.display())]
    UnsupportedVersion {
        /// Store path
        path: PathBuf,
        /// Version in the document
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// Identifier already present
    #[error("duplicate object id: {0}")]
    DuplicateObject(ObjectId),

    /// Object fingerprint could not be computed
    #[error("cannot fingerprint object {id}: {source}")]
    Fingerprint {
        /// Object being hashed
        id: ObjectId,
        /// Underlying error
        #[source]
        source: HashError,
    },

    /// Object changed since the store was persisted
    #[error(
        "object {id} in {} does not match its recorded fingerprint ({} != {})",
        path.display(),
        found.short(),
        expected.short()
    )]
    FingerprintMismatch {
        /// Store path
        path: PathBuf,
        /// Offending object
        id: ObjectId,
        /// Fingerprint recorded at persist time
        expected: ContentHash,
        /// Fingerprint of the object as read
        found: ContentHash,
    },

    /// Identifier not present in the store
    #[error("object {id} not found in {}", store.display())]
    MissingObject {
        /// Requested identifier
        id: ObjectId,
        /// Store that was searched
        store: PathBuf,
    },
}

impl StoreError {
    /// Check if the error means "nothing at that path"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the error names an unknown object
    #[inline]
    #[must_use]
    pub fn is_missing_object(&self) -> bool {
        matches!(self, Self::MissingObject { .. })
    }

    /// Check if the store content fails its integrity check
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::FingerprintMismatch { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Format {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::MissingObject {
            id: ObjectId::new("A"),
            store: PathBuf::from("/tmp/x.json"),
        };
        assert!(err.to_string().contains("object A not found"));
        assert!(err.is_missing_object());
        assert!(!err.is_not_found());
    }
}
