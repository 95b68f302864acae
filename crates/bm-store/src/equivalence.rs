//! Equivalence predicates used by consolidation
//!
//! The store never decides on its own whether two objects are "the same";
//! it asks an [`Equivalence`]. Domains with richer rules (tolerances on
//! floating point payloads, ignoring derived fields, ...) implement the
//! trait and parameterize [`ObjectStore`](crate::ObjectStore) with it.

use crate::object::StoredObject;

/// Decides whether an incoming object duplicates an existing one
pub trait Equivalence: Send + Sync + Default + std::fmt::Debug {
    /// `incoming` has already had its references rewritten into the
    /// destination's identifier space.
    fn equivalent(&self, incoming: &StoredObject, existing: &StoredObject) -> bool;
}

/// Structural equality on type, payload and references
///
/// See [`StoredObject::fingerprint`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralEquivalence;

impl Equivalence for StructuralEquivalence {
    fn equivalent(&self, incoming: &StoredObject, existing: &StoredObject) -> bool {
        if incoming.object_type != existing.object_type {
            return false;
        }
        match (incoming.fingerprint(), existing.fingerprint()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Identifier equality only
///
/// Useful when producers reuse stable identifiers for shared inputs (the
/// grid every task was run against) and nothing else should merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEquivalence;

impl Equivalence for IdentityEquivalence {
    fn equivalent(&self, incoming: &StoredObject, existing: &StoredObject) -> bool {
        incoming.id == existing.id && incoming.object_type == existing.object_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structural_matches_across_ids() {
        let a = StoredObject::new("a", "Crs").with_content(json!({"z": "down"}));
        let b = StoredObject::new("b", "Crs").with_content(json!({"z": "down"}));
        assert!(StructuralEquivalence.equivalent(&a, &b));
        assert!(!IdentityEquivalence.equivalent(&a, &b));
    }

    #[test]
    fn identity_requires_same_type() {
        let a = StoredObject::new("a", "Crs");
        let b = StoredObject::new("a", "Grid");
        assert!(!IdentityEquivalence.equivalent(&a, &b));
        assert!(!StructuralEquivalence.equivalent(&a, &b));
    }
}
