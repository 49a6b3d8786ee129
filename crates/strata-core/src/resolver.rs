//! # Identifier Resolver
//!
//! Reconciles the two identifier spaces of a conversion session:
//! stable cross-session application identifiers and session-local
//! numeric record indices, per keyword namespace.
//!
//! Also owns the pure parent/child identifier derivation used by
//! explode/merge transforms. Derivation never touches resolver state.

use crate::types::{ApplicationId, Keyword, RecordIndex};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PARENT / CHILD IDENTIFIER DERIVATION
// =============================================================================

/// Separator between a parent identifier and a child discriminator.
pub const CHILD_SEPARATOR: char = '_';

/// Derive a child application identifier from a parent and a
/// discriminator: `parent_discriminator`.
///
/// Inverse of [`extract_parent_id`] for any discriminator that does
/// not itself contain the separator.
#[must_use]
pub fn derive_child_id(parent: &ApplicationId, discriminator: &str) -> ApplicationId {
    ApplicationId::new(format!(
        "{}{}{}",
        parent.as_str(),
        CHILD_SEPARATOR,
        discriminator
    ))
}

/// Extract the parent identifier from a derived child identifier.
///
/// Splits at the LAST separator occurrence, so parents that contain
/// the separator themselves still round-trip. Returns `None` when the
/// identifier carries no separator at all.
#[must_use]
pub fn extract_parent_id(child: &ApplicationId) -> Option<ApplicationId> {
    child
        .as_str()
        .rsplit_once(CHILD_SEPARATOR)
        .map(|(parent, _)| ApplicationId::new(parent))
}

// =============================================================================
// ID RESOLVER
// =============================================================================

/// Per-keyword mapping between application identifiers and record
/// indices, plus the set of indices already in use.
///
/// Reservation hands out the lowest unused index ≥ 1 for the keyword.
/// All state lives in `BTreeMap`s so enumeration and reservation are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct IdResolver {
    /// keyword -> application id -> assigned index
    assignments: BTreeMap<Keyword, BTreeMap<ApplicationId, RecordIndex>>,
    /// keyword -> indices already taken (assigned or observed)
    used: BTreeMap<Keyword, BTreeSet<RecordIndex>>,
}

impl IdResolver {
    /// Create a new empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an application identifier to an index under a keyword.
    ///
    /// Returns the existing assignment if one exists; otherwise
    /// reserves the lowest unused index and records the association.
    /// With no identifier, always reserves a fresh index (used for
    /// engine-originated, identifier-less records).
    pub fn resolve_index(
        &mut self,
        keyword: &Keyword,
        application_id: Option<&ApplicationId>,
    ) -> RecordIndex {
        if let Some(app_id) = application_id {
            if let Some(index) = self
                .assignments
                .get(keyword)
                .and_then(|map| map.get(app_id))
            {
                return *index;
            }
        }

        let index = self.reserve_lowest(keyword);
        if let Some(app_id) = application_id {
            self.assignments
                .entry(keyword.clone())
                .or_default()
                .insert(app_id.clone(), index);
        }
        index
    }

    /// Read-only lookup; returns `None` when the identifier has no
    /// assignment yet. The caller decides whether to reserve.
    #[must_use]
    pub fn lookup_index(
        &self,
        keyword: &Keyword,
        application_id: &ApplicationId,
    ) -> Option<RecordIndex> {
        self.assignments
            .get(keyword)?
            .get(application_id)
            .copied()
    }

    /// Batch lookup, order-preserving and parallel to the input slice.
    #[must_use]
    pub fn lookup_indices(
        &self,
        keyword: &Keyword,
        application_ids: &[ApplicationId],
    ) -> Vec<Option<RecordIndex>> {
        application_ids
            .iter()
            .map(|id| self.lookup_index(keyword, id))
            .collect()
    }

    /// Record an externally observed (keyword, index) pair, optionally
    /// with its application identifier, so future reservations skip it.
    ///
    /// Used when loading records read back from the engine.
    pub fn mark_used(
        &mut self,
        keyword: &Keyword,
        index: RecordIndex,
        application_id: Option<&ApplicationId>,
    ) {
        self.used.entry(keyword.clone()).or_default().insert(index);
        if let Some(app_id) = application_id {
            self.assignments
                .entry(keyword.clone())
                .or_default()
                .insert(app_id.clone(), index);
        }
    }

    /// Reset all assignments and reservations.
    pub fn clear(&mut self) {
        self.assignments.clear();
        self.used.clear();
    }

    /// Reserve the lowest unused index ≥ 1 for the keyword.
    fn reserve_lowest(&mut self, keyword: &Keyword) -> RecordIndex {
        let used = self.used.entry(keyword.clone()).or_default();
        let mut candidate = 1u32;
        for taken in used.iter() {
            if taken.get() == candidate {
                candidate = candidate.saturating_add(1);
            } else if taken.get() > candidate {
                break;
            }
        }
        let index = RecordIndex::new(candidate);
        used.insert(index);
        index
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(s: &str) -> Keyword {
        Keyword::new(s)
    }

    fn app(s: &str) -> ApplicationId {
        ApplicationId::new(s)
    }

    #[test]
    fn resolve_reserves_from_one_upwards() {
        let mut resolver = IdResolver::new();
        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("a"))).get(), 1);
        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("b"))).get(), 2);
        // Other keywords have their own index space
        assert_eq!(resolver.resolve_index(&kw("EL"), Some(&app("a"))).get(), 1);
    }

    #[test]
    fn resolve_is_stable_per_identifier() {
        let mut resolver = IdResolver::new();
        let first = resolver.resolve_index(&kw("NODE"), Some(&app("n1")));
        let second = resolver.resolve_index(&kw("NODE"), Some(&app("n1")));
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_without_identifier_always_reserves_fresh() {
        let mut resolver = IdResolver::new();
        let first = resolver.resolve_index(&kw("NODE"), None);
        let second = resolver.resolve_index(&kw("NODE"), None);
        assert_ne!(first, second);
    }

    #[test]
    fn reservation_fills_gaps_left_by_observed_indices() {
        let mut resolver = IdResolver::new();
        resolver.mark_used(&kw("NODE"), RecordIndex::new(1), None);
        resolver.mark_used(&kw("NODE"), RecordIndex::new(3), None);

        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("x"))).get(), 2);
        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("y"))).get(), 4);
    }

    #[test]
    fn mark_used_records_association() {
        let mut resolver = IdResolver::new();
        resolver.mark_used(&kw("NODE"), RecordIndex::new(5), Some(&app("n5")));

        assert_eq!(
            resolver.lookup_index(&kw("NODE"), &app("n5")),
            Some(RecordIndex::new(5))
        );
        // Resolving the same identifier must not reserve anew
        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("n5"))).get(), 5);
    }

    #[test]
    fn lookup_indices_is_order_preserving() {
        let mut resolver = IdResolver::new();
        resolver.resolve_index(&kw("NODE"), Some(&app("a")));
        resolver.resolve_index(&kw("NODE"), Some(&app("b")));

        let results = resolver.lookup_indices(&kw("NODE"), &[app("b"), app("missing"), app("a")]);
        assert_eq!(
            results,
            vec![Some(RecordIndex::new(2)), None, Some(RecordIndex::new(1))]
        );
    }

    #[test]
    fn derive_and_extract_are_inverses() {
        let parent = app("L1");
        let child = derive_child_id(&parent, "Y");
        assert_eq!(child, app("L1_Y"));
        assert_eq!(extract_parent_id(&child), Some(parent));
    }

    #[test]
    fn extract_splits_at_last_separator() {
        // Parents containing the separator still round-trip
        let parent = app("load_case_3");
        let child = derive_child_id(&parent, "Z");
        assert_eq!(extract_parent_id(&child), Some(parent));
    }

    #[test]
    fn extract_without_separator_is_none() {
        assert_eq!(extract_parent_id(&app("plain")), None);
    }

    #[test]
    fn clear_resets_reservations() {
        let mut resolver = IdResolver::new();
        resolver.resolve_index(&kw("NODE"), Some(&app("a")));
        resolver.clear();
        assert_eq!(resolver.lookup_index(&kw("NODE"), &app("a")), None);
        assert_eq!(resolver.resolve_index(&kw("NODE"), Some(&app("b"))).get(), 1);
    }
}
