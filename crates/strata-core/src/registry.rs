//! # Converter Registry
//!
//! Startup-time registration table for the per-entity-type converters.
//! Each type declares its tag, its protocol keyword and its
//! prerequisite types as plain data; the pipeline reads this table to
//! build the dependency graph. No runtime reflection anywhere.

use crate::context::ConversionContext;
use crate::types::{AttachedObject, Keyword, StrataError, TypeTag};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CONVERTER SEAM
// =============================================================================

/// The seam every entity mapper implements.
///
/// Implementations live outside the core (one per entity kind); the
/// pipeline only ever calls them through this trait. A converter may
/// reach into the context's cache and resolver freely while it runs.
pub trait EntityConverter {
    /// The tag identifying this entity type in the pipeline.
    fn tag(&self) -> TypeTag;

    /// The canonical protocol keyword this type maps to.
    fn keyword(&self) -> Keyword;

    /// The entity types that must be fully materialized before this
    /// one converts (referenced geometry, materials, load cases, ...).
    fn prerequisites(&self) -> &[TypeTag];

    /// Write direction: turn this type's domain objects into cache
    /// entries. Returns the number of records committed.
    fn to_records(&self, ctx: &mut ConversionContext) -> Result<u64, StrataError>;

    /// Read direction: turn this type's cache entries into domain
    /// objects.
    fn from_records(&self, ctx: &mut ConversionContext)
        -> Result<Vec<AttachedObject>, StrataError>;
}

// =============================================================================
// TYPE DEPENDENCY GRAPH
// =============================================================================

/// Mapping from entity type to its prerequisite types, restricted to
/// the types participating in the active run.
pub type TypeDependencyGraph = BTreeMap<TypeTag, BTreeSet<TypeTag>>;

// =============================================================================
// REGISTRY
// =============================================================================

/// The registered converters, keyed by type tag.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: BTreeMap<TypeTag, Box<dyn EntityConverter>>,
}

impl ConverterRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under its own tag. A converter registered
    /// twice replaces its predecessor.
    pub fn register(&mut self, converter: Box<dyn EntityConverter>) {
        self.converters.insert(converter.tag(), converter);
    }

    /// Look up the converter for a tag.
    #[must_use]
    pub fn get(&self, tag: TypeTag) -> Option<&dyn EntityConverter> {
        self.converters.get(&tag).map(Box::as_ref)
    }

    /// All registered tags, in order.
    #[must_use]
    pub fn tags(&self) -> Vec<TypeTag> {
        self.converters.keys().copied().collect()
    }

    /// Build the dependency graph for the given type set.
    ///
    /// Prerequisites outside the active set are dropped (not every
    /// type participates in every session); a tag with no registered
    /// converter is a configuration error.
    pub fn dependency_graph(
        &self,
        types: &[TypeTag],
    ) -> Result<TypeDependencyGraph, StrataError> {
        let active: BTreeSet<TypeTag> = types.iter().copied().collect();
        let mut graph = TypeDependencyGraph::new();

        for &tag in &active {
            let Some(converter) = self.converters.get(&tag) else {
                return Err(StrataError::UnknownType(tag));
            };
            let prerequisites = converter
                .prerequisites()
                .iter()
                .copied()
                .filter(|p| active.contains(p))
                .collect();
            graph.insert(tag, prerequisites);
        }
        Ok(graph)
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
