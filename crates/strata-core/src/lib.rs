//! # strata-core
//!
//! The deterministic conversion core for Strata - THE LOGIC.
//!
//! This crate implements the shared infrastructure every entity mapper
//! depends on when converting structural-engineering models to and
//! from a third-party analysis engine's line-oriented command
//! protocol:
//!
//! - **codec**: parse/format one protocol line across its three
//!   physical command orderings, keyword versions, keyword families
//!   and embedded identifier tags
//! - **resolver**: reconcile stable application identifiers with
//!   session-local record indices, and derive parent/child identifiers
//!   for explode/merge
//! - **cache**: the single source of truth for all records seen or
//!   produced in a session, with idempotent upsert, only-new retrieval
//!   and stream-scoped snapshot/diff
//! - **pipeline**: wave-based conversion ordered by a declared
//!   type-dependency graph, in both directions
//! - **transforms**: the explode (one object, many records) and merge
//!   (many records, one object) patterns
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the ONLY place where conversion state exists (cache, resolver)
//! - Holds no global state: everything threads through an explicit
//!   [`ConversionContext`]
//! - Has NO async, NO network dependencies (pure Rust); the engine is
//!   reached exclusively through the [`EngineTransport`] seam
//! - Owns no on-disk state; one cache is one conversion session

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod codec;
pub mod context;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod transforms;
pub mod transport;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ApplicationId, AttachedObject, CacheEntry, CommandKind, Direction, Keyword, RecordIndex,
    RecordKey, ResultValue, StrataError, StreamId, TypeTag, Warning,
};

// =============================================================================
// RE-EXPORTS: Codec
// =============================================================================

pub use codec::{FIELD_SEPARATOR, ParsedRecord, canonical_keyword, family_members};

// =============================================================================
// RE-EXPORTS: Resolver / Cache / Context
// =============================================================================

pub use cache::{KeywordSummary, RecordCache, StreamDiff, UpsertOutcome, UpsertRecord};
pub use context::{ConversionContext, ConversionSettings};
pub use resolver::{CHILD_SEPARATOR, IdResolver, derive_child_id, extract_parent_id};

// =============================================================================
// RE-EXPORTS: Pipeline / Registry / Transforms / Transport
// =============================================================================

pub use pipeline::{Pipeline, PipelineState, RunOutcome, build_waves};
pub use registry::{ConverterRegistry, EntityConverter, TypeDependencyGraph};
pub use transforms::{
    ExplodedPart, MergeCandidate, MergeGroup, MergedMesh, MeshFragment, explode_components,
    group_for_merge, merge_fragments,
};
pub use transport::EngineTransport;
