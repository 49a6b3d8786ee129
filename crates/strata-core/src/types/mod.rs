//! # Core Type Definitions
//!
//! This module contains all shared types for the Strata conversion core:
//! - Record addressing (`Keyword`, `RecordIndex`, `RecordKey`)
//! - Identifier spaces (`ApplicationId`, `StreamId`)
//! - Cache state (`CacheEntry`, `CommandKind`, `AttachedObject`)
//! - Pipeline vocabulary (`TypeTag`, `Direction`)
//! - Result payload shapes (`ResultValue`)
//! - Error and warning types (`StrataError`, `Warning`)
//!
//! ## Determinism Guarantees
//!
//! All keyed types implement `Ord` so that `BTreeMap`/`BTreeSet`
//! enumeration is deterministic. `RecordKey` orders keyword-major,
//! index-minor, which is exactly the "ascending index per keyword"
//! order the cache exposes.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// RECORD ADDRESSING
// =============================================================================

/// A protocol keyword, canonical (family-folded, version stripped).
///
/// The codec folds keyword-family members (e.g. the beam-load
/// sub-variants) into one canonical keyword before records reach the
/// cache or resolver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Keyword(pub String);

impl Keyword {
    /// Create a new keyword from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the keyword as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session-local numeric index of a record under its keyword.
///
/// Valid indices start at 1; the resolver never hands out 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RecordIndex(pub u32);

impl RecordIndex {
    /// Create a new record index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique address of one protocol record slot: (keyword, index).
///
/// At most one live record exists per `RecordKey` per session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Canonical keyword of the record.
    pub keyword: Keyword,
    /// Numeric index under that keyword.
    pub index: RecordIndex,
}

impl RecordKey {
    /// Create a new record key.
    #[must_use]
    pub fn new(keyword: Keyword, index: RecordIndex) -> Self {
        Self { keyword, index }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.keyword, self.index)
    }
}

// =============================================================================
// IDENTIFIER SPACES
// =============================================================================

/// Stable cross-session identifier of one logical domain entity.
///
/// Independent of the session-local `RecordIndex`. Within one keyword
/// namespace, at most one index is associated with a given
/// `ApplicationId` at a time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// Create a new application identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the logical stream a record belongs to.
///
/// Streams scope snapshot/diff queries; they never affect record
/// addressing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    /// Create a new stream identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PIPELINE VOCABULARY
// =============================================================================

/// Tag naming one entity type in the conversion pipeline.
///
/// Tags are static strings because converter registration is a plain
/// startup-time table, not runtime reflection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeTag(pub &'static str);

impl TypeTag {
    /// Get the tag as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Conversion direction of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Domain objects -> protocol records.
    Write,
    /// Protocol records -> domain objects.
    Read,
}

// =============================================================================
// COMMAND KIND
// =============================================================================

/// Write-command ordering of a record line.
///
/// Untagged read-back lines carry no command token; once cached they are
/// treated as `Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// `SET <keyword> <index> <fields...>`
    Set,
    /// `SET_AT <index> <keyword> <fields...>`
    SetAt,
}

impl CommandKind {
    /// The literal command token on the wire.
    #[must_use]
    pub const fn as_token(self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::SetAt => "SET_AT",
        }
    }
}

// =============================================================================
// CACHE ENTRY
// =============================================================================

/// Opaque reference to the domain object a record was produced from or
/// will be consumed into. The cache stores it untouched; only the
/// owning converter downcasts it.
pub type AttachedObject = Arc<dyn Any + Send + Sync>;

/// One live record known to the cache.
///
/// Exclusively owned by the cache; the resolver and pipeline hold only
/// `RecordKey`/`ApplicationId` references.
#[derive(Clone)]
pub struct CacheEntry {
    /// Canonical keyword of the record.
    pub keyword: Keyword,
    /// Family-member wire spelling, when the record arrived as (or must
    /// be written as) a sub-variant of a keyword family.
    pub variant: Option<String>,
    /// Keyword version the record was seen or produced with.
    pub version: Option<u32>,
    /// Numeric index under the keyword.
    pub index: RecordIndex,
    /// Stable identifier of the producing entity, if known.
    pub application_id: Option<ApplicationId>,
    /// Logical stream the record belongs to, if any.
    pub stream_id: Option<StreamId>,
    /// Protocol fields, command prefix stripped, tab-joined.
    pub payload: String,
    /// Write-command ordering the record was seen or produced with.
    pub command: CommandKind,
    /// Domain object behind this record, if attached.
    pub attached: Option<AttachedObject>,
    /// Set on creation and on payload replacement; cleared once the
    /// pipeline consumes the entry via `take_new`.
    pub is_new: bool,
}

impl CacheEntry {
    /// The record key addressing this entry.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.keyword.clone(), self.index)
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("keyword", &self.keyword)
            .field("variant", &self.variant)
            .field("version", &self.version)
            .field("index", &self.index)
            .field("application_id", &self.application_id)
            .field("stream_id", &self.stream_id)
            .field("payload", &self.payload)
            .field("command", &self.command)
            .field("attached", &self.attached.is_some())
            .field("is_new", &self.is_new)
            .finish()
    }
}

// =============================================================================
// RESULT PAYLOAD SHAPES
// =============================================================================

/// Known shapes of merged analysis-result payloads.
///
/// A closed sum type so merge logic is exhaustive instead of defensive
/// runtime casting. Merging concatenates like shapes; unlike shapes are
/// incompatible and rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultValue {
    /// One scalar per face.
    FaceScalar(Vec<f64>),
    /// One value series per vertex.
    VertexSeries(Vec<Vec<f64>>),
    /// Series nested under string keys (e.g. per load case).
    KeyedSeries(BTreeMap<String, Vec<f64>>),
}

impl ResultValue {
    /// Merge `other` into `self` by concatenation.
    ///
    /// Returns `false` (and leaves `self` untouched) when the two
    /// values have different shapes and cannot be merged.
    pub fn merge(&mut self, other: Self) -> bool {
        match (self, other) {
            (Self::FaceScalar(a), Self::FaceScalar(b)) => {
                a.extend(b);
                true
            }
            (Self::VertexSeries(a), Self::VertexSeries(b)) => {
                a.extend(b);
                true
            }
            (Self::KeyedSeries(a), Self::KeyedSeries(b)) => {
                for (key, series) in b {
                    a.entry(key).or_default().extend(series);
                }
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the conversion core.
///
/// Only `CycleDetected` is fatal to a whole pipeline run; everything
/// else is scoped to one record, one key or one converter invocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrataError {
    /// A line could not be parsed into its minimum required fields.
    #[error("malformed line ({reason}): {line:?}")]
    MalformedLine {
        /// The offending input line.
        line: String,
        /// What was missing or unparseable.
        reason: &'static str,
    },

    /// Two different application identifiers claimed one record key.
    #[error("cache conflict at {key}: {existing} already holds the slot claimed by {incoming}")]
    CacheConflict {
        /// The contested record key.
        key: RecordKey,
        /// The identifier already associated with the key.
        existing: ApplicationId,
        /// The identifier that attempted the upsert.
        incoming: ApplicationId,
    },

    /// The dependency graph cannot be drained into waves.
    #[error("dependency cycle among types: {remaining:?}")]
    CycleDetected {
        /// The types left untraversed when the batch came up empty.
        remaining: Vec<TypeTag>,
    },

    /// A pipeline run named a type with no registered converter.
    #[error("no converter registered for type {0}")]
    UnknownType(TypeTag),

    /// The engine transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error occurred (app-layer file handling).
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// WARNINGS
// =============================================================================

/// Non-fatal conditions collected during a conversion session and
/// returned alongside produced output, never thrown across batch
/// boundaries.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
pub enum Warning {
    /// A dependent record referenced an identifier that was never
    /// converted; a placeholder index was reserved instead.
    #[error("unresolved reference: {application_id} has no index under {keyword}; placeholder {index} reserved")]
    UnresolvedReference {
        /// Keyword namespace of the missing reference.
        keyword: Keyword,
        /// The identifier that could not be found.
        application_id: ApplicationId,
        /// The placeholder index reserved so the record stays well-formed.
        index: RecordIndex,
    },

    /// A malformed input line was skipped; conversion continued.
    #[error("skipped malformed line ({reason}): {line:?}")]
    SkippedLine {
        /// The offending input line.
        line: String,
        /// What was missing or unparseable.
        reason: &'static str,
    },

    /// Records sharing a merge key carried incompatible result shapes;
    /// the merged result set was discarded, the object kept.
    #[error("incompatible result shapes under {key:?}; merged result set discarded")]
    MergeIncompatible {
        /// The result key whose shapes conflicted.
        key: String,
    },

    /// A converter failed for one type; the rest of the batch continued.
    #[error("converter for {tag} failed: {message}")]
    ConverterFailed {
        /// The type whose converter failed.
        tag: TypeTag,
        /// The converter's error, stringified.
        message: String,
    },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_order_keyword_major_index_minor() {
        let a = RecordKey::new(Keyword::new("EL"), RecordIndex::new(9));
        let b = RecordKey::new(Keyword::new("NODE"), RecordIndex::new(1));
        let c = RecordKey::new(Keyword::new("NODE"), RecordIndex::new(2));

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn command_kind_tokens() {
        assert_eq!(CommandKind::Set.as_token(), "SET");
        assert_eq!(CommandKind::SetAt.as_token(), "SET_AT");
    }

    #[test]
    fn result_value_merges_like_shapes() {
        let mut a = ResultValue::FaceScalar(vec![1.0, 2.0]);
        assert!(a.merge(ResultValue::FaceScalar(vec![3.0])));
        assert_eq!(a, ResultValue::FaceScalar(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn result_value_rejects_unlike_shapes() {
        let mut a = ResultValue::FaceScalar(vec![1.0]);
        assert!(!a.merge(ResultValue::VertexSeries(vec![vec![2.0]])));
        // Left untouched on rejection
        assert_eq!(a, ResultValue::FaceScalar(vec![1.0]));
    }

    #[test]
    fn keyed_series_merge_is_key_wise() {
        let mut a = ResultValue::KeyedSeries(BTreeMap::from([(
            "C1".to_string(),
            vec![1.0],
        )]));
        let b = ResultValue::KeyedSeries(BTreeMap::from([
            ("C1".to_string(), vec![2.0]),
            ("C2".to_string(), vec![3.0]),
        ]));

        assert!(a.merge(b));
        assert_eq!(
            a,
            ResultValue::KeyedSeries(BTreeMap::from([
                ("C1".to_string(), vec![1.0, 2.0]),
                ("C2".to_string(), vec![3.0]),
            ]))
        );
    }
}
