//! # Record Cache
//!
//! The single source of truth for every native-protocol record seen or
//! produced during a conversion session.
//!
//! - Upsert is idempotent; an unchanged payload is a no-op
//! - Enumeration per keyword is ascending by index (a consequence of
//!   `RecordKey` ordering inside the backing `BTreeMap`)
//! - "Only-new" retrieval clears the `is_new` flag as it reads, giving
//!   at-most-once delivery to the pipeline
//! - Stream snapshots allow later add/remove diffs scoped to one
//!   logical stream without touching other streams' entries

use crate::types::{
    ApplicationId, AttachedObject, CacheEntry, CommandKind, Keyword, RecordIndex, RecordKey,
    StrataError, StreamId,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// UPSERT INPUT / OUTCOME
// =============================================================================

/// Everything needed to insert or refresh one record.
#[derive(Clone)]
pub struct UpsertRecord {
    /// Canonical keyword of the record.
    pub keyword: Keyword,
    /// Family-member wire spelling, when the record is a sub-variant of
    /// a keyword family.
    pub variant: Option<String>,
    /// Keyword version, when known.
    pub version: Option<u32>,
    /// Numeric index under the keyword.
    pub index: RecordIndex,
    /// Protocol fields, command prefix stripped.
    pub payload: String,
    /// Logical stream the record belongs to, if any.
    pub stream_id: Option<StreamId>,
    /// Stable identifier of the producing entity, if known.
    pub application_id: Option<ApplicationId>,
    /// Write-command ordering for this record.
    pub command: CommandKind,
    /// Domain object to attach, if any.
    pub attached: Option<AttachedObject>,
}

/// What an upsert did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    /// The key was empty; a new entry was created.
    Inserted,
    /// The key held a different payload; it was replaced and re-marked new.
    Replaced,
    /// The key already held this exact payload; nothing changed.
    Unchanged,
}

// =============================================================================
// KEYWORD SUMMARY / STREAM DIFF
// =============================================================================

/// Parallel columns over all live entries of one keyword, ascending
/// by index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordSummary {
    /// Record payloads.
    pub payloads: Vec<String>,
    /// Record indices, ascending.
    pub indices: Vec<RecordIndex>,
    /// Application identifiers, parallel to `indices` (None where the
    /// record is identifier-less).
    pub application_ids: Vec<Option<ApplicationId>>,
}

/// Keys added to / removed from one stream since its last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamDiff {
    /// Keys present now but absent from the snapshot.
    pub added: Vec<RecordKey>,
    /// Keys present in the snapshot but gone now.
    pub removed: Vec<RecordKey>,
}

// =============================================================================
// RECORD CACHE
// =============================================================================

/// Keyed store of every record the session knows about.
///
/// In-memory only; scoped to one conversion session and reset with
/// [`RecordCache::clear`] between sessions, never mid-session.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    /// All live entries, keyed by (keyword, index).
    entries: BTreeMap<RecordKey, CacheEntry>,
    /// Per-stream membership captured at snapshot time.
    snapshots: BTreeMap<StreamId, BTreeSet<RecordKey>>,
}

impl RecordCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh one record.
    ///
    /// Idempotent: an identical payload at an existing key changes
    /// nothing. A different payload replaces the entry and marks it
    /// new again. Two different application identifiers claiming one
    /// key is a [`StrataError::CacheConflict`]; the cache is left
    /// untouched and the caller's converter decides how to proceed.
    pub fn upsert(&mut self, record: UpsertRecord) -> Result<UpsertOutcome, StrataError> {
        let key = RecordKey::new(record.keyword.clone(), record.index);

        if let Some(existing) = self.entries.get_mut(&key) {
            if let (Some(held), Some(claimed)) =
                (&existing.application_id, &record.application_id)
            {
                if held != claimed {
                    return Err(StrataError::CacheConflict {
                        key,
                        existing: held.clone(),
                        incoming: claimed.clone(),
                    });
                }
            }

            // Enrich metadata that was unknown at first sight.
            if existing.application_id.is_none() {
                existing.application_id = record.application_id;
            }
            if existing.variant.is_none() {
                existing.variant = record.variant;
            }
            if existing.stream_id.is_none() {
                existing.stream_id = record.stream_id;
            }
            if record.attached.is_some() {
                existing.attached = record.attached;
            }

            if existing.payload == record.payload {
                return Ok(UpsertOutcome::Unchanged);
            }

            existing.payload = record.payload;
            existing.version = record.version.or(existing.version);
            existing.command = record.command;
            existing.is_new = true;
            return Ok(UpsertOutcome::Replaced);
        }

        self.entries.insert(
            key,
            CacheEntry {
                keyword: record.keyword,
                variant: record.variant,
                version: record.version,
                index: record.index,
                application_id: record.application_id,
                stream_id: record.stream_id,
                payload: record.payload,
                command: record.command,
                attached: record.attached,
                is_new: true,
            },
        );
        Ok(UpsertOutcome::Inserted)
    }

    /// Get the payload at (keyword, index), if a record is live there.
    #[must_use]
    pub fn payload(&self, keyword: &Keyword, index: RecordIndex) -> Option<&str> {
        self.entries
            .get(&RecordKey::new(keyword.clone(), index))
            .map(|entry| entry.payload.as_str())
    }

    /// Get the full entry at a key.
    #[must_use]
    pub fn entry(&self, key: &RecordKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Iterate all live entries of one keyword, ascending by index.
    pub fn entries(&self, keyword: &Keyword) -> impl Iterator<Item = &CacheEntry> {
        self.entries
            .range(Self::keyword_range(keyword))
            .map(|(_, entry)| entry)
    }

    /// Parallel payload/index/identifier columns for one keyword.
    #[must_use]
    pub fn summary(&self, keyword: &Keyword) -> KeywordSummary {
        let mut summary = KeywordSummary::default();
        for entry in self.entries(keyword) {
            summary.payloads.push(entry.payload.clone());
            summary.indices.push(entry.index);
            summary.application_ids.push(entry.application_id.clone());
        }
        summary
    }

    /// Drain the not-yet-consumed payloads of one keyword.
    ///
    /// Returns only entries with `is_new` set and clears the flag as a
    /// side effect, so each entry is delivered to the pipeline at most
    /// once per write.
    pub fn take_new(&mut self, keyword: &Keyword) -> BTreeMap<RecordIndex, String> {
        let mut fresh = BTreeMap::new();
        for (_, entry) in self.entries.range_mut(Self::keyword_range(keyword)) {
            if entry.is_new {
                entry.is_new = false;
                fresh.insert(entry.index, entry.payload.clone());
            }
        }
        fresh
    }

    /// Record which keys currently belong to the given stream, so a
    /// later [`RecordCache::stream_diff`] can report additions and
    /// removals scoped to that stream only.
    pub fn snapshot(&mut self, stream_id: &StreamId) {
        let members = self.stream_members(stream_id);
        self.snapshots.insert(stream_id.clone(), members);
    }

    /// Additions/removals in one stream since its snapshot. A stream
    /// never snapshotted diffs against an empty baseline.
    #[must_use]
    pub fn stream_diff(&self, stream_id: &StreamId) -> StreamDiff {
        let baseline = self.snapshots.get(stream_id);
        let current = self.stream_members(stream_id);
        let empty = BTreeSet::new();
        let baseline = baseline.unwrap_or(&empty);

        StreamDiff {
            added: current.difference(baseline).cloned().collect(),
            removed: baseline.difference(&current).cloned().collect(),
        }
    }

    /// Remove one record. Returns the removed entry, if any.
    pub fn remove(&mut self, key: &RecordKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Reset all records and snapshots. Used between independent
    /// conversion sessions.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.snapshots.clear();
    }

    /// Total number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct keywords currently present, in order.
    #[must_use]
    pub fn keywords(&self) -> Vec<Keyword> {
        let mut keywords: Vec<Keyword> = Vec::new();
        for key in self.entries.keys() {
            if keywords.last() != Some(&key.keyword) {
                keywords.push(key.keyword.clone());
            }
        }
        keywords
    }

    fn stream_members(&self, stream_id: &StreamId) -> BTreeSet<RecordKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.stream_id.as_ref() == Some(stream_id))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn keyword_range(keyword: &Keyword) -> std::ops::RangeInclusive<RecordKey> {
        RecordKey::new(keyword.clone(), RecordIndex::new(0))
            ..=RecordKey::new(keyword.clone(), RecordIndex::new(u32::MAX))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keyword: &str, index: u32, payload: &str) -> UpsertRecord {
        UpsertRecord {
            keyword: Keyword::new(keyword),
            variant: None,
            version: None,
            index: RecordIndex::new(index),
            payload: payload.to_string(),
            stream_id: None,
            application_id: None,
            command: CommandKind::Set,
            attached: None,
        }
    }

    fn with_app(mut r: UpsertRecord, app: &str) -> UpsertRecord {
        r.application_id = Some(ApplicationId::new(app));
        r
    }

    fn with_stream(mut r: UpsertRecord, stream: &str) -> UpsertRecord {
        r.stream_id = Some(StreamId::new(stream));
        r
    }

    #[test]
    fn upsert_identical_payload_is_a_no_op() {
        let mut cache = RecordCache::new();
        assert_eq!(
            cache.upsert(record("NODE", 1, "10\t20\t30")).expect("upsert"),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            cache.upsert(record("NODE", 1, "10\t20\t30")).expect("upsert"),
            UpsertOutcome::Unchanged
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn upsert_changed_payload_replaces_and_remarks_new() {
        let mut cache = RecordCache::new();
        cache.upsert(record("NODE", 1, "10\t20\t30")).expect("upsert");
        // Consume the initial write
        cache.take_new(&Keyword::new("NODE"));

        assert_eq!(
            cache.upsert(record("NODE", 1, "11\t20\t30")).expect("upsert"),
            UpsertOutcome::Replaced
        );

        let fresh = cache.take_new(&Keyword::new("NODE"));
        assert_eq!(
            fresh,
            BTreeMap::from([(RecordIndex::new(1), "11\t20\t30".to_string())])
        );
    }

    #[test]
    fn take_new_is_at_most_once() {
        let mut cache = RecordCache::new();
        cache.upsert(record("NODE", 1, "10\t20\t30")).expect("upsert");

        assert_eq!(cache.take_new(&Keyword::new("NODE")).len(), 1);
        assert!(cache.take_new(&Keyword::new("NODE")).is_empty());
    }

    #[test]
    fn conflicting_application_ids_are_rejected() {
        let mut cache = RecordCache::new();
        cache
            .upsert(with_app(record("NODE", 1, "a"), "n1"))
            .expect("upsert");

        let err = cache
            .upsert(with_app(record("NODE", 1, "b"), "n2"))
            .expect_err("conflict");
        assert!(matches!(err, StrataError::CacheConflict { .. }));

        // The original entry is untouched
        assert_eq!(cache.payload(&Keyword::new("NODE"), RecordIndex::new(1)), Some("a"));
    }

    #[test]
    fn late_application_id_enriches_identifier_less_entry() {
        let mut cache = RecordCache::new();
        cache.upsert(record("NODE", 1, "a")).expect("upsert");
        cache
            .upsert(with_app(record("NODE", 1, "a"), "n1"))
            .expect("upsert");

        let summary = cache.summary(&Keyword::new("NODE"));
        assert_eq!(summary.application_ids, vec![Some(ApplicationId::new("n1"))]);
    }

    #[test]
    fn summary_is_ascending_by_index() {
        let mut cache = RecordCache::new();
        cache.upsert(record("NODE", 3, "c")).expect("upsert");
        cache.upsert(record("NODE", 1, "a")).expect("upsert");
        cache.upsert(record("EL", 2, "x")).expect("upsert");
        cache.upsert(record("NODE", 2, "b")).expect("upsert");

        let summary = cache.summary(&Keyword::new("NODE"));
        assert_eq!(
            summary.indices,
            vec![RecordIndex::new(1), RecordIndex::new(2), RecordIndex::new(3)]
        );
        assert_eq!(summary.payloads, vec!["a", "b", "c"]);
    }

    #[test]
    fn stream_diff_is_scoped_to_one_stream() {
        let mut cache = RecordCache::new();
        cache
            .upsert(with_stream(record("NODE", 1, "a"), "s1"))
            .expect("upsert");
        cache
            .upsert(with_stream(record("NODE", 2, "b"), "s2"))
            .expect("upsert");

        let s1 = StreamId::new("s1");
        cache.snapshot(&s1);

        // Add to s1, add to s2, remove from s1
        cache
            .upsert(with_stream(record("NODE", 3, "c"), "s1"))
            .expect("upsert");
        cache
            .upsert(with_stream(record("NODE", 4, "d"), "s2"))
            .expect("upsert");
        cache.remove(&RecordKey::new(Keyword::new("NODE"), RecordIndex::new(1)));

        let diff = cache.stream_diff(&s1);
        assert_eq!(
            diff.added,
            vec![RecordKey::new(Keyword::new("NODE"), RecordIndex::new(3))]
        );
        assert_eq!(
            diff.removed,
            vec![RecordKey::new(Keyword::new("NODE"), RecordIndex::new(1))]
        );
    }

    #[test]
    fn diff_without_snapshot_uses_empty_baseline() {
        let mut cache = RecordCache::new();
        cache
            .upsert(with_stream(record("NODE", 1, "a"), "s1"))
            .expect("upsert");

        let diff = cache.stream_diff(&StreamId::new("s1"));
        assert_eq!(diff.added.len(), 1);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = RecordCache::new();
        cache
            .upsert(with_stream(record("NODE", 1, "a"), "s1"))
            .expect("upsert");
        cache.snapshot(&StreamId::new("s1"));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stream_diff(&StreamId::new("s1")), StreamDiff::default());
    }

    #[test]
    fn keywords_lists_distinct_keywords_in_order() {
        let mut cache = RecordCache::new();
        cache.upsert(record("NODE", 1, "a")).expect("upsert");
        cache.upsert(record("NODE", 2, "b")).expect("upsert");
        cache.upsert(record("EL", 1, "x")).expect("upsert");

        assert_eq!(cache.keywords(), vec![Keyword::new("EL"), Keyword::new("NODE")]);
    }
}
