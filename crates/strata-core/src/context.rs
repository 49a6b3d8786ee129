//! # Conversion Context
//!
//! The explicit state object threaded by reference through every
//! pipeline and converter call: the record cache, the identifier
//! resolver, the session settings and the collected warnings.
//!
//! There is no ambient global state anywhere in the core; everything a
//! converter may touch hangs off this struct.

use crate::cache::{RecordCache, UpsertRecord};
use crate::codec::{self, ParsedRecord};
use crate::resolver::IdResolver;
use crate::transport::EngineTransport;
use crate::types::{
    ApplicationId, AttachedObject, CommandKind, Keyword, RecordIndex, StrataError, StreamId,
    Warning,
};

// =============================================================================
// SETTINGS
// =============================================================================

/// Session-level settings for one conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConversionSettings {
    /// Stream to tag produced records with, when records do not carry
    /// their own stream identifier.
    pub stream_id: Option<StreamId>,
}

// =============================================================================
// CONVERSION CONTEXT
// =============================================================================

/// All mutable state of one conversion session.
///
/// Converters receive `&mut ConversionContext`; the cache and resolver
/// are plain fields so converters can reach either directly when the
/// convenience methods below don't fit.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    /// The record cache (single source of truth for records).
    pub cache: RecordCache,
    /// The identifier resolver.
    pub resolver: IdResolver,
    /// Session settings.
    pub settings: ConversionSettings,
    /// Warnings collected so far; drained by the pipeline at the end
    /// of a run.
    warnings: Vec<Warning>,
}

impl ConversionContext {
    /// Create a new context with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new context with the given settings.
    #[must_use]
    pub fn with_settings(settings: ConversionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    // =========================================================================
    // WARNINGS
    // =========================================================================

    /// Record a non-fatal condition.
    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    // =========================================================================
    // RECORD INGRESS / EGRESS
    // =========================================================================

    /// Store one parsed record, wiring cache and resolver together.
    ///
    /// The record's own index wins when present; otherwise one is
    /// resolved (or reserved) from its application identifier. Either
    /// way the resolver learns the association so later references
    /// resolve to the same slot.
    pub fn upsert_parsed(
        &mut self,
        record: ParsedRecord,
        attached: Option<AttachedObject>,
    ) -> Result<RecordIndex, StrataError> {
        let index = match record.index {
            Some(index) => index,
            None => self
                .resolver
                .resolve_index(&record.keyword, record.application_id.as_ref()),
        };
        self.resolver
            .mark_used(&record.keyword, index, record.application_id.as_ref());

        let stream_id = record
            .stream_id
            .or_else(|| self.settings.stream_id.clone());

        self.cache.upsert(UpsertRecord {
            keyword: record.keyword,
            variant: record.variant,
            version: record.version,
            index,
            payload: record.payload,
            stream_id,
            application_id: record.application_id,
            command: record.command.unwrap_or(CommandKind::Set),
            attached,
        })?;
        Ok(index)
    }

    /// Write-direction convenience: resolve an index for the entity
    /// and upsert its payload in one step. Returns the index the
    /// record landed at. `variant` carries the family-member wire
    /// spelling for records that must be written as a sub-variant.
    pub fn commit_record(
        &mut self,
        keyword: &Keyword,
        variant: Option<&str>,
        version: Option<u32>,
        application_id: Option<&ApplicationId>,
        payload: impl Into<String>,
        attached: Option<AttachedObject>,
    ) -> Result<RecordIndex, StrataError> {
        let index = self.resolver.resolve_index(keyword, application_id);
        self.cache.upsert(UpsertRecord {
            keyword: keyword.clone(),
            variant: variant.map(str::to_string),
            version,
            index,
            payload: payload.into(),
            stream_id: self.settings.stream_id.clone(),
            application_id: application_id.cloned(),
            command: CommandKind::Set,
            attached,
        })?;
        Ok(index)
    }

    /// Resolve a reference to another entity's record index.
    ///
    /// When the identifier has no assignment yet (the referenced
    /// entity was never converted), a placeholder index is reserved so
    /// the dependent record stays numerically valid, and an
    /// [`Warning::UnresolvedReference`] is collected instead of
    /// aborting the batch.
    pub fn resolve_reference(
        &mut self,
        keyword: &Keyword,
        application_id: &ApplicationId,
    ) -> RecordIndex {
        if let Some(index) = self.resolver.lookup_index(keyword, application_id) {
            return index;
        }
        let index = self.resolver.resolve_index(keyword, Some(application_id));
        self.warn(Warning::UnresolvedReference {
            keyword: keyword.clone(),
            application_id: application_id.clone(),
            index,
        });
        index
    }

    /// Load raw protocol lines into the cache.
    ///
    /// Malformed lines and per-record cache conflicts are collected as
    /// warnings and skipped; conversion continues. Returns the number
    /// of records stored.
    pub fn ingest_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> usize {
        let mut stored = 0usize;
        for line in lines {
            let record = match codec::parse(line) {
                Ok(record) => record,
                Err(StrataError::MalformedLine { line, reason }) => {
                    self.warn(Warning::SkippedLine { line, reason });
                    continue;
                }
                Err(_) => continue,
            };
            match self.upsert_parsed(record, None) {
                Ok(_) => stored = stored.saturating_add(1),
                Err(_) => {
                    self.warn(Warning::SkippedLine {
                        line: line.to_string(),
                        reason: "conflicting application identifier",
                    });
                }
            }
        }
        stored
    }

    // =========================================================================
    // ENGINE TRANSPORT
    // =========================================================================

    /// Pull records for the given keywords from the engine into the
    /// cache. Keyword families are expanded so every sub-variant is
    /// requested.
    pub fn pull_from_engine(
        &mut self,
        transport: &mut dyn EngineTransport,
        keywords: &[Keyword],
    ) -> Result<usize, StrataError> {
        let mut wire_keywords: Vec<&str> = Vec::new();
        for keyword in keywords {
            let members = codec::family_members(keyword.as_str());
            if members.is_empty() {
                wire_keywords.push(keyword.as_str());
            } else {
                wire_keywords.extend_from_slice(members);
            }
        }

        let lines = transport.get_records(&wire_keywords)?;
        Ok(self.ingest_lines(lines.iter().map(String::as_str)))
    }

    /// Push every not-yet-consumed record to the engine as a write
    /// command. Returns the number of lines executed.
    pub fn push_to_engine(
        &mut self,
        transport: &mut dyn EngineTransport,
    ) -> Result<u64, StrataError> {
        let mut committed = 0u64;
        for keyword in self.cache.keywords() {
            let fresh = self.cache.take_new(&keyword);
            for (index, payload) in fresh {
                let key = crate::types::RecordKey::new(keyword.clone(), index);
                let Some(entry) = self.cache.entry(&key) else {
                    continue;
                };
                let line = codec::format(&ParsedRecord {
                    command: Some(entry.command),
                    keyword: entry.keyword.clone(),
                    variant: entry.variant.clone(),
                    version: entry.version,
                    stream_id: entry.stream_id.clone(),
                    application_id: entry.application_id.clone(),
                    index: Some(index),
                    payload,
                });
                transport.execute(&line)?;
                committed = committed.saturating_add(1);
            }
        }
        Ok(committed)
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    /// Reset cache, resolver and warnings between independent
    /// conversion sessions. Never called mid-session.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.resolver.clear();
        self.warnings.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
