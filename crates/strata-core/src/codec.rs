//! # Line Codec
//!
//! Parser and formatter for the engine's delimited command text.
//!
//! One record line is one of three physical orderings:
//! - `SET <keyword> <index> <fields...>`
//! - `SET_AT <index> <keyword> <fields...>`
//! - `<keyword> <index> <fields...>` (untagged, as read back from the engine)
//!
//! All three normalize to the same [`ParsedRecord`]. The keyword token
//! carries an optional version suffix and optional embedded identifier
//! tags: `NAME[.VERSION][:{strata_stream_id:<id>}{strata_app_id:<id>}]`.
//!
//! Fields are tab-delimited; the engine protocol has no quoting or
//! escaping, so field values containing a tab are out of scope.

use crate::types::{ApplicationId, CommandKind, Keyword, RecordIndex, StrataError, StreamId};
use serde::{Deserialize, Serialize};

// =============================================================================
// WIRE CONSTANTS
// =============================================================================

/// The reserved field separator of the line protocol.
pub const FIELD_SEPARATOR: char = '\t';

/// Tag name carrying the stream identifier inside a keyword token.
pub const STREAM_TAG: &str = "strata_stream_id";

/// Tag name carrying the application identifier inside a keyword token.
pub const APP_TAG: &str = "strata_app_id";

// =============================================================================
// KEYWORD FAMILIES
// =============================================================================

/// Keyword families: several wire keywords that are semantically one
/// record type. Members fold to the canonical family keyword; the
/// member spelling survives in [`ParsedRecord::variant`] so formatting
/// can re-emit the exact sub-variant.
const KEYWORD_FAMILIES: &[(&str, &[&str])] = &[
    (
        "LOAD_BEAM",
        &[
            "LOAD_BEAM_POINT",
            "LOAD_BEAM_UDL",
            "LOAD_BEAM_LINE",
            "LOAD_BEAM_PATCH",
            "LOAD_BEAM_TRILIN",
        ],
    ),
    (
        "LOAD_GRID",
        &["LOAD_GRID_POINT", "LOAD_GRID_LINE", "LOAD_GRID_AREA"],
    ),
];

/// Fold a wire keyword to its canonical family keyword.
///
/// Returns the canonical name plus the original member spelling when
/// the input belongs to a family; non-family keywords pass through.
#[must_use]
pub fn canonical_keyword(name: &str) -> (&str, Option<&str>) {
    for (family, members) in KEYWORD_FAMILIES {
        if members.contains(&name) {
            return (family, Some(name));
        }
    }
    (name, None)
}

/// All registered member keywords of a family, or empty for
/// non-family keywords. Callers use this to request every sub-variant
/// from the engine at once.
#[must_use]
pub fn family_members(family: &str) -> &'static [&'static str] {
    for (name, members) in KEYWORD_FAMILIES {
        if *name == family {
            return members;
        }
    }
    &[]
}

// =============================================================================
// PARSED RECORD
// =============================================================================

/// Normalized representation of one protocol line, independent of the
/// physical command ordering it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// `Some(Set)` / `Some(SetAt)` for write commands, `None` for the
    /// untagged read-back ordering.
    pub command: Option<CommandKind>,
    /// Canonical (family-folded) keyword, version stripped.
    pub keyword: Keyword,
    /// Original family-member spelling, when the keyword was folded.
    pub variant: Option<String>,
    /// Keyword version, when the token carried a `.N` suffix.
    pub version: Option<u32>,
    /// Stream identifier embedded in the keyword token, if present.
    pub stream_id: Option<StreamId>,
    /// Application identifier embedded in the keyword token, if present.
    pub application_id: Option<ApplicationId>,
    /// Record index; absent for the few index-less record kinds.
    pub index: Option<RecordIndex>,
    /// Remaining fields, tab-joined, command prefix stripped.
    pub payload: String,
}

impl ParsedRecord {
    /// Iterate the payload fields.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.payload.split(FIELD_SEPARATOR)
    }

    /// The wire spelling of the keyword: the family member if one was
    /// recorded, otherwise the canonical keyword.
    #[must_use]
    pub fn wire_keyword(&self) -> &str {
        self.variant.as_deref().unwrap_or(self.keyword.as_str())
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse one protocol line into its normalized representation.
///
/// The ordering is detected from the first one or two tokens. Returns
/// [`StrataError::MalformedLine`] when the minimum required fields
/// (command shape, keyword, SET_AT index) cannot be extracted.
pub fn parse(line: &str) -> Result<ParsedRecord, StrataError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(malformed(line, "empty line"));
    }

    let tokens: Vec<&str> = trimmed.split(FIELD_SEPARATOR).collect();

    match tokens[0] {
        "SET" => {
            let Some(kw_token) = tokens.get(1) else {
                return Err(malformed(line, "SET without keyword"));
            };
            let (index, payload) = split_index_and_payload(&tokens[2..]);
            build_record(line, Some(CommandKind::Set), kw_token, index, payload)
        }
        "SET_AT" => {
            let Some(index_token) = tokens.get(1) else {
                return Err(malformed(line, "SET_AT without index"));
            };
            let Ok(index) = index_token.parse::<u32>() else {
                return Err(malformed(line, "SET_AT index not numeric"));
            };
            if index == 0 {
                return Err(malformed(line, "SET_AT index must be positive"));
            }
            let Some(kw_token) = tokens.get(2) else {
                return Err(malformed(line, "SET_AT without keyword"));
            };
            build_record(
                line,
                Some(CommandKind::SetAt),
                kw_token,
                Some(RecordIndex::new(index)),
                tokens[3..].join("\t"),
            )
        }
        kw_token => {
            let (index, payload) = split_index_and_payload(&tokens[1..]);
            build_record(line, None, kw_token, index, payload)
        }
    }
}

/// The token after the keyword is the index when it parses as a
/// positive integer; otherwise the record is index-less and the token
/// starts the payload. Indices start at 1, so a literal `0` is a
/// payload field, never an index.
fn split_index_and_payload(rest: &[&str]) -> (Option<RecordIndex>, String) {
    match rest.first().map(|t| t.parse::<u32>()) {
        Some(Ok(index)) if index > 0 => (Some(RecordIndex::new(index)), rest[1..].join("\t")),
        _ => (None, rest.join("\t")),
    }
}

fn build_record(
    line: &str,
    command: Option<CommandKind>,
    kw_token: &str,
    index: Option<RecordIndex>,
    payload: String,
) -> Result<ParsedRecord, StrataError> {
    let token = parse_keyword_token(line, kw_token)?;
    let (canonical, variant) = canonical_keyword(&token.name);
    Ok(ParsedRecord {
        command,
        keyword: Keyword::new(canonical),
        variant: variant.map(str::to_string),
        version: token.version,
        stream_id: token.stream_id,
        application_id: token.application_id,
        index,
        payload,
    })
}

/// Decomposed keyword token: `NAME[.VERSION][:{tag}{tag}...]`.
struct KeywordToken {
    name: String,
    version: Option<u32>,
    stream_id: Option<StreamId>,
    application_id: Option<ApplicationId>,
}

fn parse_keyword_token(line: &str, token: &str) -> Result<KeywordToken, StrataError> {
    let (name_part, tags_part) = match token.split_once(':') {
        Some((name, tags)) => (name, Some(tags)),
        None => (token, None),
    };

    let (name, version) = match name_part.split_once('.') {
        Some((name, version)) => {
            let Ok(version) = version.parse::<u32>() else {
                return Err(malformed(line, "keyword version not numeric"));
            };
            (name, Some(version))
        }
        None => (name_part, None),
    };

    if name.is_empty() {
        return Err(malformed(line, "missing keyword"));
    }

    let mut stream_id = None;
    let mut application_id = None;
    if let Some(tags) = tags_part {
        let mut rest = tags;
        while !rest.is_empty() {
            let Some(open) = rest.strip_prefix('{') else {
                return Err(malformed(line, "identifier tag missing opening brace"));
            };
            // The protocol does not escape '}', so the first one closes the tag.
            let Some((body, after)) = open.split_once('}') else {
                return Err(malformed(line, "unterminated identifier tag"));
            };
            match body.split_once(':') {
                Some((STREAM_TAG, value)) => stream_id = Some(StreamId::new(value)),
                Some((APP_TAG, value)) => {
                    application_id = Some(ApplicationId::new(value));
                }
                // Unknown tags are tolerated, not errors.
                Some(_) | None => {}
            }
            rest = after;
        }
    }

    Ok(KeywordToken {
        name: name.to_string(),
        version,
        stream_id,
        application_id,
    })
}

fn malformed(line: &str, reason: &'static str) -> StrataError {
    StrataError::MalformedLine {
        line: line.to_string(),
        reason,
    }
}

// =============================================================================
// FORMATTING
// =============================================================================

/// Format a record back into one protocol line, using the ordering its
/// `command` field names.
///
/// `format` and [`parse`] are inverses for any record `parse` can
/// produce, provided the record has an index or its first payload
/// field is non-numeric (the protocol itself cannot distinguish an
/// index from a leading numeric field otherwise).
#[must_use]
pub fn format(record: &ParsedRecord) -> String {
    let kw_token = format_keyword_token(record);
    let mut parts: Vec<String> = Vec::with_capacity(4);

    match record.command {
        // SET_AT requires an index; an index-less record falls back to
        // the SET ordering, which tolerates its absence.
        Some(CommandKind::SetAt) if record.index.is_some() => {
            parts.push(CommandKind::SetAt.as_token().to_string());
            if let Some(index) = record.index {
                parts.push(index.to_string());
            }
            parts.push(kw_token);
        }
        Some(_) => {
            parts.push(CommandKind::Set.as_token().to_string());
            parts.push(kw_token);
            if let Some(index) = record.index {
                parts.push(index.to_string());
            }
        }
        None => {
            parts.push(kw_token);
            if let Some(index) = record.index {
                parts.push(index.to_string());
            }
        }
    }

    if !record.payload.is_empty() {
        parts.push(record.payload.clone());
    }

    parts.join("\t")
}

fn format_keyword_token(record: &ParsedRecord) -> String {
    let mut token = record.wire_keyword().to_string();
    if let Some(version) = record.version {
        token.push('.');
        token.push_str(&version.to_string());
    }
    if record.stream_id.is_some() || record.application_id.is_some() {
        token.push(':');
        if let Some(stream) = &record.stream_id {
            token.push('{');
            token.push_str(STREAM_TAG);
            token.push(':');
            token.push_str(stream.as_str());
            token.push('}');
        }
        if let Some(app) = &record.application_id {
            token.push('{');
            token.push_str(APP_TAG);
            token.push(':');
            token.push_str(app.as_str());
            token.push('}');
        }
    }
    token
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_ordering_with_tags() {
        let line = "SET\tNODE.2:{strata_stream_id:s1}{strata_app_id:n1}\t1\t10\t20\t30";
        let record = parse(line).expect("parse");

        assert_eq!(record.command, Some(CommandKind::Set));
        assert_eq!(record.keyword, Keyword::new("NODE"));
        assert_eq!(record.version, Some(2));
        assert_eq!(record.stream_id, Some(StreamId::new("s1")));
        assert_eq!(record.application_id, Some(ApplicationId::new("n1")));
        assert_eq!(record.index, Some(RecordIndex::new(1)));
        assert_eq!(record.payload, "10\t20\t30");
    }

    #[test]
    fn parses_set_at_ordering() {
        let line = "SET_AT\t7\tPROP_SECTION.3\tsteel beam\tCAT";
        let record = parse(line).expect("parse");

        assert_eq!(record.command, Some(CommandKind::SetAt));
        assert_eq!(record.keyword, Keyword::new("PROP_SECTION"));
        assert_eq!(record.version, Some(3));
        assert_eq!(record.index, Some(RecordIndex::new(7)));
        assert_eq!(record.payload, "steel beam\tCAT");
    }

    #[test]
    fn parses_untagged_read_back_ordering() {
        let record = parse("MAT_STEEL\t4\tS355\t210000").expect("parse");

        assert_eq!(record.command, None);
        assert_eq!(record.keyword, Keyword::new("MAT_STEEL"));
        assert_eq!(record.version, None);
        assert_eq!(record.index, Some(RecordIndex::new(4)));
        assert_eq!(record.payload, "S355\t210000");
    }

    #[test]
    fn missing_tags_are_not_an_error() {
        let record = parse("SET\tNODE\t1\t0\t0\t0").expect("parse");
        assert_eq!(record.stream_id, None);
        assert_eq!(record.application_id, None);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let record = parse("SET\tNODE:{other_tool:x}{strata_app_id:n9}\t1\t0").expect("parse");
        assert_eq!(record.application_id, Some(ApplicationId::new("n9")));
        assert_eq!(record.stream_id, None);
    }

    #[test]
    fn folds_family_member_to_canonical_keyword() {
        let record = parse("SET\tLOAD_BEAM_UDL.2\t3\tL1\t-5.0").expect("parse");

        assert_eq!(record.keyword, Keyword::new("LOAD_BEAM"));
        assert_eq!(record.variant.as_deref(), Some("LOAD_BEAM_UDL"));
        assert_eq!(record.wire_keyword(), "LOAD_BEAM_UDL");
    }

    #[test]
    fn index_less_record_keeps_payload_intact() {
        let record = parse("SET\tTITLE\tOffice tower, stage 2").expect("parse");
        assert_eq!(record.index, None);
        assert_eq!(record.payload, "Office tower, stage 2");
    }

    #[test]
    fn rejects_empty_line() {
        assert!(matches!(
            parse(""),
            Err(StrataError::MalformedLine { reason: "empty line", .. })
        ));
    }

    #[test]
    fn rejects_set_at_without_numeric_index() {
        assert!(matches!(
            parse("SET_AT\tNODE\t1\t0"),
            Err(StrataError::MalformedLine {
                reason: "SET_AT index not numeric",
                ..
            })
        ));
    }

    #[test]
    fn zero_token_is_payload_not_an_index() {
        let record = parse("SET\tASSEMBLY\t0\t5\t7").expect("parse");
        assert_eq!(record.index, None);
        assert_eq!(record.payload, "0\t5\t7");
    }

    #[test]
    fn rejects_set_at_index_zero() {
        assert!(matches!(
            parse("SET_AT\t0\tNODE\t0\t0\t0"),
            Err(StrataError::MalformedLine {
                reason: "SET_AT index must be positive",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unterminated_tag() {
        assert!(parse("SET\tNODE:{strata_app_id:n1\t1\t0").is_err());
    }

    #[test]
    fn round_trips_all_three_orderings() {
        let lines = [
            "SET\tNODE.2:{strata_stream_id:s1}{strata_app_id:n1}\t1\t10\t20\t30",
            "SET_AT\t7\tPROP_SECTION.3\tsteel beam\tCAT",
            "MAT_STEEL\t4\tS355\t210000",
            "SET\tLOAD_BEAM_UDL.2:{strata_app_id:L1_Y}\t3\tL1\t-5.0",
            "SET\tTITLE\tOffice tower, stage 2",
        ];
        for line in lines {
            let record = parse(line).expect("parse");
            assert_eq!(format(&record), line, "line: {line}");
            assert_eq!(parse(&format(&record)).expect("reparse"), record);
        }
    }

    #[test]
    fn family_members_lists_variants() {
        assert!(family_members("LOAD_BEAM").contains(&"LOAD_BEAM_UDL"));
        assert!(family_members("NODE").is_empty());
    }
}
