//! # Property-Based Tests
//!
//! Verification tests using proptest.
//!
//! These tests pin the core laws: codec round-trip across all three
//! command orderings, the identifier inverse law, wave completeness
//! over random acyclic graphs, and idempotent upsert.

use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use std::collections::BTreeSet;
use strata_core::{
    ApplicationId, CommandKind, ConversionContext, IdResolver, Keyword, ParsedRecord, RecordIndex,
    StreamId, TypeDependencyGraph, TypeTag, UpsertOutcome, UpsertRecord, build_waves, codec,
    derive_child_id, extract_parent_id,
};

// =============================================================================
// STRATEGIES
// =============================================================================

/// Keyword names: upper-case, no separator, so they can never collide
/// with the command tokens or a registered family member.
fn keyword_name() -> impl Strategy<Value = String> {
    "[A-Z]{2,8}".prop_filter("not a command token", |s| s != "SET")
}

fn identifier() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,10}"
}

fn command() -> impl Strategy<Value = Option<CommandKind>> {
    prop_oneof![
        Just(Some(CommandKind::Set)),
        Just(Some(CommandKind::SetAt)),
        Just(None),
    ]
}

/// Payload fields that cannot be mistaken for an index token.
fn payload() -> impl Strategy<Value = String> {
    vec("[a-z][a-z0-9.]{0,6}", 0..6).prop_map(|fields| fields.join("\t"))
}

fn parsed_record() -> impl Strategy<Value = ParsedRecord> {
    (
        command(),
        keyword_name(),
        option::of(0u32..100),
        option::of(identifier()),
        option::of(identifier()),
        1u32..100_000,
        payload(),
    )
        .prop_map(
            |(command, keyword, version, stream, app, index, payload)| ParsedRecord {
                command,
                keyword: Keyword::new(keyword),
                variant: None,
                version,
                stream_id: stream.map(StreamId::new),
                application_id: app.map(ApplicationId::new),
                index: Some(RecordIndex::new(index)),
                payload,
            },
        )
}

/// Random acyclic graph: edges only point from later tags to earlier
/// ones, so the graph can never contain a cycle.
fn acyclic_graph() -> impl Strategy<Value = TypeDependencyGraph> {
    const TAGS: [&str; 8] = [
        "anchor", "brace", "column", "deck", "edge", "frame", "girder", "haunch",
    ];
    vec(vec(any::<prop::sample::Index>(), 0..3), 2..=TAGS.len()).prop_map(|prereq_picks| {
        let mut graph = TypeDependencyGraph::new();
        for (position, picks) in prereq_picks.iter().enumerate() {
            let mut prerequisites = BTreeSet::new();
            for pick in picks {
                if position > 0 {
                    prerequisites.insert(TypeTag(TAGS[pick.index(position)]));
                }
            }
            graph.insert(TypeTag(TAGS[position]), prerequisites);
        }
        graph
    })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// `parse(format(r)) == r` for every record shape across all three
    /// command orderings, with and without embedded tags.
    #[test]
    fn codec_round_trip(record in parsed_record()) {
        let line = codec::format(&record);
        let reparsed = codec::parse(&line).expect("reparse");
        prop_assert_eq!(reparsed, record);
    }

    /// Formatting is stable: a second format of the reparsed record
    /// reproduces the identical line.
    #[test]
    fn codec_format_is_stable(record in parsed_record()) {
        let line = codec::format(&record);
        let reparsed = codec::parse(&line).expect("reparse");
        prop_assert_eq!(codec::format(&reparsed), line);
    }

    /// Extracting the parent of a derived child returns the parent,
    /// for any discriminator free of the separator.
    #[test]
    fn identifier_inverse_law(
        parent in "[a-zA-Z0-9_:-]{1,16}",
        discriminator in "[A-Za-z0-9]{1,6}",
    ) {
        let parent = ApplicationId::new(parent);
        let child = derive_child_id(&parent, &discriminator);
        prop_assert_eq!(extract_parent_id(&child), Some(parent));
    }

    /// The waves drain the whole graph, each type exactly once, and no
    /// type appears before any of its prerequisites.
    #[test]
    fn wave_completeness(graph in acyclic_graph()) {
        let waves = build_waves(&graph).expect("acyclic");

        let mut seen = BTreeSet::new();
        for batch in &waves {
            for tag in batch {
                // Every prerequisite is in an earlier batch
                for prerequisite in &graph[tag] {
                    prop_assert!(seen.contains(prerequisite));
                }
            }
            for tag in batch {
                prop_assert!(seen.insert(*tag), "type appeared twice");
            }
        }
        prop_assert_eq!(seen.len(), graph.len());
    }

    /// Upserting the same record twice leaves observable cache state
    /// unchanged.
    #[test]
    fn upsert_is_idempotent(
        keyword in keyword_name(),
        index in 1u32..1000,
        payload in payload(),
    ) {
        let mut ctx = ConversionContext::new();
        let record = UpsertRecord {
            keyword: Keyword::new(&keyword),
            variant: None,
            version: None,
            index: RecordIndex::new(index),
            payload,
            stream_id: None,
            application_id: None,
            command: CommandKind::Set,
            attached: None,
        };

        let first = ctx.cache.upsert(record.clone()).expect("upsert");
        let summary_before = ctx.cache.summary(&Keyword::new(&keyword));

        let second = ctx.cache.upsert(record).expect("upsert");
        let summary_after = ctx.cache.summary(&Keyword::new(&keyword));

        prop_assert_eq!(first, UpsertOutcome::Inserted);
        prop_assert_eq!(second, UpsertOutcome::Unchanged);
        prop_assert_eq!(summary_before.payloads, summary_after.payloads);
        prop_assert_eq!(summary_before.indices, summary_after.indices);
    }

    /// Reserved indices are unique per keyword: no two reservations
    /// (fresh or identified) ever share a slot.
    #[test]
    fn resolver_never_hands_out_a_slot_twice(
        ids in vec(option::of(identifier()), 1..40),
    ) {
        let mut resolver = IdResolver::new();
        let keyword = Keyword::new("NODE");
        let mut seen = BTreeSet::new();
        let mut assigned = BTreeSet::new();

        for id in ids {
            let app_id = id.map(ApplicationId::new);
            let index = resolver.resolve_index(&keyword, app_id.as_ref());
            let repeat = app_id.as_ref().is_some_and(|a| !assigned.insert(a.clone()));
            if repeat {
                // Same identifier maps back to its existing slot
                prop_assert!(seen.contains(&index));
            } else {
                prop_assert!(seen.insert(index), "index {index} handed out twice");
            }
        }
    }
}
