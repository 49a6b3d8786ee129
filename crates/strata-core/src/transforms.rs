//! # Explode / Merge Transforms
//!
//! The two recurring shapes converters build on top of the core:
//!
//! - **Explode**: one domain object fans out into several records, one
//!   per non-zero component, each tagged with a derived child
//!   application identifier.
//! - **Merge**: several records fold back into one domain object:
//!   either children regrouped under their parent identifier, or
//!   surface-element fragments consolidated into one mesh with index
//!   offsets adjusted and result dictionaries merged key-wise.

use crate::resolver::{derive_child_id, extract_parent_id};
use crate::types::{ApplicationId, RecordIndex, ResultValue, Warning};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EXPLODE
// =============================================================================

/// One record produced by exploding a multi-component domain object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplodedPart {
    /// Child identifier derived from the parent and the discriminator.
    pub child_id: ApplicationId,
    /// The component discriminator (e.g. the axis name).
    pub discriminator: String,
    /// The component value.
    pub value: f64,
}

/// Explode named components into one part per NON-ZERO component.
///
/// Zero-valued components produce no record at all; the reverse pass
/// reconstructs them as zero by their absence.
#[must_use]
pub fn explode_components(
    parent: &ApplicationId,
    components: &[(&str, f64)],
) -> Vec<ExplodedPart> {
    components
        .iter()
        .filter(|(_, value)| *value != 0.0)
        .map(|(discriminator, value)| ExplodedPart {
            child_id: derive_child_id(parent, discriminator),
            discriminator: (*discriminator).to_string(),
            value: *value,
        })
        .collect()
}

// =============================================================================
// MERGE GROUPING
// =============================================================================

/// One native record offered for merge-back grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCandidate {
    /// Record index (ascending order is the deterministic tie-break).
    pub index: RecordIndex,
    /// The record's own application identifier, if it has one.
    pub application_id: Option<ApplicationId>,
    /// The derived loading vector of the record.
    pub load_vector: Vec<f64>,
    /// The load case the record references.
    pub case_ref: String,
    /// The entities the record targets.
    pub targets: BTreeSet<String>,
}

/// A set of records that reassemble into one domain object.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGroup {
    /// Parent identifier, when the members carried derived child ids.
    pub parent_id: Option<ApplicationId>,
    /// The shared load case reference.
    pub case_ref: String,
    /// Member record indices, ascending.
    pub members: Vec<RecordIndex>,
    /// Union of the members' target entities.
    pub targets: BTreeSet<String>,
    /// Combined loading vector: element-wise sum for parent groups
    /// (each child contributes its own component), the shared vector
    /// for anonymous groups.
    pub load_vector: Vec<f64>,
}

/// Group records for merge-back into domain objects.
///
/// Records with an application identifier group under
/// `extract_parent_id` plus the shared load case; an identified record
/// whose id is not derived (no separator) stays a group of its own.
/// The tie-break rule applies only to records with no identifier at
/// all: same loading vector, same load case, and same-or-disjoint
/// target lists; first match wins, deterministically, by ascending
/// record index.
#[must_use]
pub fn group_for_merge(candidates: &[MergeCandidate]) -> Vec<MergeGroup> {
    let mut ordered: Vec<&MergeCandidate> = candidates.iter().collect();
    ordered.sort_by_key(|c| c.index);

    let mut groups: Vec<MergeGroup> = Vec::new();
    // Parallel to `groups`: whether the group was opened by an
    // identifier-less record. Identified records never join these, and
    // anonymous records never join identified groups.
    let mut anonymous: Vec<bool> = Vec::new();
    for candidate in ordered {
        let parent_id = candidate
            .application_id
            .as_ref()
            .and_then(extract_parent_id);

        let slot = if candidate.application_id.is_none() {
            groups.iter().zip(&anonymous).position(|(group, anon)| {
                *anon
                    && group.case_ref == candidate.case_ref
                    && group.load_vector == candidate.load_vector
                    && compatible_targets(&group.targets, &candidate.targets)
            })
        } else {
            parent_id.as_ref().and_then(|parent| {
                groups.iter().position(|group| {
                    group.parent_id.as_ref() == Some(parent)
                        && group.case_ref == candidate.case_ref
                })
            })
        };

        match slot {
            Some(position) => {
                let group = &mut groups[position];
                group.members.push(candidate.index);
                group.targets.extend(candidate.targets.iter().cloned());
                if group.parent_id.is_some() {
                    add_vectors(&mut group.load_vector, &candidate.load_vector);
                }
            }
            None => {
                anonymous.push(candidate.application_id.is_none());
                groups.push(MergeGroup {
                    parent_id,
                    case_ref: candidate.case_ref.clone(),
                    members: vec![candidate.index],
                    targets: candidate.targets.clone(),
                    load_vector: candidate.load_vector.clone(),
                });
            }
        }
    }
    groups
}

/// Target lists can merge when they are identical or disjoint
/// (complementary halves of one exploded object).
fn compatible_targets(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a == b || a.is_disjoint(b)
}

/// Element-wise sum, padding the shorter vector with zeros.
fn add_vectors(accumulator: &mut Vec<f64>, other: &[f64]) {
    if accumulator.len() < other.len() {
        accumulator.resize(other.len(), 0.0);
    }
    for (slot, value) in accumulator.iter_mut().zip(other) {
        *slot += value;
    }
}

// =============================================================================
// MESH FRAGMENT MERGE
// =============================================================================

/// One surface-element record's share of a larger member.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshFragment {
    /// Vertex coordinates.
    pub vertices: Vec<[f64; 3]>,
    /// Faces as lists of vertex indices, local to this fragment.
    pub faces: Vec<Vec<u32>>,
    /// Analysis results keyed by result kind.
    pub results: BTreeMap<String, ResultValue>,
}

/// The consolidated mesh of one higher-level member.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedMesh {
    /// Concatenated vertices of all fragments.
    pub vertices: Vec<[f64; 3]>,
    /// Concatenated faces, indices offset so they stay internally
    /// consistent.
    pub faces: Vec<Vec<u32>>,
    /// Key-wise merged results; empty when a shape conflict forced the
    /// result set to be discarded.
    pub results: BTreeMap<String, ResultValue>,
}

/// Consolidate fragments sharing one parent container into a single
/// mesh.
///
/// Face indices are shifted by the cumulative vertex count so the
/// merged topology stays consistent. Result dictionaries merge
/// key-wise; the first incompatible shape discards the whole merged
/// result set (never the mesh itself) and reports a
/// [`Warning::MergeIncompatible`].
#[must_use]
pub fn merge_fragments(fragments: &[MeshFragment]) -> (MergedMesh, Vec<Warning>) {
    let mut merged = MergedMesh::default();
    let mut warnings = Vec::new();
    let mut results_valid = true;

    for fragment in fragments {
        let offset = merged.vertices.len() as u32;
        merged.vertices.extend_from_slice(&fragment.vertices);
        for face in &fragment.faces {
            merged
                .faces
                .push(face.iter().map(|i| i.saturating_add(offset)).collect());
        }

        if !results_valid {
            continue;
        }
        for (key, value) in &fragment.results {
            match merged.results.get_mut(key) {
                Some(existing) => {
                    if !existing.merge(value.clone()) {
                        warnings.push(Warning::MergeIncompatible { key: key.clone() });
                        merged.results.clear();
                        results_valid = false;
                        break;
                    }
                }
                None => {
                    merged.results.insert(key.clone(), value.clone());
                }
            }
        }
    }

    (merged, warnings)
}

// =============================================================================
// TESTS
// =============================================================================
