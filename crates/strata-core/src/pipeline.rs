//! # Dependency-Ordered Conversion Pipeline
//!
//! Drives wave-based conversion: entity types are processed in batches
//! where batch *n* contains exactly the not-yet-processed types whose
//! every prerequisite sits in an earlier batch. The same machinery
//! serves both directions (domain -> records, records -> domain).
//!
//! Batches execute in deterministic tag order. Types within one batch
//! have no data dependencies on each other, so an app layer is free to
//! schedule a batch across workers; the core itself stays
//! single-threaded, which is what makes its index reservation and
//! cache mutation trivially race-free.
//!
//! Per-type converter failures are demoted to warnings and the run
//! continues; only an undrainable graph (a cycle) aborts the run.

use crate::context::ConversionContext;
use crate::registry::{ConverterRegistry, TypeDependencyGraph};
use crate::types::{AttachedObject, Direction, StrataError, TypeTag, Warning};
use serde::Serialize;
use std::collections::BTreeSet;

// =============================================================================
// WAVE CONSTRUCTION
// =============================================================================

/// Layer an acyclic dependency graph into conversion waves.
///
/// Every type appears in exactly one batch, and never before any of
/// its prerequisites. An empty batch while types remain means the
/// graph has a cycle: fatal, reported with the remaining types.
pub fn build_waves(graph: &TypeDependencyGraph) -> Result<Vec<Vec<TypeTag>>, StrataError> {
    let mut remaining = graph.clone();
    let mut done: BTreeSet<TypeTag> = BTreeSet::new();
    let mut waves: Vec<Vec<TypeTag>> = Vec::new();

    while !remaining.is_empty() {
        let batch: Vec<TypeTag> = remaining
            .iter()
            .filter(|(_, prerequisites)| prerequisites.iter().all(|p| done.contains(p)))
            .map(|(tag, _)| *tag)
            .collect();

        if batch.is_empty() {
            return Err(StrataError::CycleDetected {
                remaining: remaining.keys().copied().collect(),
            });
        }

        for tag in &batch {
            remaining.remove(tag);
            done.insert(*tag);
        }
        waves.push(batch);
    }

    Ok(waves)
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Observable pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum PipelineState {
    /// No run in progress.
    #[default]
    Idle,
    /// Computing waves from the dependency graph.
    BuildingGraph,
    /// Executing converters for the current batch.
    ProcessingBatch,
    /// The last run aborted fatally.
    Failed,
}

/// What a pipeline run produced.
#[derive(Default)]
pub struct RunOutcome {
    /// Records committed to the cache (write direction).
    pub committed_records: u64,
    /// Domain objects produced (read direction).
    pub produced: Vec<AttachedObject>,
    /// Warnings collected over the whole run.
    pub warnings: Vec<Warning>,
}

impl std::fmt::Debug for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOutcome")
            .field("committed_records", &self.committed_records)
            .field("produced", &self.produced.len())
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// The conversion driver: registry in, waves out.
#[derive(Debug)]
pub struct Pipeline<'a> {
    registry: &'a ConverterRegistry,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline over a registry.
    #[must_use]
    pub fn new(registry: &'a ConverterRegistry) -> Self {
        Self {
            registry,
            state: PipelineState::Idle,
        }
    }

    /// Current pipeline state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run a conversion over the given types in the given direction.
    ///
    /// Converter errors become [`Warning::ConverterFailed`] and the
    /// rest of the run proceeds; records already placed in the cache
    /// stay valid either way. Fatal outcomes are an unregistered type
    /// or a dependency cycle.
    pub fn run(
        &mut self,
        ctx: &mut ConversionContext,
        direction: Direction,
        types: &[TypeTag],
    ) -> Result<RunOutcome, StrataError> {
        self.state = PipelineState::BuildingGraph;

        let graph = match self.registry.dependency_graph(types) {
            Ok(graph) => graph,
            Err(error) => {
                self.state = PipelineState::Failed;
                return Err(error);
            }
        };
        let waves = match build_waves(&graph) {
            Ok(waves) => waves,
            Err(error) => {
                self.state = PipelineState::Failed;
                return Err(error);
            }
        };

        let mut outcome = RunOutcome::default();
        for batch in waves {
            self.state = PipelineState::ProcessingBatch;
            for tag in batch {
                let Some(converter) = self.registry.get(tag) else {
                    // dependency_graph already validated registration
                    continue;
                };
                match direction {
                    Direction::Write => match converter.to_records(ctx) {
                        Ok(committed) => {
                            outcome.committed_records =
                                outcome.committed_records.saturating_add(committed);
                        }
                        Err(error) => ctx.warn(Warning::ConverterFailed {
                            tag,
                            message: error.to_string(),
                        }),
                    },
                    Direction::Read => match converter.from_records(ctx) {
                        Ok(produced) => outcome.produced.extend(produced),
                        Err(error) => ctx.warn(Warning::ConverterFailed {
                            tag,
                            message: error.to_string(),
                        }),
                    },
                }
            }
        }

        self.state = PipelineState::Idle;
        outcome.warnings = ctx.take_warnings();
        Ok(outcome)
    }
}

// =============================================================================
// TESTS
// =============================================================================
