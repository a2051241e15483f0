//! Puzzles: a target edge, the chain of edges that proves it, and the trace of
//! decompositions that produced the chain.

use crate::entity::EntityId;
use crate::graph::RelationEdge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors from puzzle construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PuzzleError {
    #[error("Chain length must be at least 1")]
    InvalidChainLength,

    #[error("Puzzle story is empty")]
    EmptyStory,

    #[error("Self-edge {0} in puzzle")]
    SelfEdge(RelationEdge),

    #[error("Story breaks at position {position}: {left} does not lead into {right}")]
    BrokenChain {
        position: usize,
        left: RelationEdge,
        right: RelationEdge,
    },

    #[error("Story runs {first_from} -> {last_to} but target edge is {target}")]
    EndpointMismatch {
        target: RelationEdge,
        first_from: EntityId,
        last_to: EntityId,
    },

    #[error("No puzzle with {chain_length} edges after {attempts} attempts")]
    Exhausted { attempts: usize, chain_length: usize },
}

/// One decomposition: `edge` was replaced by the two edges in `parts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub edge: RelationEdge,
    pub parts: [RelationEdge; 2],
}

/// Decomposition steps in the order they were applied.
pub type ProofTrace = Vec<ProofStep>;

/// Kinds of extra facts layered onto a story by noise injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Alternative decompositions of story edges.
    Supporting,
    /// Dangling expansions walking away from the story.
    Irrelevant,
    /// Edges among entities that are not on the story path.
    Disconnected,
}

/// A finished puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: Uuid,
    /// The fact to infer.
    pub edge: RelationEdge,
    /// Path from `edge.from` to `edge.to`.
    pub story: Vec<RelationEdge>,
    pub proof: ProofTrace,
    /// Noise attached after construction.
    #[serde(default)]
    pub facts: BTreeMap<FactKind, Vec<RelationEdge>>,
}

impl Puzzle {
    /// Build a puzzle, rejecting stories that do not prove `edge`.
    pub fn new(
        id: Uuid,
        edge: RelationEdge,
        story: Vec<RelationEdge>,
        proof: ProofTrace,
    ) -> Result<Self, PuzzleError> {
        validate_chain(edge, &story)?;
        Ok(Self {
            id,
            edge,
            story,
            proof,
            facts: BTreeMap::new(),
        })
    }

    /// Number of edges in the story.
    pub fn chain_length(&self) -> usize {
        self.story.len()
    }

    pub fn validate(&self) -> Result<(), PuzzleError> {
        validate_chain(self.edge, &self.story)
    }

    /// Entities along the story path, in order.
    pub fn path(&self) -> Vec<EntityId> {
        let mut path: Vec<EntityId> = self.story.iter().map(|e| e.from).collect();
        if let Some(last) = self.story.last() {
            path.push(last.to);
        }
        path
    }

    /// Attach noise facts, replacing any earlier facts of the same kind.
    pub fn attach_facts(&mut self, kind: FactKind, edges: Vec<RelationEdge>) {
        self.facts.insert(kind, edges);
    }

    pub fn facts(&self, kind: FactKind) -> &[RelationEdge] {
        self.facts.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// All noise edges, in fact-kind order.
    pub fn noise_edges(&self) -> impl Iterator<Item = RelationEdge> + '_ {
        self.facts.values().flatten().copied()
    }
}

/// Check that `story` is a path of non-self edges from `target.from` to
/// `target.to`.
pub fn validate_chain(target: RelationEdge, story: &[RelationEdge]) -> Result<(), PuzzleError> {
    let (Some(first), Some(last)) = (story.first(), story.last()) else {
        return Err(PuzzleError::EmptyStory);
    };

    if let Some(&edge) = story.iter().find(|e| e.is_self_loop()) {
        return Err(PuzzleError::SelfEdge(edge));
    }

    for (position, pair) in story.windows(2).enumerate() {
        if !pair[0].chains_into(pair[1]) {
            return Err(PuzzleError::BrokenChain {
                position,
                left: pair[0],
                right: pair[1],
            });
        }
    }

    if first.from != target.from || last.to != target.to {
        return Err(PuzzleError::EndpointMismatch {
            target,
            first_from: first.from,
            last_to: last.to,
        });
    }

    Ok(())
}
