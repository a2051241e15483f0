//! Noise facts layered onto a puzzle's story.
//!
//! Supporting and irrelevant facts come from the same decomposition machinery
//! as the story itself ([`ProofDecomposer::expand`]), so they are always true
//! in the family; disconnected facts are edges among entities the story never
//! mentions.

use crate::decomposer::ProofDecomposer;
use crate::entity::EntityId;
use crate::graph::RelationEdge;
use crate::puzzle::{FactKind, Puzzle};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which kinds of noise to add.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub supporting: bool,
    pub irrelevant: bool,
    pub disconnected: bool,
}

impl NoiseConfig {
    /// No noise at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_supporting(mut self, enabled: bool) -> Self {
        self.supporting = enabled;
        self
    }

    pub fn with_irrelevant(mut self, enabled: bool) -> Self {
        self.irrelevant = enabled;
        self
    }

    pub fn with_disconnected(mut self, enabled: bool) -> Self {
        self.disconnected = enabled;
        self
    }

    pub fn is_clean(&self) -> bool {
        !(self.supporting || self.irrelevant || self.disconnected)
    }
}

/// Produces noise facts for puzzles drawn from one completed graph.
pub struct NoiseInjector<'d, 'a> {
    decomposer: &'d ProofDecomposer<'a>,
}

impl<'d, 'a> NoiseInjector<'d, 'a> {
    pub fn new(decomposer: &'d ProofDecomposer<'a>) -> Self {
        Self { decomposer }
    }

    /// Attach every enabled kind of noise to `puzzle`.
    pub fn inject<R: Rng + ?Sized>(
        &self,
        puzzle: &mut Puzzle,
        config: &NoiseConfig,
        rng: &mut R,
    ) {
        if config.supporting {
            let facts = self.supporting_facts(puzzle, rng);
            puzzle.attach_facts(FactKind::Supporting, facts);
        }
        if config.irrelevant {
            let facts = self.irrelevant_facts(puzzle, rng);
            puzzle.attach_facts(FactKind::Irrelevant, facts);
        }
        if config.disconnected {
            let facts = self.disconnected_facts(puzzle, rng);
            puzzle.attach_facts(FactKind::Disconnected, facts);
        }
    }

    /// Alternative two-hop decompositions of the story edges.
    ///
    /// A pair is kept only when it shares no edge with the target, the story,
    /// or pairs kept before it.
    pub fn supporting_facts<R: Rng + ?Sized>(
        &self,
        puzzle: &Puzzle,
        rng: &mut R,
    ) -> Vec<RelationEdge> {
        let mut extra: Vec<RelationEdge> = Vec::new();
        for &edge in &puzzle.story {
            let Some(pair) = self.decomposer.expand(edge, rng) else {
                continue;
            };
            let clashes = pair
                .iter()
                .any(|e| *e == puzzle.edge || puzzle.story.contains(e) || extra.contains(e));
            if !clashes {
                extra.extend(pair);
            }
        }
        extra
    }

    /// Dangling expansions: a walk that keeps expanding the last produced
    /// edge, restarting from a random story edge whenever it gets stuck.
    pub fn irrelevant_facts<R: Rng + ?Sized>(
        &self,
        puzzle: &Puzzle,
        rng: &mut R,
    ) -> Vec<RelationEdge> {
        let story = &puzzle.story;
        let Some(&start) = story.choose(rng) else {
            return Vec::new();
        };

        let mut current = start;
        let mut extra: Vec<RelationEdge> = Vec::new();
        for _ in 0..story.len() {
            let before = current;
            if let Some(pair) = self.decomposer.expand(current, rng) {
                for edge in pair {
                    if edge == puzzle.edge {
                        continue;
                    }
                    if !story.contains(&edge) && !extra.contains(&edge) {
                        extra.push(edge);
                    }
                    current = edge;
                }
            }
            if current == before {
                if let Some(&restart) = story.choose(rng) {
                    current = restart;
                }
            }
        }
        extra
    }

    /// A random non-empty sample of edges whose endpoints are both off the
    /// story path. Empty when no such edge exists.
    pub fn disconnected_facts<R: Rng + ?Sized>(
        &self,
        puzzle: &Puzzle,
        rng: &mut R,
    ) -> Vec<RelationEdge> {
        let graph = self.decomposer.graph();
        let rel_type = self.decomposer.relation_type();

        let on_path: HashSet<EntityId> = puzzle.path().into_iter().collect();
        let off_path: Vec<EntityId> = graph
            .entities()
            .iter()
            .copied()
            .filter(|id| !on_path.contains(id))
            .collect();

        let mut possible: Vec<RelationEdge> = Vec::new();
        for (i, &x) in off_path.iter().enumerate() {
            for &y in &off_path[i + 1..] {
                let edge = RelationEdge::new(x, y);
                if graph.has_label(edge, rel_type) {
                    possible.push(edge);
                }
            }
        }

        let count = match possible.len() {
            0 => return Vec::new(),
            1 => 1,
            n => rng.gen_range(1..n),
        };
        possible.choose_multiple(rng, count).copied().collect()
    }
}
