//! Proof decomposition: turning one edge of a completed graph into a chain of
//! edges that proves it.
//!
//! Starting from a target edge, the decomposer repeatedly picks an edge of the
//! working chain and replaces it with two edges `(x, z)`, `(z, y)` whose labels
//! compose into the replaced label, until the chain has the requested length.
//! Every replacement is recorded as a [`ProofStep`].

use crate::graph::{RelationEdge, RelationGraph};
use crate::puzzle::{ProofStep, ProofTrace, Puzzle, PuzzleError};
use crate::rules::{RuleBook, FAMILY};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::{Builder, Uuid};

/// Which edges an accepted puzzle removes from the pool of future targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeReuse {
    /// Targets may repeat.
    Allow,
    /// An edge is the target of at most one puzzle.
    #[default]
    ConsumeTarget,
    /// Neither the target nor any story edge becomes a later target.
    ConsumeStory,
}

/// Output of [`ProofDecomposer::derive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub story: Vec<RelationEdge>,
    pub proof: ProofTrace,
}

/// Breaks edges of a completed graph into multi-hop proofs.
pub struct ProofDecomposer<'a> {
    rules: &'a RuleBook,
    graph: &'a RelationGraph,
    relation_type: String,
    reuse: EdgeReuse,
    consumed: HashSet<RelationEdge>,
}

impl<'a> ProofDecomposer<'a> {
    pub fn new(rules: &'a RuleBook, graph: &'a RelationGraph) -> Self {
        Self {
            rules,
            graph,
            relation_type: FAMILY.to_string(),
            reuse: EdgeReuse::default(),
            consumed: HashSet::new(),
        }
    }

    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = relation_type.into();
        self
    }

    pub fn with_edge_reuse(mut self, reuse: EdgeReuse) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn graph(&self) -> &'a RelationGraph {
        self.graph
    }

    pub fn relation_type(&self) -> &str {
        &self.relation_type
    }

    /// Edges no longer available as targets.
    pub fn consumed(&self) -> &HashSet<RelationEdge> {
        &self.consumed
    }

    /// Split `edge` into two edges through some intermediate entity, using the
    /// configured relation type.
    pub fn expand<R: Rng + ?Sized>(
        &self,
        edge: RelationEdge,
        rng: &mut R,
    ) -> Option<[RelationEdge; 2]> {
        self.expand_typed(edge, &self.relation_type, rng)
    }

    /// Split `edge = (x, y)` into `[(x, z), (z, y)]`.
    ///
    /// The decomposition rules for the edge's label are tried in random order,
    /// each once; for each rule the entities are scanned for a witness `z` whose
    /// two edges carry exactly the rule's labels. Returns `None` when the label
    /// has no decomposition rule (a leaf) or no witness exists.
    pub fn expand_typed<R: Rng + ?Sized>(
        &self,
        edge: RelationEdge,
        rel_type: &str,
        rng: &mut R,
    ) -> Option<[RelationEdge; 2]> {
        let relation = self.graph.label(edge, rel_type)?;
        let mut candidates: Vec<&(String, String)> = self
            .rules
            .index()
            .decompositions(rel_type, relation)
            .iter()
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.shuffle(rng);

        for (first, second) in candidates {
            for &node in self.graph.entities() {
                if edge.involves(node) {
                    continue;
                }
                let left = RelationEdge::new(edge.from, node);
                let right = RelationEdge::new(node, edge.to);
                if self.graph.label(left, rel_type) == Some(first.as_str())
                    && self.graph.label(right, rel_type) == Some(second.as_str())
                {
                    return Some([left, right]);
                }
            }
        }
        None
    }

    /// Expand edges of `story` until `k` expansions succeeded or every edge has
    /// been tried.
    ///
    /// Each round picks an untried edge at random. A successful expansion is
    /// spliced into the chain in place of the edge unless one of the new edges,
    /// or its reverse, was already tried. Failed or rejected expansions use no
    /// budget. The returned story is shorter than `story.len() + k` when the
    /// graph ran out of decompositions.
    pub fn derive<R: Rng + ?Sized>(
        &self,
        mut story: Vec<RelationEdge>,
        mut k: usize,
        rng: &mut R,
    ) -> Derivation {
        let mut proof = ProofTrace::new();
        let mut seen: HashSet<RelationEdge> = HashSet::new();

        while k > 0 {
            let mut untried: Vec<RelationEdge> = Vec::new();
            for &edge in &story {
                if !seen.contains(&edge) && !untried.contains(&edge) {
                    untried.push(edge);
                }
            }
            let Some(&edge) = untried.choose(rng) else {
                break;
            };
            seen.insert(edge);

            let Some([left, right]) = self.expand(edge, rng) else {
                continue;
            };
            let loops_back = [left, right, left.reversed(), right.reversed()]
                .iter()
                .any(|e| seen.contains(e));
            if loops_back {
                continue;
            }

            let Some(position) = story.iter().position(|&e| e == edge) else {
                continue;
            };
            story.splice(position..=position, [left, right]);
            proof.push(ProofStep {
                edge,
                parts: [left, right],
            });
            k -= 1;
        }

        Derivation { story, proof }
    }

    /// Edges that may still be the target of a puzzle, in graph order.
    pub fn candidate_edges(&self) -> Vec<RelationEdge> {
        self.graph
            .labelled_edges(&self.relation_type)
            .map(|(edge, _)| edge)
            .filter(|edge| !self.consumed.contains(edge))
            .collect()
    }

    /// Try one random target edge.
    ///
    /// `chain_length` counts story edges. Returns `Ok(None)` when no target is
    /// left or the derivation came up short; an `Err` means the decomposition
    /// produced an invalid chain.
    pub fn build_puzzle<R: Rng + ?Sized>(
        &mut self,
        chain_length: usize,
        rng: &mut R,
    ) -> Result<Option<Puzzle>, PuzzleError> {
        if chain_length == 0 {
            return Err(PuzzleError::InvalidChainLength);
        }
        let candidates = self.candidate_edges();
        let Some(&target) = candidates.choose(rng) else {
            return Ok(None);
        };
        self.attempt(target, chain_length, rng)
    }

    /// Try every candidate edge once and keep every puzzle of the right length.
    pub fn build_all<R: Rng + ?Sized>(
        &mut self,
        chain_length: usize,
        rng: &mut R,
    ) -> Result<Vec<Puzzle>, PuzzleError> {
        if chain_length == 0 {
            return Err(PuzzleError::InvalidChainLength);
        }
        let mut puzzles = Vec::new();
        for target in self.candidate_edges() {
            // An earlier puzzle may have consumed this edge.
            if self.consumed.contains(&target) {
                continue;
            }
            if let Some(puzzle) = self.attempt(target, chain_length, rng)? {
                puzzles.push(puzzle);
            }
        }
        debug!(chain_length, puzzles = puzzles.len(), "built puzzles for graph");
        Ok(puzzles)
    }

    /// Generate-and-test up to `max_attempts` random targets.
    ///
    /// `PuzzleError::Exhausted` signals a graph that cannot produce a chain of
    /// this length; callers should move on to a fresh family.
    pub fn generate_puzzle<R: Rng + ?Sized>(
        &mut self,
        chain_length: usize,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<Puzzle, PuzzleError> {
        let mut attempts = 0;
        while attempts < max_attempts && !self.candidate_edges().is_empty() {
            attempts += 1;
            if let Some(puzzle) = self.build_puzzle(chain_length, rng)? {
                return Ok(puzzle);
            }
        }
        warn!(chain_length, attempts, "no puzzle produced for graph");
        Err(PuzzleError::Exhausted {
            attempts,
            chain_length,
        })
    }

    fn attempt<R: Rng + ?Sized>(
        &mut self,
        target: RelationEdge,
        chain_length: usize,
        rng: &mut R,
    ) -> Result<Option<Puzzle>, PuzzleError> {
        let Derivation { story, proof } = self.derive(vec![target], chain_length - 1, rng);
        if story.len() != chain_length {
            return Ok(None);
        }

        let id = puzzle_id(rng);
        let puzzle = Puzzle::new(id, target, story, proof);
        debug_assert!(puzzle.is_ok(), "decomposition produced invalid chain: {puzzle:?}");
        let puzzle = puzzle?;
        self.consume(&puzzle);
        Ok(Some(puzzle))
    }

    fn consume(&mut self, puzzle: &Puzzle) {
        match self.reuse {
            EdgeReuse::Allow => {}
            EdgeReuse::ConsumeTarget => {
                self.consumed.insert(puzzle.edge);
            }
            EdgeReuse::ConsumeStory => {
                self.consumed.insert(puzzle.edge);
                self.consumed.extend(puzzle.story.iter().copied());
            }
        }
    }
}

/// Random v4 id drawn from `rng`, so seeded runs reproduce their ids.
fn puzzle_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completer::GraphCompleter;
    use crate::rules::RuleStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn aunt_book() -> RuleBook {
        RuleBook::new(RuleStore::new().with_composition(FAMILY, "father", "sister", "aunt"))
    }

    fn aunt_graph(rules: &RuleBook) -> RelationGraph {
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "father");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "sister");
        GraphCompleter::new(rules, &mut graph).complete_graph();
        graph
    }

    #[test]
    fn test_expand_finds_witness() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(
            decomposer.expand(RelationEdge::of(0, 2), &mut rng),
            Some([RelationEdge::of(0, 1), RelationEdge::of(1, 2)])
        );
    }

    #[test]
    fn test_expand_leaf_and_missing_edges() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(7);

        // "father" has no decomposition rule.
        assert_eq!(decomposer.expand(RelationEdge::of(0, 1), &mut rng), None);
        // Unknown edge.
        assert_eq!(decomposer.expand(RelationEdge::of(2, 0), &mut rng), None);
        // Wrong relation type.
        assert_eq!(
            decomposer.expand_typed(RelationEdge::of(0, 2), "work", &mut rng),
            None
        );
    }

    #[test]
    fn test_expand_requires_exact_labels() {
        let rules = aunt_book();
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "father");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "brother");
        graph.insert_if_unset(RelationEdge::of(0, 2), FAMILY, "aunt");
        let decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(decomposer.expand(RelationEdge::of(0, 2), &mut rng), None);
    }

    #[test]
    fn test_derive_single_step() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(3);

        let derivation = decomposer.derive(vec![RelationEdge::of(0, 2)], 1, &mut rng);
        assert_eq!(
            derivation.story,
            vec![RelationEdge::of(0, 1), RelationEdge::of(1, 2)]
        );
        assert_eq!(
            derivation.proof,
            vec![ProofStep {
                edge: RelationEdge::of(0, 2),
                parts: [RelationEdge::of(0, 1), RelationEdge::of(1, 2)],
            }]
        );
    }

    #[test]
    fn test_derive_stops_when_edges_run_out() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(3);

        let derivation = decomposer.derive(vec![RelationEdge::of(0, 2)], 5, &mut rng);
        assert_eq!(derivation.story.len(), 2);
        assert_eq!(derivation.proof.len(), 1);

        let untouched = decomposer.derive(vec![RelationEdge::of(0, 1)], 0, &mut rng);
        assert_eq!(untouched.story, vec![RelationEdge::of(0, 1)]);
        assert!(untouched.proof.is_empty());
    }

    #[test]
    fn test_short_derivation_is_not_a_puzzle() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let mut decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(11);

        let result = decomposer.generate_puzzle(3, 25, &mut rng);
        assert_eq!(
            result,
            Err(PuzzleError::Exhausted {
                attempts: 25,
                chain_length: 3
            })
        );
        assert!(decomposer.consumed().is_empty());
    }

    #[test]
    fn test_edge_reuse_policies() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let mut rng = StdRng::seed_from_u64(5);

        let mut consume = ProofDecomposer::new(&rules, &graph);
        assert_eq!(consume.build_all(2, &mut rng).unwrap().len(), 1);
        assert!(consume.build_all(2, &mut rng).unwrap().is_empty());

        let mut allow = ProofDecomposer::new(&rules, &graph).with_edge_reuse(EdgeReuse::Allow);
        assert_eq!(allow.build_all(2, &mut rng).unwrap().len(), 1);
        assert_eq!(allow.build_all(2, &mut rng).unwrap().len(), 1);

        let mut story = ProofDecomposer::new(&rules, &graph).with_edge_reuse(EdgeReuse::ConsumeStory);
        story.build_all(2, &mut rng).unwrap();
        assert_eq!(story.consumed().len(), 3);
        assert!(story.candidate_edges().is_empty());
    }

    #[test]
    fn test_zero_chain_length_rejected() {
        let rules = aunt_book();
        let graph = aunt_graph(&rules);
        let mut decomposer = ProofDecomposer::new(&rules, &graph);
        let mut rng = StdRng::seed_from_u64(5);

        assert_eq!(
            decomposer.build_puzzle(0, &mut rng),
            Err(PuzzleError::InvalidChainLength)
        );
    }

    #[test]
    fn test_puzzle_ids_follow_seed() {
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        assert_eq!(puzzle_id(&mut a), puzzle_id(&mut b));
    }
}
