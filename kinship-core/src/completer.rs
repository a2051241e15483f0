//! Graph closure under the inverse, equivalence, symmetric and compositional
//! rules.
//!
//! The completer takes the sparse ground-truth edges of a family and fills in
//! every relation the rules can derive. Slots are filled at most once, so the
//! result does not depend on the order in which entity pairs are visited.
//!
//! Derivation is driven by an explicit worklist: every edge written while
//! completing a seed is itself visited, depth first, until nothing new
//! appears. Visiting an edge applies the single-edge rules (inverse,
//! equivalence, symmetric) to it and then composes it with every neighbour
//! sharing an endpoint.

use crate::graph::{RelationEdge, RelationGraph};
use crate::rules::{RuleBook, FAMILY};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Counters collected while completing a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStats {
    /// Edges visited with a label for the completed relation type.
    pub visits: usize,
    /// Edges created by composition.
    pub composed: usize,
    /// Reverse edges created by inverse rules.
    pub inverted: usize,
    /// Reverse edges created by symmetric rules.
    pub mirrored: usize,
    /// Labels rewritten to their canonical synonym.
    pub relabelled: usize,
    /// Times the depth bound stopped a derivation.
    pub depth_limited: usize,
}

/// Brings a [`RelationGraph`] to closure under a [`RuleBook`].
pub struct GraphCompleter<'a> {
    rules: &'a RuleBook,
    graph: &'a mut RelationGraph,
    relation_type: String,
    max_depth: Option<usize>,
    swept_revision: Option<u64>,
    stats: CompletionStats,
}

impl<'a> GraphCompleter<'a> {
    /// Create a completer for the `family` relation type.
    pub fn new(rules: &'a RuleBook, graph: &'a mut RelationGraph) -> Self {
        Self {
            rules,
            graph,
            relation_type: FAMILY.to_string(),
            max_depth: None,
            swept_revision: None,
            stats: CompletionStats::default(),
        }
    }

    /// Complete a different relation type.
    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = relation_type.into();
        self
    }

    /// Override the derivation depth bound (defaults to entity count squared).
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth.max(1));
        self
    }

    pub fn graph(&self) -> &RelationGraph {
        self.graph
    }

    pub fn stats(&self) -> CompletionStats {
        self.stats
    }

    /// Complete the graph by seeding every ordered pair of distinct entities.
    pub fn complete_graph(&mut self) -> CompletionStats {
        let ids = self.graph.entities().to_vec();
        let pairs: Vec<RelationEdge> = ids
            .iter()
            .flat_map(|&from| {
                ids.iter()
                    .filter(move |&&to| to != from)
                    .map(move |&to| RelationEdge::new(from, to))
            })
            .collect();
        self.complete_in_order(pairs)
    }

    /// Complete the graph seeding the given pairs in the given order.
    pub fn complete_in_order(
        &mut self,
        pairs: impl IntoIterator<Item = RelationEdge>,
    ) -> CompletionStats {
        let edges_before = self.graph.edge_count();
        for edge in pairs {
            self.almost_complete(edge);
        }
        debug!(
            relation_type = %self.relation_type,
            entities = self.graph.entity_count(),
            edges_before,
            edges_after = self.graph.edge_count(),
            composed = self.stats.composed,
            inverted = self.stats.inverted,
            mirrored = self.stats.mirrored,
            "graph completed"
        );
        self.stats
    }

    /// Derive everything reachable from `seed`.
    ///
    /// Seeds without a label are a no-op apart from a catch-up sweep of the
    /// single-edge rules when the graph changed since the last derivation.
    pub fn almost_complete(&mut self, seed: RelationEdge) {
        if seed.is_self_loop() {
            return;
        }

        let limit = self.depth_limit();
        let mut stack: Vec<(RelationEdge, usize)> = Vec::new();

        if self.swept_revision != Some(self.graph.revision()) {
            let mut pending = self.invert_relations();
            pending.extend(self.apply_equivalence());
            pending.extend(self.apply_symmetry());
            stack.extend(pending.into_iter().rev().map(|edge| (edge, 1)));
        }
        stack.push((seed, 0));

        let mut truncated = false;
        while let Some((edge, depth)) = stack.pop() {
            let created = self.visit(edge);
            if created.is_empty() {
                continue;
            }
            if depth >= limit {
                truncated = true;
                self.stats.depth_limited += 1;
                warn!(%edge, depth, "derivation depth bound reached");
                continue;
            }
            stack.extend(created.into_iter().rev().map(|e| (e, depth + 1)));
        }

        if !truncated {
            self.swept_revision = Some(self.graph.revision());
        }
    }

    /// Give every edge whose label has an inverse rule a reverse edge carrying
    /// the inverse label, unless that slot is already filled.
    ///
    /// Returns the reverse edges that were written.
    pub fn invert_relations(&mut self) -> Vec<RelationEdge> {
        let rules = self.rules;
        let mut written = Vec::new();
        for (edge, label) in self.labelled_snapshot() {
            if let Some(inverse) = rules.store().inverse(&self.relation_type, &label) {
                if self
                    .graph
                    .insert_if_unset(edge.reversed(), &self.relation_type, inverse)
                {
                    self.stats.inverted += 1;
                    written.push(edge.reversed());
                }
            }
        }
        written
    }

    /// Rewrite every label that has an equivalence rule to its canonical form.
    ///
    /// Returns the edges that were relabelled.
    pub fn apply_equivalence(&mut self) -> Vec<RelationEdge> {
        let rules = self.rules;
        let mut written = Vec::new();
        for (edge, label) in self.labelled_snapshot() {
            if let Some(canonical) = rules.store().equivalent(&self.relation_type, &label) {
                if self.graph.relabel(edge, &self.relation_type, canonical) {
                    self.stats.relabelled += 1;
                    written.push(edge);
                }
            }
        }
        written
    }

    /// Same as [`invert_relations`](Self::invert_relations) for the symmetric
    /// rules.
    pub fn apply_symmetry(&mut self) -> Vec<RelationEdge> {
        let rules = self.rules;
        let mut written = Vec::new();
        for (edge, label) in self.labelled_snapshot() {
            if let Some(mirror) = rules.store().symmetric(&self.relation_type, &label) {
                if self
                    .graph
                    .insert_if_unset(edge.reversed(), &self.relation_type, mirror)
                {
                    self.stats.mirrored += 1;
                    written.push(edge.reversed());
                }
            }
        }
        written
    }

    /// Compose `first = (x, z)` with `second = (z, y)` into `(x, y)`.
    ///
    /// Returns the new edge when it was written. Nothing is written when the
    /// edges do not chain, when `x == y`, when either label is missing or has
    /// no rule, or when `(x, y)` already holds a label.
    pub fn compose(&mut self, first: RelationEdge, second: RelationEdge) -> Option<RelationEdge> {
        if first.is_self_loop() || second.is_self_loop() {
            return None;
        }
        if !first.chains_into(second) || first.from == second.to {
            return None;
        }

        let composed = RelationEdge::new(first.from, second.to);
        if self.graph.has_label(composed, &self.relation_type) {
            return None;
        }

        let rules = self.rules;
        let first_label = self.graph.label(first, &self.relation_type)?;
        let second_label = self.graph.label(second, &self.relation_type)?;
        let result = rules
            .store()
            .compose(&self.relation_type, first_label, second_label)?;

        if self
            .graph
            .insert_if_unset(composed, &self.relation_type, result)
        {
            self.stats.composed += 1;
            Some(composed)
        } else {
            None
        }
    }

    /// Apply every rule to one edge and return the edges that were written.
    fn visit(&mut self, edge: RelationEdge) -> Vec<RelationEdge> {
        let mut written = Vec::new();
        let Some(mut label) = self
            .graph
            .label(edge, &self.relation_type)
            .map(str::to_string)
        else {
            return written;
        };
        self.stats.visits += 1;

        let store = self.rules.store();
        let reverse = edge.reversed();

        if let Some(inverse) = store.inverse(&self.relation_type, &label) {
            if self.graph.insert_if_unset(reverse, &self.relation_type, inverse) {
                self.stats.inverted += 1;
                written.push(reverse);
            }
        }

        if let Some(canonical) = store.equivalent(&self.relation_type, &label) {
            if self.graph.relabel(edge, &self.relation_type, canonical) {
                self.stats.relabelled += 1;
                label = canonical.to_string();
                // Revisit so the inverse of the canonical label gets a chance.
                written.push(edge);
            }
        }

        if let Some(mirror) = store.symmetric(&self.relation_type, &label) {
            if self.graph.insert_if_unset(reverse, &self.relation_type, mirror) {
                self.stats.mirrored += 1;
                written.push(reverse);
            }
        }

        for pred in self.graph.predecessors(edge.from).to_vec() {
            if let Some(new_edge) = self.compose(RelationEdge::new(pred, edge.from), edge) {
                written.push(new_edge);
            }
        }
        for succ in self.graph.successors(edge.to).to_vec() {
            if let Some(new_edge) = self.compose(edge, RelationEdge::new(edge.to, succ)) {
                written.push(new_edge);
            }
        }

        written
    }

    fn labelled_snapshot(&self) -> Vec<(RelationEdge, String)> {
        self.graph
            .labelled_edges(&self.relation_type)
            .map(|(edge, label)| (edge, label.to_string()))
            .collect()
    }

    fn depth_limit(&self) -> usize {
        self.max_depth.unwrap_or_else(|| {
            let n = self.graph.entity_count();
            (n * n).max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{Family, FamilyConfig};
    use crate::rules::RuleStore;
    use crate::testing::{assert_closed, aunt_rules, completed_graph};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_composes_father_sister_into_aunt() {
        let rules = aunt_rules();
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "father");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "sister");

        GraphCompleter::new(&rules, &mut graph).complete_graph();

        assert_eq!(graph.label(RelationEdge::of(0, 2), FAMILY), Some("aunt"));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_derived_edges_are_composed_further() {
        let rules = aunt_rules();
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "father");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "sister");
        graph.insert_if_unset(RelationEdge::of(2, 3), FAMILY, "son");

        let mut completer = GraphCompleter::new(&rules, &mut graph);
        // Seeding only the first ground edge still reaches the cousin.
        completer.almost_complete(RelationEdge::of(1, 2));
        let stats = completer.stats();

        assert_eq!(stats.composed, 2);
        assert_eq!(graph.label(RelationEdge::of(0, 3), FAMILY), Some("cousin"));
    }

    #[test]
    fn test_compose_rejects_bad_pairs() {
        let rules = RuleBook::new(
            RuleStore::new()
                .with_composition(FAMILY, "child", "inv-child", "self")
                .with_composition(FAMILY, "child", "child", "grand"),
        );
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(1, 0), FAMILY, "inv-child");
        graph.insert_if_unset(RelationEdge::of(2, 3), FAMILY, "child");

        let mut completer = GraphCompleter::new(&rules, &mut graph);
        // Would produce (0, 0).
        assert_eq!(
            completer.compose(RelationEdge::of(0, 1), RelationEdge::of(1, 0)),
            None
        );
        // Not adjacent.
        assert_eq!(
            completer.compose(RelationEdge::of(0, 1), RelationEdge::of(2, 3)),
            None
        );
        // Missing label on the second edge.
        assert_eq!(
            completer.compose(RelationEdge::of(0, 1), RelationEdge::of(1, 4)),
            None
        );
    }

    #[test]
    fn test_compose_never_overwrites() {
        let rules = aunt_rules();
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "father");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "sister");
        graph.insert_if_unset(RelationEdge::of(0, 2), FAMILY, "mentor");

        GraphCompleter::new(&rules, &mut graph).complete_graph();

        assert_eq!(graph.label(RelationEdge::of(0, 2), FAMILY), Some("mentor"));
    }

    #[test]
    fn test_inversion_fills_only_unset_reverse() {
        let rules = RuleBook::new(
            RuleStore::new()
                .with_inverse(FAMILY, "child", "inv-child")
                .with_inverse(FAMILY, "inv-child", "child"),
        );
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(0, 2), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(2, 0), FAMILY, "ward");

        let written = GraphCompleter::new(&rules, &mut graph).invert_relations();

        assert_eq!(written, vec![RelationEdge::of(1, 0)]);
        assert_eq!(graph.label(RelationEdge::of(1, 0), FAMILY), Some("inv-child"));
        assert_eq!(graph.label(RelationEdge::of(2, 0), FAMILY), Some("ward"));
    }

    #[test]
    fn test_equivalence_then_symmetry() {
        let rules = RuleBook::new(
            RuleStore::new()
                .with_equivalence(FAMILY, "spouse", "SO")
                .with_symmetric(FAMILY, "SO", "SO"),
        );
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "spouse");

        GraphCompleter::new(&rules, &mut graph).complete_graph();

        assert_eq!(graph.label(RelationEdge::of(0, 1), FAMILY), Some("SO"));
        assert_eq!(graph.label(RelationEdge::of(1, 0), FAMILY), Some("SO"));
    }

    #[test]
    fn test_other_relation_types_untouched() {
        let rules = RuleBook::new(RuleStore::new().with_inverse(FAMILY, "child", "inv-child"));
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), "work", "child");

        GraphCompleter::new(&rules, &mut graph).complete_graph();

        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_second_run_writes_nothing() {
        let rules = RuleBook::default_family();
        let mut graph = RelationGraph::new();
        graph.insert_if_unset(RelationEdge::of(0, 1), FAMILY, "SO");
        graph.insert_if_unset(RelationEdge::of(0, 2), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(1, 2), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(0, 3), FAMILY, "child");
        graph.insert_if_unset(RelationEdge::of(1, 3), FAMILY, "child");

        GraphCompleter::new(rules, &mut graph).complete_graph();
        let revision = graph.revision();
        let stats = GraphCompleter::new(rules, &mut graph).complete_graph();

        assert_eq!(graph.revision(), revision);
        assert_eq!(stats.composed + stats.inverted + stats.mirrored, 0);
        assert_eq!(graph.label(RelationEdge::of(2, 3), FAMILY), Some("sibling"));
        assert_eq!(graph.label(RelationEdge::of(3, 1), FAMILY), Some("inv-child"));
    }

    #[test]
    fn test_depth_bound_still_reaches_closure() {
        let rules = RuleBook::default_family();
        let family =
            Family::generate(&FamilyConfig::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        let full = completed_graph(rules, &family);

        let mut bounded = family.relation_graph();
        let stats = GraphCompleter::new(rules, &mut bounded)
            .with_max_depth(1)
            .complete_graph();

        // Later seeds pick up what the bound cut short.
        assert!(stats.depth_limited > 0);
        assert_closed(rules, &bounded, FAMILY);
        assert_eq!(bounded, full);
    }
}
