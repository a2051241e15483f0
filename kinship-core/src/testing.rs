//! Testing utilities.
//!
//! This module provides hand-built fixtures for tests that need a known
//! family instead of a random one:
//! - `TestFamily` for spelling out members and ground edges
//! - `three_generations` for a small family under the built-in labels
//! - `aunt_rules` for a tiny rule book with English labels
//! - assertion helpers for closure and puzzle properties

use crate::completer::GraphCompleter;
use crate::entity::{Entity, EntityId, Gender};
use crate::family::{Family, CHILD, SO};
use crate::graph::{RelationEdge, RelationGraph};
use crate::puzzle::Puzzle;
use crate::rules::{RuleBook, RuleStore, FAMILY};

/// Builder for a family with chosen members and edges.
///
/// Members get ids in the order they are added, starting at zero.
#[derive(Debug, Clone, Default)]
pub struct TestFamily {
    entities: Vec<Entity>,
    edges: Vec<(RelationEdge, String)>,
}

impl TestFamily {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, name: &str, gender: Gender) -> Self {
        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity::new(id, name, gender));
        self
    }

    pub fn male(self, name: &str) -> Self {
        self.member(name, Gender::Male)
    }

    pub fn female(self, name: &str) -> Self {
        self.member(name, Gender::Female)
    }

    /// Record that `to` is `from`'s `label`.
    pub fn edge(mut self, from: u32, to: u32, label: &str) -> Self {
        self.edges.push((RelationEdge::of(from, to), label.to_string()));
        self
    }

    pub fn build(self) -> Family {
        Family::from_parts(self.entities, self.edges)
    }
}

/// Grandparents with two children, one of whom is married with a son.
///
/// ```text
/// 0 Arthur = 1 Mabel
///          |
///   +------+--------+
/// 2 Brian = 3 Clara  4 Diana
///         |
///      5 Ethan
/// ```
pub fn three_generations() -> Family {
    TestFamily::new()
        .male("Arthur")
        .female("Mabel")
        .male("Brian")
        .female("Clara")
        .female("Diana")
        .male("Ethan")
        .edge(0, 1, SO)
        .edge(0, 2, CHILD)
        .edge(1, 2, CHILD)
        .edge(0, 4, CHILD)
        .edge(1, 4, CHILD)
        .edge(2, 3, SO)
        .edge(2, 5, CHILD)
        .edge(3, 5, CHILD)
        .build()
}

/// Rules for "father's sister is aunt" style puzzles.
pub fn aunt_rules() -> RuleBook {
    RuleBook::new(
        RuleStore::new()
            .with_composition(FAMILY, "father", "sister", "aunt")
            .with_composition(FAMILY, "mother", "sister", "aunt")
            .with_composition(FAMILY, "father", "wife", "mother")
            .with_composition(FAMILY, "aunt", "son", "cousin"),
    )
}

/// Ground graph of `family`, closed under `rules`.
pub fn completed_graph(rules: &RuleBook, family: &Family) -> RelationGraph {
    let mut graph = family.relation_graph();
    GraphCompleter::new(rules, &mut graph).complete_graph();
    graph
}

/// Panic unless every composable pair of labelled edges has exactly its
/// composition as the label of the closing edge.
pub fn assert_closed(rules: &RuleBook, graph: &RelationGraph, rel_type: &str) {
    let store = rules.store();
    for (first, a) in graph.labelled_edges(rel_type) {
        for &z in graph.successors(first.to) {
            let second = RelationEdge::new(first.to, z);
            let Some(b) = graph.label(second, rel_type) else {
                continue;
            };
            let Some(expected) = store.compose(rel_type, a, b) else {
                continue;
            };
            let closing = RelationEdge::new(first.from, z);
            if closing.is_self_loop() {
                continue;
            }
            assert_eq!(
                graph.label(closing, rel_type),
                Some(expected),
                "{first} = {a} and {second} = {b} compose to {expected} on {closing}"
            );
        }
    }
}

/// Panic unless `puzzle` is a valid chain whose edges are all in `graph`.
pub fn assert_puzzle_in_graph(puzzle: &Puzzle, graph: &RelationGraph, rel_type: &str) {
    if let Err(err) = puzzle.validate() {
        panic!("invalid puzzle {}: {err}", puzzle.id);
    }
    for edge in puzzle.story.iter().chain(std::iter::once(&puzzle.edge)) {
        assert!(
            graph.has_label(*edge, rel_type),
            "puzzle edge {edge} is not labelled in the graph"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ids_follow_insertion_order() {
        let family = three_generations();
        assert_eq!(family.len(), 6);
        assert_eq!(family.entity(EntityId(4)).unwrap().name, "Diana");
        assert_eq!(family.ground_edges().len(), 8);
    }

    #[test]
    fn test_three_generations_closes() {
        let rules = RuleBook::default_family();
        let family = three_generations();
        let graph = completed_graph(rules, &family);

        assert_eq!(graph.label(RelationEdge::of(5, 0), FAMILY), Some("inv-grand"));
        assert_eq!(graph.label(RelationEdge::of(5, 4), FAMILY), Some("un"));
        assert_eq!(graph.label(RelationEdge::of(2, 4), FAMILY), Some("sibling"));
        assert_eq!(graph.label(RelationEdge::of(0, 3), FAMILY), Some("in-law"));
        assert_closed(rules, &graph, FAMILY);
    }
}
