//! Directed relation graph over the entities of one family.
//!
//! Each ordered pair of entities can carry one label per relation type
//! (`"family"`, ...). Slots are filled at most once by the rule engine; the only
//! in-place change is an equivalence relabel to a canonical synonym.

use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// An ordered pair of distinct entities. `(a, b)` and `(b, a)` are different
/// edges and may carry different labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    pub from: EntityId,
    pub to: EntityId,
}

impl RelationEdge {
    pub fn new(from: EntityId, to: EntityId) -> Self {
        Self { from, to }
    }

    /// Shorthand for building edges from raw ids.
    pub fn of(from: u32, to: u32) -> Self {
        Self::new(EntityId(from), EntityId(to))
    }

    /// The same pair in the opposite direction.
    pub fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }

    pub fn is_self_loop(self) -> bool {
        self.from == self.to
    }

    /// Whether `self` is immediately followed by `next` on a path.
    pub fn chains_into(self, next: RelationEdge) -> bool {
        self.to == next.from
    }

    /// Whether the edge touches `id` at either end.
    pub fn involves(self, id: EntityId) -> bool {
        self.from == id || self.to == id
    }
}

impl fmt::Display for RelationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.from.0, self.to.0)
    }
}

/// Labels of one edge, keyed by relation type.
pub type EdgeLabels = BTreeMap<String, String>;

/// The mutable relation graph shared by the completer and the decomposer.
///
/// Lookups by edge are O(1). Edges are also kept in insertion order so that
/// every traversal, and therefore every seeded run, is reproducible.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    entities: Vec<EntityId>,
    known: HashSet<EntityId>,
    slots: HashMap<RelationEdge, EdgeLabels>,
    order: Vec<RelationEdge>,
    successors: HashMap<EntityId, Vec<EntityId>>,
    predecessors: HashMap<EntityId, Vec<EntityId>>,
    revision: u64,
}

impl RelationGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph over a fixed set of entities.
    pub fn with_entities(ids: impl IntoIterator<Item = EntityId>) -> Self {
        let mut graph = Self::new();
        for id in ids {
            graph.add_entity(id);
        }
        graph
    }

    /// Register an entity. Registering twice is a no-op.
    pub fn add_entity(&mut self, id: EntityId) {
        if self.known.insert(id) {
            self.entities.push(id);
        }
    }

    /// All registered entities, in registration order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of edges carrying at least one label.
    pub fn edge_count(&self) -> usize {
        self.order.len()
    }

    /// Monotonic counter bumped by every write.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[RelationEdge] {
        &self.order
    }

    pub fn contains_edge(&self, edge: RelationEdge) -> bool {
        self.slots.contains_key(&edge)
    }

    /// All labels of an edge.
    pub fn labels(&self, edge: RelationEdge) -> Option<&EdgeLabels> {
        self.slots.get(&edge)
    }

    /// The label of `edge` for `rel_type`, if that slot is filled.
    pub fn label(&self, edge: RelationEdge, rel_type: &str) -> Option<&str> {
        self.slots
            .get(&edge)
            .and_then(|labels| labels.get(rel_type))
            .map(String::as_str)
    }

    pub fn has_label(&self, edge: RelationEdge, rel_type: &str) -> bool {
        self.label(edge, rel_type).is_some()
    }

    /// Edges carrying a label for `rel_type`, in insertion order.
    pub fn labelled_edges<'a>(
        &'a self,
        rel_type: &'a str,
    ) -> impl Iterator<Item = (RelationEdge, &'a str)> + 'a {
        self.order
            .iter()
            .filter_map(move |&edge| self.label(edge, rel_type).map(|label| (edge, label)))
    }

    /// Entities `p` such that an edge `(p, id)` exists, in insertion order.
    pub fn predecessors(&self, id: EntityId) -> &[EntityId] {
        self.predecessors.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Entities `q` such that an edge `(id, q)` exists, in insertion order.
    pub fn successors(&self, id: EntityId) -> &[EntityId] {
        self.successors.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Fill the `(edge, rel_type)` slot unless it already holds a label.
    ///
    /// Returns `true` when the slot was written. Self-edges are never stored.
    pub fn insert_if_unset(
        &mut self,
        edge: RelationEdge,
        rel_type: &str,
        label: impl Into<String>,
    ) -> bool {
        debug_assert!(!edge.is_self_loop(), "self-edge {edge} offered to graph");
        if edge.is_self_loop() || self.has_label(edge, rel_type) {
            return false;
        }

        if !self.slots.contains_key(&edge) {
            self.add_entity(edge.from);
            self.add_entity(edge.to);
            self.order.push(edge);
            self.successors.entry(edge.from).or_default().push(edge.to);
            self.predecessors.entry(edge.to).or_default().push(edge.from);
        }

        self.slots
            .entry(edge)
            .or_default()
            .insert(rel_type.to_string(), label.into());
        self.revision += 1;
        true
    }

    /// Overwrite an existing label in place. Returns `true` when the label
    /// changed; unset slots are left alone.
    pub fn relabel(&mut self, edge: RelationEdge, rel_type: &str, label: &str) -> bool {
        match self
            .slots
            .get_mut(&edge)
            .and_then(|labels| labels.get_mut(rel_type))
        {
            Some(current) if current != label => {
                *current = label.to_string();
                self.revision += 1;
                true
            }
            _ => false,
        }
    }
}

/// Two graphs are equal when they hold the same entities and the same labels,
/// regardless of the order in which edges were discovered.
impl PartialEq for RelationGraph {
    fn eq(&self, other: &Self) -> bool {
        self.known == other.known && self.slots == other.slots
    }
}

impl Eq for RelationGraph {}
