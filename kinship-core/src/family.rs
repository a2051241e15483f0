//! Random family trees.
//!
//! A family grows from a single male root. Each generation, every member of
//! the previous generation may marry someone from outside the family and have
//! children with them. Only two ground relations are recorded (`SO` and
//! `child`); everything else is left to the completer.

use crate::entity::{Entity, EntityId, Gender};
use crate::graph::{RelationEdge, RelationGraph};
use crate::rules::FAMILY;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Label of a partner edge.
pub const SO: &str = "SO";

/// Label of a parent -> child edge.
pub const CHILD: &str = "child";

/// Errors from family generation.
#[derive(Debug, Error, PartialEq)]
pub enum FamilyError {
    #[error("Invalid family config: {0}")]
    InvalidConfig(String),

    #[error("Ran out of {gender} names after {taken} were taken")]
    NamesExhausted { gender: Gender, taken: usize },
}

#[derive(Debug, Deserialize)]
struct NamePools {
    male: Vec<String>,
    female: Vec<String>,
}

lazy_static::lazy_static! {
    static ref NAMES: NamePools = serde_json::from_str(include_str!("../data/names.json"))
        .expect("embedded names.json is valid");
}

/// Shape of generated families.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Number of generations below the root.
    pub max_levels: usize,
    pub min_child: usize,
    pub max_child: usize,
    /// Probability that a member marries (and so has children).
    pub p_marry: f64,
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            max_levels: 3,
            min_child: 4,
            max_child: 4,
            p_marry: 1.0,
        }
    }
}

impl FamilyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    pub fn with_children(mut self, min: usize, max: usize) -> Self {
        self.min_child = min;
        self.max_child = max;
        self
    }

    pub fn with_p_marry(mut self, p: f64) -> Self {
        self.p_marry = p;
        self
    }

    pub fn validate(&self) -> Result<(), FamilyError> {
        if self.min_child > self.max_child {
            return Err(FamilyError::InvalidConfig(format!(
                "min_child ({}) is greater than max_child ({})",
                self.min_child, self.max_child
            )));
        }
        if !(0.0..=1.0).contains(&self.p_marry) {
            return Err(FamilyError::InvalidConfig(format!(
                "p_marry ({}) is not a probability",
                self.p_marry
            )));
        }
        Ok(())
    }
}

/// Hands out unused names, shuffled once per family.
struct NamePicker {
    male: Vec<&'static str>,
    female: Vec<&'static str>,
    taken: usize,
}

impl NamePicker {
    fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut male: Vec<&'static str> = NAMES.male.iter().map(String::as_str).collect();
        let mut female: Vec<&'static str> = NAMES.female.iter().map(String::as_str).collect();
        male.shuffle(rng);
        female.shuffle(rng);
        Self {
            male,
            female,
            taken: 0,
        }
    }

    fn pick(&mut self, gender: Gender) -> Result<&'static str, FamilyError> {
        let pool = match gender {
            Gender::Male => &mut self.male,
            Gender::Female => &mut self.female,
        };
        let name = pool.pop().ok_or(FamilyError::NamesExhausted {
            gender,
            taken: self.taken,
        })?;
        self.taken += 1;
        Ok(name)
    }
}

/// A generated family: its members and the ground-truth edges between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    entities: Vec<Entity>,
    edges: Vec<(RelationEdge, String)>,
}

impl Family {
    /// Simulate a family tree.
    pub fn generate<R: Rng + ?Sized>(config: &FamilyConfig, rng: &mut R) -> Result<Self, FamilyError> {
        config.validate()?;

        let mut names = NamePicker::shuffled(rng);
        let mut family = Family {
            entities: Vec::new(),
            edges: Vec::new(),
        };

        let root = family.add_member(Gender::Male, &mut names)?;
        let mut parents = vec![root];

        for _ in 0..config.max_levels {
            let mut generation = Vec::new();
            for &parent in &parents {
                if !rng.gen_bool(config.p_marry) {
                    continue;
                }
                let partner_gender = family.entities[parent.index()].gender.toggle();
                let partner = family.add_member(partner_gender, &mut names)?;
                family.link(parent, partner, SO);

                let count = rng.gen_range(config.min_child..=config.max_child);
                for _ in 0..count {
                    let gender = if rng.gen_bool(0.5) {
                        Gender::Male
                    } else {
                        Gender::Female
                    };
                    let child = family.add_member(gender, &mut names)?;
                    family.link(parent, child, CHILD);
                    family.link(partner, child, CHILD);
                    generation.push(child);
                }
            }
            parents = generation;
        }

        debug!(
            members = family.entities.len(),
            edges = family.edges.len(),
            "generated family"
        );
        Ok(family)
    }

    /// Assemble a family from known members and edges.
    pub fn from_parts(entities: Vec<Entity>, edges: Vec<(RelationEdge, String)>) -> Self {
        Self { entities, edges }
    }

    fn add_member(&mut self, gender: Gender, names: &mut NamePicker) -> Result<EntityId, FamilyError> {
        let id = EntityId(self.entities.len() as u32);
        let name = names.pick(gender)?;
        self.entities.push(Entity::new(id, name, gender));
        Ok(id)
    }

    fn link(&mut self, from: EntityId, to: EntityId, label: &str) {
        self.edges.push((RelationEdge::new(from, to), label.to_string()));
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index()).filter(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The `SO` and `child` edges recorded during generation.
    pub fn ground_edges(&self) -> &[(RelationEdge, String)] {
        &self.edges
    }

    /// A graph holding every member and the ground edges under the family
    /// relation type, ready for completion.
    pub fn relation_graph(&self) -> RelationGraph {
        let mut graph = RelationGraph::with_entities(self.entities.iter().map(|e| e.id));
        for (edge, label) in &self.edges {
            graph.insert_if_unset(*edge, FAMILY, label);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_default_family_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let family = Family::generate(&FamilyConfig::default(), &mut rng).unwrap();

        // root + partner, then 4, 16 and 64 children with partners for all
        // but the last generation.
        assert_eq!(family.len(), 2 + 8 + 32 + 64);
        assert_eq!(family.entities()[0].gender, Gender::Male);

        let so_edges = family.ground_edges().iter().filter(|(_, l)| l == SO).count();
        let child_edges = family.ground_edges().iter().filter(|(_, l)| l == CHILD).count();
        assert_eq!(so_edges, 1 + 4 + 16);
        assert_eq!(child_edges, 2 * (4 + 16 + 64));
    }

    #[test]
    fn test_names_are_unique() {
        let mut rng = StdRng::seed_from_u64(7);
        let family = Family::generate(&FamilyConfig::default(), &mut rng).unwrap();
        let names: HashSet<&str> = family.entities().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), family.len());
    }

    #[test]
    fn test_partners_have_opposite_gender() {
        let mut rng = StdRng::seed_from_u64(3);
        let family = Family::generate(&FamilyConfig::default(), &mut rng).unwrap();
        for (edge, label) in family.ground_edges() {
            if label == SO {
                let a = family.entity(edge.from).unwrap();
                let b = family.entity(edge.to).unwrap();
                assert_eq!(a.gender.toggle(), b.gender);
            }
        }
    }

    #[test]
    fn test_never_marry() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = FamilyConfig::new().with_p_marry(0.0);
        let family = Family::generate(&config, &mut rng).unwrap();
        assert_eq!(family.len(), 1);
        assert!(family.ground_edges().is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = FamilyConfig::new().with_children(5, 2);
        assert!(matches!(
            Family::generate(&config, &mut rng),
            Err(FamilyError::InvalidConfig(_))
        ));
        let config = FamilyConfig::new().with_p_marry(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_names_exhausted() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = FamilyConfig::new().with_max_levels(4).with_children(6, 6);
        assert!(matches!(
            Family::generate(&config, &mut rng),
            Err(FamilyError::NamesExhausted { .. })
        ));
    }

    #[test]
    fn test_relation_graph_holds_ground_edges() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = FamilyConfig::new().with_max_levels(1).with_children(2, 2);
        let family = Family::generate(&config, &mut rng).unwrap();
        let graph = family.relation_graph();

        assert_eq!(graph.entity_count(), 4);
        assert_eq!(graph.label(RelationEdge::of(0, 1), FAMILY), Some(SO));
        assert_eq!(graph.label(RelationEdge::of(0, 2), FAMILY), Some(CHILD));
        assert_eq!(graph.label(RelationEdge::of(1, 3), FAMILY), Some(CHILD));
        assert_eq!(graph.edge_count(), family.ground_edges().len());
    }

    #[test]
    fn test_same_seed_same_family() {
        let a = Family::generate(&FamilyConfig::default(), &mut StdRng::seed_from_u64(11)).unwrap();
        let b = Family::generate(&FamilyConfig::default(), &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }
}
