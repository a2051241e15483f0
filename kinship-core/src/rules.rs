//! Relation rule tables and their inverted index.
//!
//! A [`RuleStore`] holds four read-only rule families, each partitioned by
//! relation type:
//!
//! - `compositional[type][a][b] = c`: `(x, z) = a` and `(z, y) = b` give `(x, y) = c`
//! - `inverse-equivalence[type][r] = r'`: `(a, b) = r` gives `(b, a) = r'`
//! - `symmetric[type][r] = r'`: same shape as inverse, for self-dual relations
//! - `equivalence[type][r] = r'`: relabel `r` in place to its canonical form
//!
//! The [`RuleIndex`] is the structural inverse of those tables and is what the
//! decomposer uses to break a relation back into two hops. A [`RuleBook`]
//! bundles both; it is immutable and can be shared between generation workers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;

/// Relation type used by the built-in kinship rules.
pub const FAMILY: &str = "family";

/// `type -> relation -> relation`.
pub type RelabelTable = BTreeMap<String, BTreeMap<String, String>>;

/// `type -> relation -> relation -> relation`.
pub type CompositionTable = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// `type -> relation -> [source relation, ...]`.
pub type InvertedRelabelTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// `type -> relation -> [(first hop, second hop), ...]`.
pub type InvertedCompositionTable = BTreeMap<String, BTreeMap<String, Vec<(String, String)>>>;

/// Errors from loading or validating rule tables.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule table '{table}' uses undeclared relation type '{relation_type}'")]
    UnknownRelationType {
        table: &'static str,
        relation_type: String,
    },
}

lazy_static::lazy_static! {
    /// The built-in kinship rules, parsed once.
    static ref DEFAULT_RULES: RuleStore = serde_json::from_str(include_str!("../data/rules_store.json"))
        .expect("embedded rules_store.json is valid");

    /// Index over [`DEFAULT_RULES`].
    static ref DEFAULT_RULE_BOOK: RuleBook = RuleBook::new(DEFAULT_RULES.clone());
}

fn default_relation_types() -> Vec<String> {
    vec![FAMILY.to_string()]
}

/// The four rule families plus the relation types they may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStore {
    #[serde(default = "default_relation_types")]
    pub relation_types: Vec<String>,

    #[serde(default)]
    pub compositional: CompositionTable,

    #[serde(default, rename = "inverse-equivalence")]
    pub inverse_equivalence: RelabelTable,

    #[serde(default)]
    pub symmetric: RelabelTable,

    #[serde(default)]
    pub equivalence: RelabelTable,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self {
            relation_types: default_relation_types(),
            compositional: BTreeMap::new(),
            inverse_equivalence: BTreeMap::new(),
            symmetric: BTreeMap::new(),
            equivalence: BTreeMap::new(),
        }
    }
}

impl RuleStore {
    /// An empty store declaring only the `family` relation type.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in kinship rules.
    pub fn default_family() -> Self {
        DEFAULT_RULES.clone()
    }

    /// Parse and validate a JSON rule store.
    pub fn from_json_str(json: &str) -> Result<Self, RuleError> {
        let store: RuleStore = serde_json::from_str(json)?;
        store.validate()?;
        Ok(store)
    }

    /// Parse and validate a JSON rule store from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, RuleError> {
        let store: RuleStore = serde_json::from_reader(reader)?;
        store.validate()?;
        Ok(store)
    }

    /// Check that every table only uses declared relation types.
    pub fn validate(&self) -> Result<(), RuleError> {
        let declared = |tp: &String| self.relation_types.iter().any(|t| t == tp);

        let tables: [(&'static str, Vec<&String>); 4] = [
            ("compositional", self.compositional.keys().collect()),
            ("inverse-equivalence", self.inverse_equivalence.keys().collect()),
            ("symmetric", self.symmetric.keys().collect()),
            ("equivalence", self.equivalence.keys().collect()),
        ];

        for (table, types) in tables {
            if let Some(tp) = types.into_iter().find(|tp| !declared(tp)) {
                return Err(RuleError::UnknownRelationType {
                    table,
                    relation_type: tp.clone(),
                });
            }
        }
        Ok(())
    }

    /// Result of composing `first` then `second`, if a rule exists.
    pub fn compose(&self, rel_type: &str, first: &str, second: &str) -> Option<&str> {
        self.compositional
            .get(rel_type)?
            .get(first)?
            .get(second)
            .map(String::as_str)
    }

    /// Label the reverse edge receives under the inverse rules.
    pub fn inverse(&self, rel_type: &str, relation: &str) -> Option<&str> {
        lookup(&self.inverse_equivalence, rel_type, relation)
    }

    /// Label the reverse edge receives under the symmetric rules.
    pub fn symmetric(&self, rel_type: &str, relation: &str) -> Option<&str> {
        lookup(&self.symmetric, rel_type, relation)
    }

    /// Canonical synonym of `relation`, if it has one.
    pub fn equivalent(&self, rel_type: &str, relation: &str) -> Option<&str> {
        lookup(&self.equivalence, rel_type, relation)
    }

    /// Add a composition rule.
    pub fn with_composition(
        mut self,
        rel_type: &str,
        first: &str,
        second: &str,
        result: &str,
    ) -> Self {
        self.declare(rel_type);
        self.compositional
            .entry(rel_type.to_string())
            .or_default()
            .entry(first.to_string())
            .or_default()
            .insert(second.to_string(), result.to_string());
        self
    }

    /// Add an inverse rule.
    pub fn with_inverse(mut self, rel_type: &str, relation: &str, inverse: &str) -> Self {
        self.declare(rel_type);
        insert(&mut self.inverse_equivalence, rel_type, relation, inverse);
        self
    }

    /// Add a symmetric rule.
    pub fn with_symmetric(mut self, rel_type: &str, relation: &str, mirror: &str) -> Self {
        self.declare(rel_type);
        insert(&mut self.symmetric, rel_type, relation, mirror);
        self
    }

    /// Add an equivalence rule.
    pub fn with_equivalence(mut self, rel_type: &str, relation: &str, canonical: &str) -> Self {
        self.declare(rel_type);
        insert(&mut self.equivalence, rel_type, relation, canonical);
        self
    }

    fn declare(&mut self, rel_type: &str) {
        if !self.relation_types.iter().any(|t| t == rel_type) {
            self.relation_types.push(rel_type.to_string());
        }
    }
}

fn lookup<'a>(table: &'a RelabelTable, rel_type: &str, relation: &str) -> Option<&'a str> {
    table
        .get(rel_type)?
        .get(relation)
        .map(String::as_str)
}

fn insert(table: &mut RelabelTable, rel_type: &str, key: &str, value: &str) {
    table
        .entry(rel_type.to_string())
        .or_default()
        .insert(key.to_string(), value.to_string());
}

/// Invert a two-level table into `type -> value -> [key, ...]`.
///
/// Entries keep the iteration order of the source table.
pub fn invert_relabel_table(table: &RelabelTable) -> InvertedRelabelTable {
    let mut inverted = InvertedRelabelTable::new();
    for (tp, rules) in table {
        let by_value = inverted.entry(tp.clone()).or_default();
        for (key, value) in rules {
            by_value.entry(value.clone()).or_default().push(key.clone());
        }
    }
    inverted
}

/// Invert the compositional table into `type -> result -> [(a, b), ...]`.
pub fn invert_composition_table(table: &CompositionTable) -> InvertedCompositionTable {
    let mut inverted = InvertedCompositionTable::new();
    for (tp, rules) in table {
        let by_result = inverted.entry(tp.clone()).or_default();
        for (first, seconds) in rules {
            for (second, result) in seconds {
                by_result
                    .entry(result.clone())
                    .or_default()
                    .push((first.clone(), second.clone()));
            }
        }
    }
    inverted
}

/// Inverted lookups over a [`RuleStore`], built once per store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleIndex {
    pub compositional: InvertedCompositionTable,
    pub inverse_equivalence: InvertedRelabelTable,
    pub symmetric: InvertedRelabelTable,
    pub equivalence: InvertedRelabelTable,
}

impl RuleIndex {
    pub fn build(store: &RuleStore) -> Self {
        Self {
            compositional: invert_composition_table(&store.compositional),
            inverse_equivalence: invert_relabel_table(&store.inverse_equivalence),
            symmetric: invert_relabel_table(&store.symmetric),
            equivalence: invert_relabel_table(&store.equivalence),
        }
    }

    /// Every `(first, second)` pair that composes into `relation`.
    ///
    /// Empty when `relation` cannot be decomposed, i.e. it is a leaf.
    pub fn decompositions(&self, rel_type: &str, relation: &str) -> &[(String, String)] {
        self.compositional
            .get(rel_type)
            .and_then(|by_result| by_result.get(relation))
            .map_or(&[], Vec::as_slice)
    }
}

/// A rule store together with its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBook {
    store: RuleStore,
    index: RuleIndex,
}

impl RuleBook {
    pub fn new(store: RuleStore) -> Self {
        let index = RuleIndex::build(&store);
        Self { store, index }
    }

    /// The built-in kinship rule book.
    pub fn default_family() -> &'static RuleBook {
        &DEFAULT_RULE_BOOK
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn index(&self) -> &RuleIndex {
        &self.index
    }
}

impl From<RuleStore> for RuleBook {
    fn from(store: RuleStore) -> Self {
        Self::new(store)
    }
}
