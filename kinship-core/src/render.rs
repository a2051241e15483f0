//! Turning edges into English.
//!
//! A [`RelationStore`] maps each relation label to a gendered surface name
//! ("father" / "mother") and a bank of sentence templates. Templates mention
//! `e_1` (the edge source) and `e_2` (the edge target); the gender used is the
//! target's, since an edge `(a, b)` labelled `R` reads "b is a's R".

use crate::entity::{EntityId, Gender};
use crate::family::Family;
use crate::graph::{RelationEdge, RelationGraph};
use crate::puzzle::ProofStep;
use crate::rules::FAMILY;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;

/// Errors from loading relation stores or rendering edges.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity not in family: {0}")]
    UnknownEntity(EntityId),

    #[error("Edge {edge} has no '{relation_type}' label")]
    MissingLabel {
        edge: RelationEdge,
        relation_type: String,
    },

    #[error("No {gender} form for relation '{relation}'")]
    UnknownRelation { relation: String, gender: Gender },

    #[error("Relation '{relation}' has no {gender} sentence templates")]
    NoTemplates { relation: String, gender: Gender },
}

/// Name of a relation (for one gender) and the sentences that express it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationForm {
    pub rel: String,
    #[serde(rename = "p")]
    pub templates: Vec<String>,
}

/// `(source name, relation name, target name)`.
pub type NamedEdge = (String, String, String);

/// One proof step with names and relations filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedStep {
    pub conclusion: NamedEdge,
    pub premises: [NamedEdge; 2],
}

lazy_static::lazy_static! {
    static ref DEFAULT_RELATIONS: RelationStore =
        serde_json::from_str(include_str!("../data/relations_store.json"))
            .expect("embedded relations_store.json is valid");
}

/// `label -> gender -> form`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationStore {
    forms: BTreeMap<String, BTreeMap<Gender, RelationForm>>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// English forms for the built-in kinship labels.
    pub fn default_family() -> &'static RelationStore {
        &DEFAULT_RELATIONS
    }

    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, RenderError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn with_form(
        mut self,
        relation: &str,
        gender: Gender,
        rel: &str,
        templates: &[&str],
    ) -> Self {
        self.forms.entry(relation.to_string()).or_default().insert(
            gender,
            RelationForm {
                rel: rel.to_string(),
                templates: templates.iter().map(|t| t.to_string()).collect(),
            },
        );
        self
    }

    pub fn form(&self, relation: &str, gender: Gender) -> Option<&RelationForm> {
        self.forms.get(relation)?.get(&gender)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }

    /// Labels from `labels` that lack a form for either gender.
    pub fn missing<'l>(&self, labels: impl IntoIterator<Item = &'l str>) -> Vec<&'l str> {
        labels
            .into_iter()
            .filter(|l| {
                [Gender::Male, Gender::Female]
                    .iter()
                    .any(|&g| self.form(l, g).is_none())
            })
            .collect()
    }
}

/// Renders edges of one completed family graph.
pub struct Renderer<'a> {
    relations: &'a RelationStore,
    family: &'a Family,
    graph: &'a RelationGraph,
    relation_type: String,
    boundary: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(relations: &'a RelationStore, family: &'a Family, graph: &'a RelationGraph) -> Self {
        Self {
            relations,
            family,
            graph,
            relation_type: FAMILY.to_string(),
            boundary: true,
        }
    }

    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = relation_type.into();
        self
    }

    /// Wrap names in `[...]` inside generated sentences.
    pub fn with_boundary(mut self, boundary: bool) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn name(&self, id: EntityId) -> Result<&'a str, RenderError> {
        self.family
            .entity(id)
            .map(|e| e.name.as_str())
            .ok_or(RenderError::UnknownEntity(id))
    }

    /// The form describing `edge.to` relative to `edge.from`.
    pub fn edge_relation(&self, edge: RelationEdge) -> Result<&'a RelationForm, RenderError> {
        let relation = self.graph.label(edge, &self.relation_type).ok_or_else(|| {
            RenderError::MissingLabel {
                edge,
                relation_type: self.relation_type.clone(),
            }
        })?;
        let gender = self
            .family
            .entity(edge.to)
            .ok_or(RenderError::UnknownEntity(edge.to))?
            .gender;
        self.relations
            .form(relation, gender)
            .ok_or_else(|| RenderError::UnknownRelation {
                relation: relation.to_string(),
                gender,
            })
    }

    pub fn relation_name(&self, edge: RelationEdge) -> Result<&'a str, RenderError> {
        Ok(self.edge_relation(edge)?.rel.as_str())
    }

    /// One sentence stating `edge`, terminated by `". "`.
    pub fn stringify<R: Rng + ?Sized>(
        &self,
        edge: RelationEdge,
        rng: &mut R,
    ) -> Result<String, RenderError> {
        let form = self.edge_relation(edge)?;
        let template = form.templates.choose(rng).ok_or_else(|| {
            let gender = self.family.entity(edge.to).map_or(Gender::Male, |e| e.gender);
            RenderError::NoTemplates {
                relation: form.rel.clone(),
                gender,
            }
        })?;

        let (from, to) = (self.name(edge.from)?, self.name(edge.to)?);
        let text = if self.boundary {
            template
                .replace("e_1", &format!("[{}]", from))
                .replace("e_2", &format!("[{}]", to))
        } else {
            template.replace("e_1", from).replace("e_2", to)
        };
        Ok(text + ". ")
    }

    pub fn format_edge(&self, edge: RelationEdge) -> Result<(String, String), RenderError> {
        Ok((
            self.name(edge.from)?.to_string(),
            self.name(edge.to)?.to_string(),
        ))
    }

    pub fn format_edge_rel(&self, edge: RelationEdge) -> Result<NamedEdge, RenderError> {
        Ok((
            self.name(edge.from)?.to_string(),
            self.relation_name(edge)?.to_string(),
            self.name(edge.to)?.to_string(),
        ))
    }

    /// Relation names along a story, joined by `-` (e.g. `"father-sister"`).
    pub fn f_comb(&self, story: &[RelationEdge]) -> Result<String, RenderError> {
        let names = story
            .iter()
            .map(|&e| self.relation_name(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.join("-"))
    }

    pub fn format_proof(&self, trace: &[ProofStep]) -> Result<Vec<FormattedStep>, RenderError> {
        trace
            .iter()
            .map(|step| {
                Ok(FormattedStep {
                    conclusion: self.format_edge_rel(step.edge)?,
                    premises: [
                        self.format_edge_rel(step.parts[0])?,
                        self.format_edge_rel(step.parts[1])?,
                    ],
                })
            })
            .collect()
    }
}
